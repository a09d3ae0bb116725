//! Dependency tree rendering.

use crate::graph::{Edge, NodeId, ResolvedGraph};
use std::collections::HashSet;
use std::fmt::Write;

impl ResolvedGraph {
    /// Render the graph as an indented tree, one requested dependency per
    /// line. A version changed by conflict resolution shows as
    /// `g:a:1.0 -> 2.0`; a subtree already printed above is abbreviated
    /// with `(*)`.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        let mut printed = HashSet::new();
        let roots: Vec<&Edge> = self.root_edges().collect();
        self.render_level(&roots, "", &mut printed, &mut out);
        out
    }

    fn render_level(
        &self,
        edges: &[&Edge],
        prefix: &str,
        printed: &mut HashSet<NodeId>,
        out: &mut String,
    ) {
        for (i, edge) in edges.iter().enumerate() {
            let last = i + 1 == edges.len();
            let node = &self.graph.nodes[edge.to];
            let children: Vec<&Edge> = self.outgoing(edge.to).collect();

            let _ = write!(
                out,
                "{prefix}{}{}:{}",
                if last { "╰─── " } else { "├─── " },
                node.key,
                edge.requested
            );
            if edge.requested != node.version {
                let _ = write!(out, " -> {}", node.version);
            }
            let repeated = !children.is_empty() && !printed.insert(edge.to);
            if repeated {
                out.push_str(" (*)");
            }
            out.push('\n');

            if !repeated {
                let nested = format!("{prefix}{}", if last { "     " } else { "│    " });
                self.render_level(&children, &nested, printed, out);
            }
        }
    }
}
