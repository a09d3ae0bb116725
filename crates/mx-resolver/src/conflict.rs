//! Version conflict resolution.
//!
//! Every module keeps one node in the graph. When its live incoming edges
//! request different versions, the highest one wins, unless the request
//! forces a version. A version once selected stays a candidate for the
//! rest of the request, so losing the edge that asked for an upgrade never
//! downgrades the node again. Applying a new version invalidates the node's
//! expansion; the graph builder re-expands it and runs this pass again
//! until nothing changes.

use crate::coordinates::ModuleKey;
use crate::graph::{Graph, LiveSet};
use crate::version::max_version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// A module that was requested at more than one version, or forced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub module: ModuleKey,
    /// Distinct requested versions, in request order
    pub requested: Vec<String>,
    pub selected: String,
    pub forced: bool,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} -> {}",
            self.module,
            self.requested.join(", "),
            self.selected
        )?;
        if self.forced {
            f.write_str(" (forced)")?;
        }
        Ok(())
    }
}

/// The version to use given everything requested.
///
/// A forced version always wins, even when it is lower than a request.
/// Otherwise the maximum wins, so the result is never below any request.
pub fn select_version<'a>(requested: &[&'a str], forced: Option<&'a str>) -> Option<&'a str> {
    forced.or_else(|| max_version(requested.iter().copied()))
}

pub(crate) struct ConflictResolver<'a> {
    force: &'a BTreeMap<ModuleKey, String>,
}

impl<'a> ConflictResolver<'a> {
    pub(crate) fn new(force: &'a BTreeMap<ModuleKey, String>) -> Self {
        Self { force }
    }

    pub(crate) fn forced(&self, key: &ModuleKey) -> Option<&'a str> {
        self.force.get(key).map(String::as_str)
    }

    /// Apply the selection rule to every live node. Returns whether any
    /// node changed version.
    ///
    /// Candidates are the versions requested by counting edges plus every
    /// version the node has held, so unforced selection only moves up.
    pub(crate) fn apply(&self, graph: &mut Graph, live: &LiveSet) -> bool {
        let mut changed = false;
        for &id in &live.ids {
            let node = &graph.nodes[id];
            let requested = graph.requested_versions(id, live);
            let candidates: Vec<&str> = requested
                .iter()
                .copied()
                .chain(node.history.iter().map(String::as_str))
                .collect();
            let Some(selected) = select_version(&candidates, self.forced(&node.key)) else {
                continue;
            };
            if selected == node.version {
                continue;
            }
            debug!(
                "Conflict on {}: requested [{}], selecting {} over {}",
                node.key,
                requested.join(", "),
                selected,
                node.version
            );
            let selected = selected.to_string();
            graph.set_version(id, selected);
            changed = true;
        }
        changed
    }

    /// Conflicts and forced overrides in the final graph.
    pub(crate) fn report(&self, graph: &Graph, live: &LiveSet) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for &id in &live.ids {
            let node = &graph.nodes[id];
            let mut requested: Vec<String> = Vec::new();
            for version in graph.requested_versions(id, live) {
                if !requested.iter().any(|v| v == version) {
                    requested.push(version.to_string());
                }
            }
            let forced = self.forced(&node.key).is_some();
            if requested.len() > 1 || (forced && requested.iter().any(|v| *v != node.version)) {
                conflicts.push(Conflict {
                    module: node.key.clone(),
                    requested,
                    selected: node.version.clone(),
                    forced,
                });
            }
        }
        conflicts
    }
}
