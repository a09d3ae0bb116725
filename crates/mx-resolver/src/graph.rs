//! Dependency graph construction.
//!
//! The graph is an arena: one [`Node`] per `group:artifact`, edges in a
//! separate list referring to nodes by index. Building proceeds in rounds.
//! Each round resolves version conflicts among the live nodes, recomputes
//! the exclusions in effect for each node, and expands every live node whose
//! version or exclusions differ from those it was last expanded with.
//! Metadata for a round is fetched concurrently; expansion itself is
//! sequential in node order, so the result does not depend on network
//! timing. Building stops when a round changes nothing.

use crate::component::{ComponentMetadata, Scope, ScopeSet, Variant};
use crate::conflict::{Conflict, ConflictResolver};
use crate::coordinates::{ExclusionPattern, MavenCoordinates, ModuleKey};
use crate::error::ResolveError;
use crate::repository::{Repository, RepositoryClient};
use crate::variant::{Platform, select_variant};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

pub type NodeId = usize;
pub type EdgeId = usize;

/// Minimum number of rounds before giving up on convergence.
const MIN_ROUNDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    Dependency,
    /// A version constraint: takes part in conflict resolution but never
    /// brings a module into the graph
    Constraint,
}

#[derive(Debug, Clone)]
pub struct Edge {
    /// `None` for edges from the request itself
    pub from: Option<NodeId>,
    pub to: NodeId,
    pub requested: String,
    pub scopes: ScopeSet,
    /// Declared on this edge; applied below the target
    pub exclusions: BTreeSet<ExclusionPattern>,
    pub kind: EdgeKind,
    /// Non-default file requested from the target, as `(classifier, extension)`
    pub artifact: Option<(Option<String>, String)>,
    /// Cleared when the source node is re-expanded
    pub active: bool,
}

#[derive(Debug)]
pub struct Node {
    pub key: ModuleKey,
    /// Currently selected version
    pub version: String,
    pub(crate) history: Vec<String>,
    expanded: Option<(String, BTreeSet<ExclusionPattern>)>,
    pub(crate) exclusions: BTreeSet<ExclusionPattern>,
    pub(crate) metadata: Option<Arc<ComponentMetadata>>,
    pub(crate) variant: Option<Variant>,
    pub(crate) failure: Option<ResolveError>,
    pub(crate) incoming: Vec<EdgeId>,
    pub(crate) outgoing: Vec<EdgeId>,
}

impl Node {
    fn new(key: ModuleKey, version: String) -> Self {
        Self {
            key,
            history: vec![version.clone()],
            version,
            expanded: None,
            exclusions: BTreeSet::new(),
            metadata: None,
            variant: None,
            failure: None,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    pub fn coordinates(&self) -> MavenCoordinates {
        MavenCoordinates::new(&self.key.group, &self.key.artifact, &self.version)
    }

    pub fn metadata(&self) -> Option<&ComponentMetadata> {
        self.metadata.as_deref()
    }

    /// The variant selected for the request's platform and scope.
    pub fn variant(&self) -> Option<&Variant> {
        self.variant.as_ref()
    }

    fn needs_expansion(&self) -> bool {
        match &self.expanded {
            Some((version, exclusions)) => {
                *version != self.version || *exclusions != self.exclusions
            }
            None => true,
        }
    }
}

/// Nodes reachable from the request through active dependency edges.
#[derive(Debug, Clone, Default)]
pub(crate) struct LiveSet {
    /// In first-seen order
    pub(crate) ids: Vec<NodeId>,
    pub(crate) mask: Vec<bool>,
}

impl LiveSet {
    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.mask.get(id).copied().unwrap_or(false)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) roots: Vec<EdgeId>,
    index: HashMap<ModuleKey, NodeId>,
}

impl Graph {
    fn node_for(&mut self, key: &ModuleKey, version: &str) -> NodeId {
        if let Some(&id) = self.index.get(key) {
            return id;
        }
        let id = self.nodes.len();
        trace!("New node {}:{}", key, version);
        self.nodes.push(Node::new(key.clone(), version.to_string()));
        self.index.insert(key.clone(), id);
        id
    }

    fn add_edge(&mut self, edge: Edge) -> EdgeId {
        let id = self.edges.len();
        match edge.from {
            Some(from) => self.nodes[from].outgoing.push(id),
            None => self.roots.push(id),
        }
        self.nodes[edge.to].incoming.push(id);
        self.edges.push(edge);
        id
    }

    /// Whether an edge currently counts: active, and its source is live.
    pub(crate) fn edge_counts(&self, edge: &Edge, live: &LiveSet) -> bool {
        edge.active && edge.from.is_none_or(|from| live.contains(from))
    }

    pub(crate) fn live(&self) -> LiveSet {
        let mut mask = vec![false; self.nodes.len()];
        let mut ids = Vec::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();

        let follow = |edge: &Edge| edge.active && edge.kind == EdgeKind::Dependency;
        for &eid in &self.roots {
            let edge = &self.edges[eid];
            if follow(edge) && !mask[edge.to] {
                mask[edge.to] = true;
                queue.push_back(edge.to);
            }
        }
        while let Some(id) = queue.pop_front() {
            ids.push(id);
            for &eid in &self.nodes[id].outgoing {
                let edge = &self.edges[eid];
                if follow(edge) && !mask[edge.to] {
                    mask[edge.to] = true;
                    queue.push_back(edge.to);
                }
            }
        }
        ids.sort_unstable();
        LiveSet { ids, mask }
    }

    /// Versions requested of `id` by counting edges, in edge order.
    pub(crate) fn requested_versions(&self, id: NodeId, live: &LiveSet) -> Vec<&str> {
        self.nodes[id]
            .incoming
            .iter()
            .map(|&eid| &self.edges[eid])
            .filter(|edge| self.edge_counts(edge, live))
            .map(|edge| edge.requested.as_str())
            .collect()
    }

    /// Select a new version, invalidating the node's expansion.
    pub(crate) fn set_version(&mut self, id: NodeId, version: String) {
        self.deactivate_outgoing(id);
        let node = &mut self.nodes[id];
        node.history.push(version.clone());
        node.version = version;
        node.expanded = None;
        node.metadata = None;
        node.variant = None;
        node.failure = None;
    }

    fn deactivate_outgoing(&mut self, id: NodeId) {
        for &eid in &self.nodes[id].outgoing {
            self.edges[eid].active = false;
        }
    }

    /// Compute the exclusions in effect below each live node.
    ///
    /// A pattern applies below a node only if every live path into it
    /// carries the pattern, so the effective set is the intersection over
    /// incoming edges of the edge's own patterns plus those in effect at
    /// its source. Sets only shrink while iterating, so this terminates.
    fn propagate_exclusions(&mut self, live: &LiveSet, global: &BTreeSet<ExclusionPattern>) {
        let mut effective: Vec<Option<BTreeSet<ExclusionPattern>>> = vec![None; self.nodes.len()];
        let empty = BTreeSet::new();
        loop {
            let mut changed = false;
            for &id in &live.ids {
                let mut acc: Option<BTreeSet<ExclusionPattern>> = None;
                for &eid in &self.nodes[id].incoming {
                    let edge = &self.edges[eid];
                    if !self.edge_counts(edge, live) || edge.kind != EdgeKind::Dependency {
                        continue;
                    }
                    let upstream = match edge.from {
                        None => global,
                        Some(from) => match &effective[from] {
                            Some(set) => set,
                            None => continue,
                        },
                    };
                    let contribution: BTreeSet<_> =
                        edge.exclusions.union(upstream).cloned().collect();
                    acc = Some(match acc {
                        None => contribution,
                        Some(prev) => prev.intersection(&contribution).cloned().collect(),
                    });
                }
                if acc.is_some() && acc != effective[id] {
                    effective[id] = acc;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        for &id in &live.ids {
            self.nodes[id].exclusions = effective[id].take().unwrap_or_else(|| empty.clone());
        }
    }
}

/// Builds the graph for one request.
pub(crate) struct GraphBuilder<'a> {
    client: &'a RepositoryClient,
    repositories: &'a [Repository],
    platform: &'a Platform,
    scope: Scope,
    exclusions: &'a BTreeSet<ExclusionPattern>,
    conflicts: ConflictResolver<'a>,
    graph: Graph,
}

impl<'a> GraphBuilder<'a> {
    pub(crate) fn new(
        client: &'a RepositoryClient,
        repositories: &'a [Repository],
        platform: &'a Platform,
        scope: Scope,
        force: &'a BTreeMap<ModuleKey, String>,
        exclusions: &'a BTreeSet<ExclusionPattern>,
    ) -> Self {
        Self {
            client,
            repositories,
            platform,
            scope,
            exclusions,
            conflicts: ConflictResolver::new(force),
            graph: Graph::default(),
        }
    }

    pub(crate) async fn build(
        mut self,
        roots: &[MavenCoordinates],
    ) -> Result<ResolvedGraph, ResolveError> {
        for coords in roots {
            let artifact = (coords.classifier.is_some() || coords.packaging_type.is_some()).then(|| {
                (
                    coords.classifier.clone(),
                    coords.packaging_type.clone().unwrap_or_else(|| "jar".into()),
                )
            });
            self.add_dependency(
                None,
                &coords.key(),
                &coords.version,
                ScopeSet::BOTH,
                self.exclusions.clone(),
                EdgeKind::Dependency,
                artifact,
            );
        }

        let mut round = 0;
        let live = loop {
            round += 1;
            let cap = MIN_ROUNDS.max(4 * self.graph.nodes.len());
            if round > cap {
                return Err(self.non_convergence(round - 1));
            }

            let mut live = self.graph.live();
            let changed = self.conflicts.apply(&mut self.graph, &live);
            if changed {
                live = self.graph.live();
            }
            self.graph.propagate_exclusions(&live, self.exclusions);

            let pending: Vec<NodeId> = live
                .ids
                .iter()
                .copied()
                .filter(|&id| self.graph.nodes[id].needs_expansion())
                .collect();
            if pending.is_empty() {
                if changed {
                    continue;
                }
                break live;
            }
            debug!("Round {}: expanding {} node(s)", round, pending.len());
            self.expand_wave(&pending).await?;
        };

        self.finish(live, round)
    }

    #[allow(clippy::too_many_arguments)]
    fn add_dependency(
        &mut self,
        from: Option<NodeId>,
        key: &ModuleKey,
        version: &str,
        scopes: ScopeSet,
        exclusions: BTreeSet<ExclusionPattern>,
        kind: EdgeKind,
        artifact: Option<(Option<String>, String)>,
    ) {
        let initial = self.conflicts.forced(key).unwrap_or(version);
        let to = self.graph.node_for(key, initial);
        self.graph.add_edge(Edge {
            from,
            to,
            requested: version.to_string(),
            scopes,
            exclusions,
            kind,
            artifact,
            active: true,
        });
    }

    async fn expand_wave(&mut self, pending: &[NodeId]) -> Result<(), ResolveError> {
        let fetches = pending.iter().map(|&id| {
            let coords = self.graph.nodes[id].coordinates();
            let client = self.client;
            let repositories = self.repositories;
            async move { client.fetch_metadata(repositories, &coords).await }
        });
        let results = futures::future::join_all(fetches).await;

        for (&id, fetched) in pending.iter().zip(results) {
            self.expand(id, fetched)?;
        }
        Ok(())
    }

    fn expand(
        &mut self,
        id: NodeId,
        fetched: Result<Arc<ComponentMetadata>, ResolveError>,
    ) -> Result<(), ResolveError> {
        self.graph.deactivate_outgoing(id);
        let node = &mut self.graph.nodes[id];
        if node.expanded.is_some() {
            debug!("Re-expanding {}:{}", node.key, node.version);
        }
        node.expanded = Some((node.version.clone(), node.exclusions.clone()));

        let metadata = match fetched {
            Ok(metadata) => metadata,
            Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
            Err(e) => {
                debug!("Failed to resolve {}:{}: {}", node.key, node.version, e);
                node.failure = Some(e);
                return Ok(());
            }
        };
        let variant = match select_variant(&metadata, self.platform, self.scope) {
            Ok(variant) => variant.clone(),
            Err(e) => {
                node.failure = Some(e);
                return Ok(());
            }
        };
        node.failure = None;
        let key = node.key.clone();
        let below = node.exclusions.clone();
        node.metadata = Some(metadata);

        if let Some(target) = &variant.available_at {
            trace!("{} is available at {}", key, target);
            self.add_dependency(
                Some(id),
                &target.key(),
                &target.version,
                ScopeSet::BOTH,
                BTreeSet::new(),
                EdgeKind::Dependency,
                None,
            );
        } else {
            let declared = variant
                .dependencies
                .iter()
                .map(|d| (d, EdgeKind::Dependency))
                .chain(variant.constraints.iter().map(|d| (d, EdgeKind::Constraint)));
            for (dep, kind) in declared {
                if dep.key == key || !dep.scopes.contains(self.scope) {
                    continue;
                }
                if below.iter().any(|p| p.matches(&dep.key)) {
                    trace!("{}: excluded {}", key, dep.key);
                    continue;
                }
                self.add_dependency(
                    Some(id),
                    &dep.key,
                    &dep.version,
                    dep.scopes,
                    dep.exclusions.clone(),
                    kind,
                    dep.artifact.clone(),
                );
            }
        }

        self.graph.nodes[id].variant = Some(variant);
        Ok(())
    }

    fn non_convergence(&self, rounds: usize) -> ResolveError {
        let describe = |node: &Node| {
            let tail = node.history.len().saturating_sub(4);
            format!("{} ({})", node.key, node.history[tail..].join(" -> "))
        };
        let unstable: Vec<&Node> = self.graph.nodes.iter().filter(|n| n.history.len() > 2).collect();
        let chain = if unstable.is_empty() {
            self.graph
                .nodes
                .iter()
                .filter(|n| n.history.len() > 1)
                .map(describe)
                .collect()
        } else {
            unstable.into_iter().map(describe).collect()
        };
        ResolveError::NonConvergence {
            iterations: rounds,
            chain,
        }
    }

    fn finish(mut self, live: LiveSet, rounds: usize) -> Result<ResolvedGraph, ResolveError> {
        let failures: Vec<ResolveError> = live
            .ids
            .iter()
            .filter_map(|&id| self.graph.nodes[id].failure.take())
            .collect();
        if let Some(error) = ResolveError::aggregate(failures) {
            return Err(error);
        }

        let conflicts = self.conflicts.report(&self.graph, &live);
        debug!(
            "Graph converged after {} round(s): {} module(s), {} conflict(s)",
            rounds,
            live.ids.len(),
            conflicts.len()
        );
        Ok(ResolvedGraph {
            graph: self.graph,
            live,
            conflicts,
            rounds,
        })
    }
}

/// A converged dependency graph.
#[derive(Debug)]
pub struct ResolvedGraph {
    pub(crate) graph: Graph,
    pub(crate) live: LiveSet,
    conflicts: Vec<Conflict>,
    rounds: usize,
}

impl ResolvedGraph {
    /// Modules in the graph, in first-seen order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.live.ids.iter().map(|&id| &self.graph.nodes[id])
    }

    pub fn node(&self, key: &ModuleKey) -> Option<&Node> {
        let &id = self.graph.index.get(key)?;
        self.live.contains(id).then(|| &self.graph.nodes[id])
    }

    pub fn version_of(&self, key: &ModuleKey) -> Option<&str> {
        self.node(key).map(|n| n.version.as_str())
    }

    pub fn chosen_versions(&self) -> BTreeMap<ModuleKey, String> {
        self.nodes()
            .map(|n| (n.key.clone(), n.version.clone()))
            .collect()
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Number of build rounds until convergence.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Metadata warnings of every module in the graph.
    pub fn warnings(&self) -> Vec<String> {
        self.nodes()
            .filter_map(|n| n.metadata())
            .flat_map(|m| m.warnings.iter().cloned())
            .collect()
    }

    /// Edges that count in the final graph.
    pub(crate) fn live_edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.graph
            .edges
            .iter()
            .enumerate()
            .filter(|(_, e)| e.kind == EdgeKind::Dependency && self.graph.edge_counts(e, &self.live))
    }

    pub(crate) fn root_edges(&self) -> impl Iterator<Item = &Edge> {
        self.graph
            .roots
            .iter()
            .map(|&eid| &self.graph.edges[eid])
            .filter(|e| e.active && e.kind == EdgeKind::Dependency)
    }

    pub(crate) fn outgoing(&self, id: NodeId) -> impl Iterator<Item = &Edge> {
        self.graph.nodes[id]
            .outgoing
            .iter()
            .map(|&eid| &self.graph.edges[eid])
            .filter(|e| e.active && e.kind == EdgeKind::Dependency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::CacheLayout;
    use crate::retry::RetryPolicy;
    use crate::testing::{LibrarySpec, TEST_REPO};
    use crate::transport::MemoryTransport;
    use std::path::Path;
    use tempfile::tempdir;

    struct Fixture {
        transport: Arc<MemoryTransport>,
        client: RepositoryClient,
        repos: Vec<Repository>,
        force: BTreeMap<ModuleKey, String>,
        exclusions: BTreeSet<ExclusionPattern>,
    }

    impl Fixture {
        fn new(root: &Path) -> Self {
            let transport = MemoryTransport::new().into_shared();
            let client = RepositoryClient::new(transport.clone(), CacheLayout::new(root))
                .with_retry(RetryPolicy::none());
            Self {
                transport,
                client,
                repos: vec![Repository::new(TEST_REPO)],
                force: BTreeMap::new(),
                exclusions: BTreeSet::new(),
            }
        }

        fn publish(&self, spec: LibrarySpec) {
            spec.publish(&self.transport, TEST_REPO);
        }

        async fn build(&self, roots: &[&str]) -> Result<ResolvedGraph, ResolveError> {
            let roots: Vec<MavenCoordinates> = roots.iter().map(|r| r.parse().unwrap()).collect();
            GraphBuilder::new(
                &self.client,
                &self.repos,
                &Platform::Jvm,
                Scope::Runtime,
                &self.force,
                &self.exclusions,
            )
            .build(&roots)
            .await
        }
    }

    fn key(s: &str) -> ModuleKey {
        let (g, a) = s.split_once(':').unwrap();
        ModuleKey::new(g, a)
    }

    #[tokio::test]
    async fn test_highest_version_wins_regardless_of_order() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        fx.publish(LibrarySpec::new("g", "a", "1").depends_on("g", "c", "1.0"));
        fx.publish(LibrarySpec::new("g", "b", "1").depends_on("g", "c", "2.0"));
        fx.publish(LibrarySpec::new("g", "c", "1.0"));
        fx.publish(LibrarySpec::new("g", "c", "2.0"));

        let forward = fx.build(&["g:a:1", "g:b:1"]).await.unwrap();
        assert_eq!(forward.version_of(&key("g:c")), Some("2.0"));
        let backward = fx.build(&["g:b:1", "g:a:1"]).await.unwrap();
        assert_eq!(backward.version_of(&key("g:c")), Some("2.0"));

        assert_eq!(forward.conflicts().len(), 1);
        assert_eq!(forward.conflicts()[0].requested, vec!["1.0", "2.0"]);
    }

    #[tokio::test]
    async fn test_upgrade_drops_dependencies_of_old_version() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        fx.publish(LibrarySpec::new("g", "a", "1").depends_on("g", "c", "1.0"));
        fx.publish(LibrarySpec::new("g", "b", "1").depends_on("g", "x", "1"));
        fx.publish(LibrarySpec::new("g", "x", "1").depends_on("g", "c", "2.0"));
        fx.publish(LibrarySpec::new("g", "c", "1.0").depends_on("g", "old", "1"));
        fx.publish(LibrarySpec::new("g", "c", "2.0"));
        fx.publish(LibrarySpec::new("g", "old", "1"));

        let graph = fx.build(&["g:a:1", "g:b:1"]).await.unwrap();
        assert_eq!(graph.version_of(&key("g:c")), Some("2.0"));
        assert!(graph.node(&key("g:old")).is_none());
    }

    #[tokio::test]
    async fn test_forced_version_downgrades() {
        let dir = tempdir().unwrap();
        let mut fx = Fixture::new(dir.path());
        for v in ["1.0", "1.1", "1.2"] {
            fx.publish(LibrarySpec::new("g", "lib", v));
        }
        fx.publish(LibrarySpec::new("g", "a", "1").depends_on("g", "lib", "1.1"));
        fx.publish(LibrarySpec::new("g", "b", "1").depends_on("g", "lib", "1.2"));

        let normal = fx.build(&["g:lib:1.0", "g:a:1", "g:b:1"]).await.unwrap();
        assert_eq!(normal.version_of(&key("g:lib")), Some("1.2"));

        fx.force.insert(key("g:lib"), "1.0".into());
        let forced = fx.build(&["g:lib:1.0", "g:a:1", "g:b:1"]).await.unwrap();
        assert_eq!(forced.version_of(&key("g:lib")), Some("1.0"));
        assert!(forced.conflicts()[0].forced);
        // the forced version is the only one ever fetched
        let pom_1_2 = LibrarySpec::new("g", "lib", "1.2").url(TEST_REPO, None, "pom");
        assert_eq!(fx.transport.request_count(&pom_1_2), 1);
    }

    #[tokio::test]
    async fn test_exclusion_applies_only_below_excluding_edge() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let excluding = crate::pom::PomDependency {
            exclusions: vec![crate::pom::PomExclusion {
                group_id: "g".into(),
                artifact_id: "shared".into(),
            }],
            ..crate::pom::PomDependency::new("g", "mid", Some("1"))
        };
        fx.publish(LibrarySpec::new("g", "a", "1").dependency(excluding));
        fx.publish(LibrarySpec::new("g", "mid", "1").depends_on("g", "shared", "1"));
        fx.publish(LibrarySpec::new("g", "shared", "1"));
        fx.publish(LibrarySpec::new("g", "b", "1").depends_on("g", "shared", "1"));

        let only_excluding = fx.build(&["g:a:1"]).await.unwrap();
        assert!(only_excluding.node(&key("g:mid")).is_some());
        assert!(only_excluding.node(&key("g:shared")).is_none());

        let both = fx.build(&["g:a:1", "g:b:1"]).await.unwrap();
        assert!(both.node(&key("g:shared")).is_some());
    }

    #[tokio::test]
    async fn test_exclusion_propagates_to_descendants() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let excluding = crate::pom::PomDependency {
            exclusions: vec![crate::pom::PomExclusion {
                group_id: "bad".into(),
                artifact_id: "*".into(),
            }],
            ..crate::pom::PomDependency::new("g", "mid", Some("1"))
        };
        fx.publish(LibrarySpec::new("g", "a", "1").dependency(excluding));
        fx.publish(LibrarySpec::new("g", "mid", "1").depends_on("g", "deep", "1"));
        fx.publish(LibrarySpec::new("g", "deep", "1").depends_on("bad", "thing", "1"));

        let graph = fx.build(&["g:a:1"]).await.unwrap();
        assert!(graph.node(&key("g:deep")).is_some());
        assert!(graph.node(&key("bad:thing")).is_none());
    }

    #[tokio::test]
    async fn test_cycles_terminate() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        fx.publish(LibrarySpec::new("g", "a", "1").depends_on("g", "b", "1"));
        fx.publish(LibrarySpec::new("g", "b", "1").depends_on("g", "a", "1"));

        let graph = fx.build(&["g:a:1"]).await.unwrap();
        assert_eq!(graph.nodes().count(), 2);
        let pom = LibrarySpec::new("g", "a", "1").url(TEST_REPO, None, "pom");
        assert_eq!(fx.transport.request_count(&pom), 1);
    }

    #[tokio::test]
    async fn test_upgrade_that_drops_its_requester_converges() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        fx.publish(LibrarySpec::new("g", "a", "1").depends_on("g", "b", "1"));
        fx.publish(LibrarySpec::new("g", "b", "1").depends_on("g", "a", "2"));
        fx.publish(LibrarySpec::new("g", "a", "2"));

        let graph = fx.build(&["g:a:1"]).await.unwrap();
        assert_eq!(graph.version_of(&key("g:a")), Some("2"));
        assert!(graph.node(&key("g:b")).is_none());
        let pom = LibrarySpec::new("g", "a", "2").url(TEST_REPO, None, "pom");
        assert_eq!(fx.transport.request_count(&pom), 1);
    }

    #[tokio::test]
    async fn test_selected_version_never_drops_without_force() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        fx.publish(
            LibrarySpec::new("g", "a", "1")
                .depends_on("g", "lib", "1.0")
                .depends_on("g", "b", "1"),
        );
        fx.publish(LibrarySpec::new("g", "b", "1").depends_on("g", "c", "1"));
        fx.publish(LibrarySpec::new("g", "c", "1").depends_on("g", "lib", "2.0"));
        fx.publish(LibrarySpec::new("g", "lib", "1.0"));
        fx.publish(LibrarySpec::new("g", "lib", "2.0").depends_on("g", "b", "2"));
        fx.publish(LibrarySpec::new("g", "b", "2"));

        let graph = fx.build(&["g:a:1"]).await.unwrap();
        assert_eq!(graph.version_of(&key("g:lib")), Some("2.0"));
        assert_eq!(graph.version_of(&key("g:b")), Some("2"));
        assert!(graph.node(&key("g:c")).is_none());
    }

    #[test]
    fn test_non_convergence_names_unstable_modules() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let platform = Platform::Jvm;
        let mut builder = GraphBuilder::new(
            &fx.client,
            &fx.repos,
            &platform,
            Scope::Runtime,
            &fx.force,
            &fx.exclusions,
        );
        let stable = builder.graph.node_for(&key("g:stable"), "1");
        let flapping = builder.graph.node_for(&key("g:flapping"), "1");
        builder.graph.set_version(stable, "2".into());
        for v in ["2", "3", "4", "5"] {
            builder.graph.set_version(flapping, v.into());
        }

        match builder.non_convergence(16) {
            ResolveError::NonConvergence { iterations, chain } => {
                assert_eq!(iterations, 16);
                assert_eq!(chain, vec!["g:flapping (2 -> 3 -> 4 -> 5)"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_modules_are_all_reported() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        fx.publish(LibrarySpec::new("g", "present", "1"));

        let err = fx.build(&["g:x:1", "g:present:1", "g:y:2"]).await.unwrap_err();
        let all = err.flatten();
        assert_eq!(all.len(), 2);
        assert!(all[0].to_string().contains("g:x:1"));
        assert!(all[1].to_string().contains("g:y:2"));
    }

    #[tokio::test]
    async fn test_constraints_do_not_add_modules() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        let module = serde_json::json!({
            "formatVersion": "1.1",
            "component": { "group": "g", "module": "platform", "version": "1" },
            "variants": [{
                "name": "runtimeElements",
                "attributes": { "org.gradle.category": "library", "org.gradle.usage": "java-runtime" },
                "dependencyConstraints": [
                    { "group": "g", "module": "c", "version": { "requires": "2.0" } },
                    { "group": "g", "module": "unused", "version": { "requires": "9" } }
                ]
            }]
        });
        fx.publish(LibrarySpec::new("g", "platform", "1").gradle_module(module.to_string()));
        fx.publish(LibrarySpec::new("g", "c", "1.0"));
        fx.publish(LibrarySpec::new("g", "c", "2.0"));

        let graph = fx.build(&["g:platform:1", "g:c:1.0"]).await.unwrap();
        assert_eq!(graph.version_of(&key("g:c")), Some("2.0"));
        assert!(graph.node(&key("g:unused")).is_none());
    }

    #[tokio::test]
    async fn test_runtime_scope_dependencies_follow_runtime_variant() {
        let dir = tempdir().unwrap();
        let fx = Fixture::new(dir.path());
        fx.publish(
            LibrarySpec::new("g", "a", "1")
                .depends_on_scoped("g", "rt", "1", "runtime")
                .depends_on_scoped("g", "prov", "1", "provided")
                .depends_on_scoped("g", "junit", "1", "test"),
        );
        fx.publish(LibrarySpec::new("g", "rt", "1"));

        let graph = fx.build(&["g:a:1"]).await.unwrap();
        let modules: Vec<String> = graph.nodes().map(|n| n.key.to_string()).collect();
        assert_eq!(modules, vec!["g:a", "g:rt"]);
    }
}
