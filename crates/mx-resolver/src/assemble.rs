//! Turning a converged graph into classpaths.

use crate::component::{ArtifactFile, Scope};
use crate::conflict::Conflict;
use crate::coordinates::{MavenCoordinates, ModuleKey};
use crate::error::ResolveError;
use crate::fetch::{FetchOutcome, ResolvedArtifact};
use crate::graph::{NodeId, ResolvedGraph};
use crate::repository::{Repository, RepositoryClient};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::Path;
use tracing::{debug, warn};

/// Provenance of a resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub chosen_versions: BTreeMap<ModuleKey, String>,
    /// Modules requested at several versions, and forced overrides
    pub conflicts: Vec<Conflict>,
    pub warnings: Vec<String>,
    /// Local modules that contributed dependencies
    pub local_modules: Vec<String>,
}

impl ResolutionReport {
    pub fn forced(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter().filter(|c| c.forced)
    }
}

/// Resolved files, in classpath order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// The classpath for the requested scope
    pub classpath: Vec<ResolvedArtifact>,
    pub compile: Vec<ResolvedArtifact>,
    pub runtime: Vec<ResolvedArtifact>,
    /// `-sources.jar` files, when requested
    pub sources: Vec<ResolvedArtifact>,
    pub report: ResolutionReport,
}

impl ResolutionResult {
    pub fn classpath_paths(&self) -> Vec<&Path> {
        self.classpath.iter().map(|a| a.local_path.as_path()).collect()
    }

    /// File names of the classpath, e.g. `slf4j-api-2.0.9.jar`.
    pub fn file_names(&self) -> Vec<String> {
        self.classpath
            .iter()
            .filter_map(|a| a.local_path.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect()
    }

    pub(crate) fn all_files_exist(&self) -> bool {
        self.classpath
            .iter()
            .chain(&self.compile)
            .chain(&self.runtime)
            .chain(&self.sources)
            .all(|a| a.local_path.exists())
    }
}

pub(crate) struct AssembleOptions<'a> {
    pub repositories: &'a [Repository],
    pub scope: Scope,
    pub download_sources: bool,
    pub jobs: usize,
    pub show_progress: bool,
}

struct Job {
    node: NodeId,
    coords: MavenCoordinates,
    origin: String,
    file: ArtifactFile,
    sources: bool,
}

/// Order nodes so that each module comes before its dependencies.
///
/// Ties go to the module seen first during graph building, then to the
/// lower coordinate. Cycles are broken at the earliest remaining module.
pub(crate) fn topological_order(graph: &ResolvedGraph) -> Vec<NodeId> {
    let mut in_degree: BTreeMap<NodeId, usize> = graph.live.ids.iter().map(|&id| (id, 0)).collect();
    for (_, edge) in graph.live_edges() {
        if let Some(from) = edge.from
            && from != edge.to
            && let Some(d) = in_degree.get_mut(&edge.to)
        {
            *d += 1;
        }
    }

    let rank = |id: NodeId| (id, graph.graph.nodes[id].coordinates().gav());
    let mut ready: BTreeSet<(NodeId, String)> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(&id, _)| rank(id))
        .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    let mut done: HashSet<NodeId> = HashSet::new();
    while done.len() < in_degree.len() {
        let next = match ready.pop_first() {
            Some((id, _)) => id,
            None => {
                // cycle: take the earliest module still waiting
                let Some(id) = in_degree.keys().copied().find(|id| !done.contains(id)) else {
                    break;
                };
                debug!("Breaking dependency cycle at {}", graph.graph.nodes[id].key);
                id
            }
        };
        if !done.insert(next) {
            continue;
        }
        order.push(next);
        for edge in graph.outgoing(next) {
            if done.contains(&edge.to) {
                continue;
            }
            if let Some(d) = in_degree.get_mut(&edge.to) {
                *d = d.saturating_sub(1);
                if *d == 0 {
                    ready.insert(rank(edge.to));
                }
            }
        }
    }
    order
}

/// Nodes reachable from the roots through edges carrying `scope`.
pub(crate) fn reachable(graph: &ResolvedGraph, scope: Scope) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut queue: VecDeque<NodeId> = graph
        .root_edges()
        .filter(|e| e.scopes.contains(scope))
        .map(|e| e.to)
        .collect();
    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        queue.extend(
            graph
                .outgoing(id)
                .filter(|e| e.scopes.contains(scope))
                .map(|e| e.to),
        );
    }
    seen
}

/// Files a node contributes: the variant's files for plain requests, plus
/// any specific classifier or extension an incoming edge asks for.
fn files_of(graph: &ResolvedGraph, id: NodeId) -> Vec<(MavenCoordinates, ArtifactFile)> {
    let node = &graph.graph.nodes[id];
    let Some(variant) = node.variant() else {
        return Vec::new();
    };
    if variant.available_at.is_some() {
        return Vec::new();
    }
    let coords = node.coordinates();

    let mut requests: Vec<Option<(Option<String>, String)>> = Vec::new();
    let incoming = graph
        .root_edges()
        .chain(graph.live_edges().map(|(_, e)| e).filter(|e| e.from.is_some()))
        .filter(|e| e.to == id);
    for edge in incoming {
        if !requests.contains(&edge.artifact) {
            requests.push(edge.artifact.clone());
        }
    }

    let mut files = Vec::new();
    for request in requests {
        match request {
            None => files.extend(variant.files.iter().map(|f| (coords.clone(), f.clone()))),
            Some((classifier, extension)) => {
                let name = coords.file_name(classifier.as_deref(), &extension);
                let mut specific = coords.clone();
                specific.classifier = classifier;
                if extension != "jar" {
                    specific.packaging_type = Some(extension);
                }
                files.push((
                    specific,
                    ArtifactFile {
                        path: coords.repository_path(&name),
                        name,
                        checksum: None,
                    },
                ));
            }
        }
    }
    let mut seen = HashSet::new();
    files.retain(|(_, f)| seen.insert(f.path.clone()));
    files
}

pub(crate) async fn assemble(
    client: &RepositoryClient,
    graph: &ResolvedGraph,
    options: &AssembleOptions<'_>,
) -> Result<ResolutionResult, ResolveError> {
    let order = topological_order(graph);
    let compile_set = reachable(graph, Scope::Compile);
    let runtime_set = reachable(graph, Scope::Runtime);

    let mut jobs = Vec::new();
    for &id in &order {
        let node = &graph.graph.nodes[id];
        let origin = node
            .metadata()
            .map(|m| m.repository.clone())
            .unwrap_or_default();
        let files = files_of(graph, id);
        if options.download_sources && !files.is_empty() {
            let coords = node.coordinates();
            let name = coords.file_name(Some("sources"), "jar");
            let mut sources_coords = coords.clone();
            sources_coords.classifier = Some("sources".into());
            jobs.push(Job {
                node: id,
                origin: origin.clone(),
                file: ArtifactFile {
                    path: coords.repository_path(&name),
                    name,
                    checksum: None,
                },
                coords: sources_coords,
                sources: true,
            });
        }
        for (coords, file) in files {
            jobs.push(Job {
                node: id,
                coords,
                origin: origin.clone(),
                file,
                sources: false,
            });
        }
    }

    let progress = if options.show_progress {
        let bar = ProgressBar::new(jobs.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} artifacts")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut outcomes: Vec<(usize, Result<FetchOutcome, ResolveError>)> = stream::iter(
        jobs.iter().enumerate(),
    )
    .map(|(index, job)| {
        let progress = progress.clone();
        async move {
            let result = client
                .fetch_artifact(options.repositories, &job.origin, &job.coords, &job.file)
                .await;
            progress.inc(1);
            (index, result)
        }
    })
    .buffer_unordered(options.jobs.max(1))
    .collect()
    .await;
    outcomes.sort_by_key(|(index, _)| *index);
    progress.finish_and_clear();

    let mut report = ResolutionReport {
        chosen_versions: graph.chosen_versions(),
        conflicts: graph.conflicts().to_vec(),
        warnings: graph.warnings(),
        local_modules: Vec::new(),
    };
    let mut compile = Vec::new();
    let mut runtime = Vec::new();
    let mut sources = Vec::new();
    let mut errors = Vec::new();
    let mut seen_paths = HashSet::new();

    for (index, outcome) in outcomes {
        let job = &jobs[index];
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
            Err(ResolveError::Download { .. }) if job.sources => {
                report
                    .warnings
                    .push(format!("no sources published for {}", job.coords.gav()));
                continue;
            }
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        if let Some(warning) = outcome.warning {
            report.warnings.push(warning);
        }
        if !seen_paths.insert(outcome.artifact.local_path.clone()) {
            continue;
        }
        if job.sources {
            sources.push(outcome.artifact);
            continue;
        }
        if compile_set.contains(&job.node) {
            compile.push(outcome.artifact.clone());
        }
        if runtime_set.contains(&job.node) {
            runtime.push(outcome.artifact);
        }
    }

    if let Some(error) = ResolveError::aggregate(errors) {
        return Err(error);
    }
    for warning in &report.warnings {
        warn!("{}", warning);
    }

    let classpath = match options.scope {
        Scope::Compile => compile.clone(),
        Scope::Runtime => runtime.clone(),
    };
    debug!(
        "Assembled {} artifact(s) for {} scope",
        classpath.len(),
        options.scope
    );
    Ok(ResolutionResult {
        classpath,
        compile,
        runtime,
        sources,
        report,
    })
}
