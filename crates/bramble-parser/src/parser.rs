use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use bramble_config::ParserConfig;
use bramble_core::{BuildTarget, Cell, CellRegistry};
use bramble_vfs::WatchEvent;

use crate::cancel::CancellationToken;
use crate::daemon_state::{CacheStats, DaemonicParserState};
use crate::error::ParserError;
use crate::evaluator::BuildFileEvaluator;
use crate::factory::TargetNodeFactory;
use crate::graph::{TargetGraph, TargetGraphBuilder};
use crate::macros::MacroRegistry;
use crate::node::TargetNode;
use crate::per_build::{ParsingStrategy, PerBuildState};
use crate::raw::{BuildFileManifest, RawTargetNode};
use crate::rules::RuleRegistry;
use crate::spec::TargetNodeSpec;
use crate::traversal::{AcyclicDepthFirstPostOrderTraversal, GraphTraversalVisitor, TraversalError};

/// Per-request knobs.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Worker pool for the parallel strategy. Without one, requests run serially.
    pub executor: Option<Arc<rayon::ThreadPool>>,
    pub cancellation: CancellationToken,
    /// Collect per-build-file evaluation times and log them when the request ends.
    pub profiling: bool,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executor(mut self, executor: Arc<rayon::ThreadPool>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_profiling(mut self, profiling: bool) -> Self {
        self.profiling = profiling;
        self
    }
}

/// Entry point for everything that reads build files: target lookup, spec resolution and graph
/// construction. Cheap to clone; clones share caches.
#[derive(Debug, Clone)]
pub struct Parser {
    state: Arc<DaemonicParserState>,
    config: ParserConfig,
}

impl Parser {
    pub fn new(
        cells: CellRegistry,
        evaluator: Arc<dyn BuildFileEvaluator>,
        rules: Arc<RuleRegistry>,
        config: ParserConfig,
    ) -> Self {
        let factory = TargetNodeFactory::new(rules, Arc::new(MacroRegistry::builtin()))
            .with_package_boundary_enforcement(config.enforce_package_boundary);
        Self::with_state(
            Arc::new(DaemonicParserState::new(cells, evaluator, factory)),
            config,
        )
    }

    pub fn with_state(state: Arc<DaemonicParserState>, config: ParserConfig) -> Self {
        Self { state, config }
    }

    pub fn state(&self) -> &Arc<DaemonicParserState> {
        &self.state
    }

    pub fn cells(&self) -> &CellRegistry {
        self.state.cells()
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    pub fn stats(&self) -> CacheStats {
        self.state.stats()
    }

    pub fn get_raw_target_nodes(
        &self,
        cell: &Cell,
        build_file: &Path,
    ) -> Result<Arc<BuildFileManifest>, ParserError> {
        self.state.get_all_raw_nodes(cell, build_file, None)
    }

    pub fn get_all_target_nodes(
        &self,
        cell: &Cell,
        build_file: &Path,
        options: &ParseOptions,
    ) -> Result<Vec<Arc<TargetNode>>, ParserError> {
        self.per_build(options, false).get_all_target_nodes(cell, build_file)
    }

    pub fn get_target_node(
        &self,
        target: &BuildTarget,
        options: &ParseOptions,
    ) -> Result<Arc<TargetNode>, ParserError> {
        self.per_build(options, false).get_target_node(target)
    }

    /// The raw attributes behind `node`, with its direct dependencies attached. For debugging and
    /// introspection.
    pub fn get_raw_target_node(&self, node: &TargetNode) -> Result<RawTargetNode, ParserError> {
        self.state.get_raw_target_node(node)
    }

    pub fn build_target_graph(
        &self,
        targets: impl IntoIterator<Item = BuildTarget>,
        options: &ParseOptions,
    ) -> Result<TargetGraph, ParserError> {
        let roots: Vec<BuildTarget> = targets.into_iter().collect();
        let per_build = self.per_build(options, false);
        build_graph(&per_build, roots)
    }

    pub fn resolve_target_specs(
        &self,
        specs: &[TargetNodeSpec],
        options: &ParseOptions,
    ) -> Result<BTreeSet<BuildTarget>, ParserError> {
        let per_build = self.per_build(options, is_comprehensive(specs));
        resolve_specs(&per_build, specs)
    }

    /// Resolves `specs` and builds the graph of everything they reach.
    pub fn build_target_graph_for_target_node_specs(
        &self,
        specs: &[TargetNodeSpec],
        options: &ParseOptions,
    ) -> Result<(BTreeSet<BuildTarget>, TargetGraph), ParserError> {
        let per_build = self.per_build(options, is_comprehensive(specs));
        let targets = resolve_specs(&per_build, specs)?;
        let graph = build_graph(&per_build, targets.iter().cloned().collect())?;
        Ok((targets, graph))
    }

    /// Applies a watcher event to the caches. Returns the number of target nodes dropped.
    pub fn on_file_system_change(&self, event: &WatchEvent) -> usize {
        self.state.invalidate_based_on(event)
    }

    fn per_build<'a>(
        &'a self,
        options: &'a ParseOptions,
        comprehensive: bool,
    ) -> PerBuildState<'a> {
        let strategy = match &options.executor {
            Some(pool) if self.config.enable_parallel_parsing && !comprehensive => {
                ParsingStrategy::Parallel(pool.as_ref())
            }
            _ => ParsingStrategy::Serial,
        };
        PerBuildState::new(
            &self.state,
            options.cancellation.clone(),
            options.profiling,
            strategy,
        )
    }
}

fn is_comprehensive(specs: &[TargetNodeSpec]) -> bool {
    specs
        .iter()
        .any(|spec| spec.build_file_spec().is_comprehensive())
}

fn resolve_specs(
    per_build: &PerBuildState<'_>,
    specs: &[TargetNodeSpec],
) -> Result<BTreeSet<BuildTarget>, ParserError> {
    let cells = per_build.state().cells();
    let mut jobs: Vec<(&TargetNodeSpec, &Cell, Vec<PathBuf>)> = Vec::with_capacity(specs.len());
    for spec in specs {
        per_build.check_cancelled()?;
        let build_file_spec = spec.build_file_spec();
        let cell = cells
            .get(build_file_spec.cell())
            .ok_or_else(|| ParserError::UnknownCell(build_file_spec.cell().clone()))?;
        let build_files = build_file_spec.find_build_files(cell)?;
        jobs.push((spec, cell, build_files));
    }

    let all_files: Vec<(Cell, PathBuf)> = jobs
        .iter()
        .flat_map(|(_, cell, files)| files.iter().map(|file| ((*cell).clone(), file.clone())))
        .collect();
    per_build.start_parsing(&all_files);

    let mut resolved = BTreeSet::new();
    for (spec, cell, build_files) in &jobs {
        for build_file in build_files {
            let nodes = per_build.get_all_target_nodes(cell, build_file)?;
            let matched = spec.filter(&nodes);
            match spec {
                TargetNodeSpec::BuildTarget(target_spec) if matched.is_empty() => {
                    return Err(ParserError::TargetNotFound {
                        target: target_spec.target().clone(),
                        build_file: build_file.clone(),
                        available: nodes
                            .iter()
                            .map(|node| node.build_target().short_name().to_owned())
                            .collect(),
                    });
                }
                _ => {}
            }
            resolved.extend(matched);
        }
    }
    Ok(resolved)
}

fn build_graph(
    per_build: &PerBuildState<'_>,
    roots: Vec<BuildTarget>,
) -> Result<TargetGraph, ParserError> {
    let started = Instant::now();
    per_build.warm_dependency_closure(&roots);

    let visitor = GraphBuilderVisitor {
        per_build,
        loaded: HashMap::new(),
        builder: TargetGraph::builder(),
    };
    let mut traversal = AcyclicDepthFirstPostOrderTraversal::new(visitor);
    traversal.traverse(roots.iter().cloned()).map_err(|err| match err {
        TraversalError::Cycle(cycle) => ParserError::Cycle { cycle },
        TraversalError::Visitor(err) => err,
    })?;
    let graph = traversal.into_visitor().builder.build();

    tracing::debug!(
        target: "bramble.parser",
        roots = roots.len(),
        nodes = graph.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "built target graph"
    );
    Ok(graph)
}

struct GraphBuilderVisitor<'a, 'b> {
    per_build: &'b PerBuildState<'a>,
    loaded: HashMap<BuildTarget, Arc<TargetNode>>,
    builder: TargetGraphBuilder,
}

impl GraphBuilderVisitor<'_, '_> {
    fn load(&mut self, target: &BuildTarget) -> Result<Arc<TargetNode>, ParserError> {
        if let Some(node) = self.loaded.get(target) {
            return Ok(Arc::clone(node));
        }
        let node = self.per_build.get_target_node(target)?;
        self.loaded.insert(target.clone(), Arc::clone(&node));
        Ok(node)
    }
}

impl GraphTraversalVisitor<BuildTarget> for GraphBuilderVisitor<'_, '_> {
    type Error = ParserError;

    fn find_children(&mut self, target: &BuildTarget) -> Result<Vec<BuildTarget>, ParserError> {
        self.per_build.check_cancelled()?;
        let node = self.load(target)?;
        let mut children = Vec::new();
        for dep in node.deps() {
            let dep_node = self
                .load(dep)
                .map_err(|err| ParserError::DependencyResolution {
                    dependent: target.clone(),
                    dependency: dep.clone(),
                    source: Box::new(err),
                })?;
            dep_node.check_visible_to(target)?;
            children.push(dep.clone());
        }
        Ok(children)
    }

    fn on_node_explored(&mut self, target: &BuildTarget) -> Result<(), ParserError> {
        let node = self.load(target)?;
        self.builder.add_node(Arc::clone(&node));
        for dep in node.deps() {
            self.builder.add_edge(target, dep);
        }
        Ok(())
    }
}
