use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use bramble_core::BuildTarget;
use indexmap::IndexMap;

use crate::node::TargetNode;

/// An immutable, acyclic graph of target nodes.
///
/// Nodes iterate in post-order: every node comes after all of its dependencies. The index also
/// resolves the unflavored form of a flavored node unless that target is in the graph itself.
#[derive(Debug, Clone, Default)]
pub struct TargetGraph {
    nodes: IndexMap<BuildTarget, Arc<TargetNode>>,
    outgoing: HashMap<BuildTarget, BTreeSet<BuildTarget>>,
    incoming: HashMap<BuildTarget, BTreeSet<BuildTarget>>,
    index: HashMap<BuildTarget, Arc<TargetNode>>,
}

impl TargetGraph {
    pub fn builder() -> TargetGraphBuilder {
        TargetGraphBuilder::default()
    }

    /// Looks up a node by target, including unflavored aliases.
    pub fn get(&self, target: &BuildTarget) -> Option<&Arc<TargetNode>> {
        self.index.get(target)
    }

    pub fn contains(&self, target: &BuildTarget) -> bool {
        self.nodes.contains_key(target)
    }

    pub fn nodes(&self) -> impl ExactSizeIterator<Item = &Arc<TargetNode>> {
        self.nodes.values()
    }

    pub fn targets(&self) -> impl ExactSizeIterator<Item = &BuildTarget> {
        self.nodes.keys()
    }

    /// Index of `target` in post-order.
    pub fn position(&self, target: &BuildTarget) -> Option<usize> {
        self.nodes.get_index_of(target)
    }

    pub fn outgoing(&self, target: &BuildTarget) -> impl Iterator<Item = &BuildTarget> {
        self.outgoing.get(target).into_iter().flatten()
    }

    pub fn incoming(&self, target: &BuildTarget) -> impl Iterator<Item = &BuildTarget> {
        self.incoming.get(target).into_iter().flatten()
    }

    /// Every `(dependent, dependency)` edge, dependents in post-order.
    pub fn edges(&self) -> impl Iterator<Item = (&BuildTarget, &BuildTarget)> {
        self.nodes
            .keys()
            .flat_map(move |from| self.outgoing(from).map(move |to| (from, to)))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Append-only builder used while the traversal runs.
#[derive(Debug, Default)]
pub struct TargetGraphBuilder {
    graph: TargetGraph,
}

impl TargetGraphBuilder {
    pub fn add_node(&mut self, node: Arc<TargetNode>) {
        let target = node.build_target().clone();
        if target.is_flavored() {
            self.add_alias(target.unflavored(), &node);
        }
        self.graph.index.insert(target.clone(), Arc::clone(&node));
        self.graph.nodes.insert(target, node);
    }

    fn add_alias(&mut self, unflavored: BuildTarget, node: &Arc<TargetNode>) {
        match self.graph.index.get(&unflavored) {
            None => {
                self.graph.index.insert(unflavored, Arc::clone(node));
            }
            Some(existing) if existing.build_target() == &unflavored => {}
            Some(existing) if Arc::ptr_eq(existing, node) => {}
            Some(existing) => tracing::warn!(
                target: "bramble.parser",
                alias = %unflavored,
                kept = %existing.build_target(),
                ignored = %node.build_target(),
                "unflavored alias already maps to another flavor; keeping the first"
            ),
        }
    }

    /// Records `from -> to`. Both ends must already have been added.
    pub fn add_edge(&mut self, from: &BuildTarget, to: &BuildTarget) {
        self.graph
            .outgoing
            .entry(from.clone())
            .or_default()
            .insert(to.clone());
        self.graph
            .incoming
            .entry(to.clone())
            .or_default()
            .insert(from.clone());
    }

    pub fn build(self) -> TargetGraph {
        self.graph
    }
}
