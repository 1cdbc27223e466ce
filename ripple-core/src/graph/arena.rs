//! Node Arena
//!
//! All nodes of one runtime live in a single vector and refer to each other
//! by [`NodeId`]. Subscriber edges (cell → dependent) and dependency
//! snapshots (dependent → cell) are kept in sync by the methods here.
//!
//! Nodes are never removed: a destroyed effect stays in the arena as an
//! inert entry with no edges, so ids handed out to callers stay valid.

use super::node::{
    contains, Body, ComputedData, Dependencies, EffectData, Node, NodeId, NodeKind, SourceData,
};

/// The dependency graph of one runtime.
#[derive(Default)]
pub(crate) struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a node to the graph.
    pub(crate) fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.raw()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.raw()]
    }

    pub(crate) fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind()
    }

    pub(crate) fn source(&self, id: NodeId) -> &SourceData {
        match self.node(id).source() {
            Some(source) => source,
            None => unreachable!("node {id} is an effect and holds no value"),
        }
    }

    pub(crate) fn source_mut(&mut self, id: NodeId) -> &mut SourceData {
        match self.node_mut(id).source_mut() {
            Some(source) => source,
            None => unreachable!("node {id} is an effect and holds no value"),
        }
    }

    pub(crate) fn computed(&self, id: NodeId) -> &ComputedData {
        match &self.node(id).body {
            Body::Computed(computed) => computed,
            _ => unreachable!("node {id} is not a computed cell"),
        }
    }

    pub(crate) fn computed_mut(&mut self, id: NodeId) -> &mut ComputedData {
        match &mut self.node_mut(id).body {
            Body::Computed(computed) => computed,
            _ => unreachable!("node {id} is not a computed cell"),
        }
    }

    pub(crate) fn effect(&self, id: NodeId) -> &EffectData {
        match &self.node(id).body {
            Body::Effect(effect) => effect,
            _ => unreachable!("node {id} is not an effect"),
        }
    }

    pub(crate) fn effect_mut(&mut self, id: NodeId) -> &mut EffectData {
        match &mut self.node_mut(id).body {
            Body::Effect(effect) => effect,
            _ => unreachable!("node {id} is not an effect"),
        }
    }

    /// A computed cell that has a value but may be stale.
    pub(crate) fn is_dirty_computed(&self, id: NodeId) -> bool {
        match &self.node(id).body {
            Body::Computed(computed) => !computed.clean || computed.source.value.is_none(),
            _ => false,
        }
    }

    /// Human-readable name used in errors and logs.
    pub(crate) fn describe(&self, id: NodeId) -> String {
        let node = self.node(id);
        match &node.label {
            Some(label) => format!("{} `{}`", node.kind(), label),
            None => format!("{} {}", node.kind(), id),
        }
    }

    /// `listener` now reads `dependency`.
    pub(crate) fn subscribe(&mut self, dependency: NodeId, listener: NodeId) {
        self.source_mut(dependency).subscribers.insert(listener);
    }

    /// `listener` no longer reads `dependency`.
    pub(crate) fn unsubscribe(&mut self, dependency: NodeId, listener: NodeId) {
        self.source_mut(dependency).subscribers.shift_remove(&listener);
    }

    pub(crate) fn subscribers(&self, id: NodeId) -> Vec<NodeId> {
        self.source(id).subscribers.iter().copied().collect()
    }

    pub(crate) fn dependencies(&self, id: NodeId) -> Dependencies {
        self.node(id).dependencies().cloned().unwrap_or_default()
    }

    /// Install a freshly captured dependency list and drop the subscriber
    /// edges of cells that were not read this time.
    pub(crate) fn replace_dependencies(&mut self, id: NodeId, next: Dependencies) {
        let previous = match self.node_mut(id).dependencies_mut() {
            Some(slot) => std::mem::replace(slot, next),
            None => return,
        };

        let current = self.dependencies(id);
        for dep in previous {
            if !contains(&current, dep.node) {
                self.unsubscribe(dep.node, id);
            }
        }
    }

    /// Undo the subscriptions of an evaluation that did not complete: edges
    /// made for cells outside the still-installed dependency list go away.
    pub(crate) fn release_captured(&mut self, id: NodeId, captured: Dependencies) {
        let installed = self.dependencies(id);
        for dep in captured {
            if !contains(&installed, dep.node) {
                self.unsubscribe(dep.node, id);
            }
        }
    }

    /// Drop every dependency edge of `id`.
    pub(crate) fn release_all(&mut self, id: NodeId) {
        let previous = match self.node_mut(id).dependencies_mut() {
            Some(slot) => std::mem::take(slot),
            None => return,
        };
        for dep in previous {
            self.unsubscribe(dep.node, id);
        }
    }

    /// Record that `cell` changed while `effect` was paused.
    pub(crate) fn link_indirect(&mut self, cell: NodeId, effect: NodeId) {
        self.effect_mut(effect).indirect.insert(cell);
    }

    /// Forget all indirect links of `effect`. Returns whether there were any.
    pub(crate) fn clear_indirect(&mut self, effect: NodeId) -> bool {
        let cells = std::mem::take(&mut self.effect_mut(effect).indirect);
        !cells.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::node::{Dependency, ErasedEq, Value};
    use crate::reactive::{EffectHooks, EffectOptions};

    fn never_equal() -> ErasedEq {
        Arc::new(|_, _| false)
    }

    fn signal(graph: &mut Graph, value: i32) -> NodeId {
        graph.insert(Node::signal(None, Arc::new(value), never_equal()))
    }

    fn computed(graph: &mut Graph) -> NodeId {
        graph.insert(Node::computed(
            None,
            Arc::new(|| Arc::new(0_i32) as Value),
            never_equal(),
        ))
    }

    fn dep(graph: &Graph, node: NodeId) -> Dependency {
        let source = graph.source(node);
        Dependency {
            node,
            value: source.value.clone().unwrap(),
            version: source.version,
        }
    }

    #[test]
    fn insert_hands_out_sequential_ids() {
        let mut graph = Graph::new();
        let a = signal(&mut graph, 1);
        let b = computed(&mut graph);

        assert_eq!(a.raw(), 0);
        assert_eq!(b.raw(), 1);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.kind(b), NodeKind::Computed);
    }

    #[test]
    fn subscribe_and_unsubscribe() {
        let mut graph = Graph::new();
        let source = signal(&mut graph, 1);
        let derived = computed(&mut graph);

        graph.subscribe(source, derived);
        graph.subscribe(source, derived);
        assert_eq!(graph.subscribers(source), vec![derived]);

        graph.unsubscribe(source, derived);
        assert!(graph.subscribers(source).is_empty());
    }

    #[test]
    fn replace_dependencies_drops_stale_edges() {
        let mut graph = Graph::new();
        let a = signal(&mut graph, 1);
        let b = signal(&mut graph, 2);
        let derived = computed(&mut graph);

        graph.subscribe(a, derived);
        graph.subscribe(b, derived);
        let first: Dependencies = [dep(&graph, a), dep(&graph, b)].into_iter().collect();
        graph.replace_dependencies(derived, first);

        let second: Dependencies = [dep(&graph, b)].into_iter().collect();
        graph.replace_dependencies(derived, second);

        assert!(graph.subscribers(a).is_empty());
        assert_eq!(graph.subscribers(b), vec![derived]);
        assert_eq!(graph.dependencies(derived).len(), 1);
    }

    #[test]
    fn release_captured_keeps_installed_edges() {
        let mut graph = Graph::new();
        let a = signal(&mut graph, 1);
        let b = signal(&mut graph, 2);
        let derived = computed(&mut graph);

        graph.subscribe(a, derived);
        let installed: Dependencies = [dep(&graph, a)].into_iter().collect();
        graph.replace_dependencies(derived, installed);

        // A half-finished evaluation read both cells.
        graph.subscribe(b, derived);
        let captured: Dependencies = [dep(&graph, a), dep(&graph, b)].into_iter().collect();
        graph.release_captured(derived, captured);

        assert_eq!(graph.subscribers(a), vec![derived]);
        assert!(graph.subscribers(b).is_empty());
    }

    #[test]
    fn indirect_links_are_kept_per_effect() {
        let mut graph = Graph::new();
        let a = computed(&mut graph);
        let b = computed(&mut graph);
        let noop = |_: &EffectHooks<'_>| {};
        let effect = graph.insert(EffectOptions::new().into_node(Arc::new(noop)));

        graph.link_indirect(a, effect);
        graph.link_indirect(a, effect);
        graph.link_indirect(b, effect);
        assert_eq!(graph.effect(effect).indirect.len(), 2);

        assert!(graph.clear_indirect(effect));
        assert!(graph.effect(effect).indirect.is_empty());
        assert!(!graph.clear_indirect(effect));
    }

    #[test]
    fn describe_prefers_label() {
        let mut graph = Graph::new();
        let plain = signal(&mut graph, 1);
        let named = graph.insert(Node::signal(
            Some("count".into()),
            Arc::new(1_i32),
            never_equal(),
        ));

        assert_eq!(graph.describe(plain), "signal #0");
        assert_eq!(graph.describe(named), "signal `count`");
    }

    #[test]
    fn dirty_computed_detection() {
        let mut graph = Graph::new();
        let source = signal(&mut graph, 1);
        let derived = computed(&mut graph);

        assert!(!graph.is_dirty_computed(source));
        assert!(graph.is_dirty_computed(derived));

        let data = graph.computed_mut(derived);
        data.source.replace(Arc::new(4_i32));
        data.clean = true;
        assert!(!graph.is_dirty_computed(derived));
    }
}
