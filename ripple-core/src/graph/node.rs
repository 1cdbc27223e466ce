//! Graph Nodes
//!
//! This module defines the node types that live in the runtime's arena.
//!
//! A node is one of three variants. Signals and computed cells both carry a
//! [`SourceData`] (value, version, equality, subscribers); computed cells and
//! effects both carry a dependency snapshot. Edges are arena indices, so
//! unsubscribing is a set removal rather than pointer surgery.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::reactive::{Dispatch, EffectHooks, EffectState};

/// A type-erased cell value. Snapshots are pointer clones of this.
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

/// Equality over two erased values of the same concrete type.
pub(crate) type ErasedEq = Arc<dyn Fn(&dyn Any, &dyn Any) -> bool + Send + Sync>;

pub(crate) type ComputeFn = Arc<dyn Fn() -> Value + Send + Sync>;
pub(crate) type EffectFn = Arc<dyn Fn(&EffectHooks<'_>) + Send + Sync>;
pub(crate) type CallFn = Arc<dyn Fn(&dyn Fn()) + Send + Sync>;
pub(crate) type LoopFn = Arc<dyn Fn() -> bool + Send + Sync>;
pub(crate) type DestroyFn = Box<dyn FnOnce() + Send>;

/// Index of a node in the runtime's arena.
///
/// Ids are only meaningful for the runtime that minted them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw arena index.
    pub fn raw(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A mutable source cell. These are the leaves of the graph.
    Signal,

    /// A lazily evaluated, memoized derived cell.
    Computed,

    /// A side-effecting subscriber. Effects have dependencies but no
    /// subscribers of their own.
    Effect,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Signal => "signal",
            NodeKind::Computed => "computed",
            NodeKind::Effect => "effect",
        })
    }
}

/// One recorded read: which cell, and what it looked like at the time.
#[derive(Clone)]
pub(crate) struct Dependency {
    pub(crate) node: NodeId,
    pub(crate) value: Value,
    pub(crate) version: u64,
}

/// Dependencies in first-read order, deduplicated by node.
pub(crate) type Dependencies = SmallVec<[Dependency; 4]>;

pub(crate) fn contains(deps: &Dependencies, node: NodeId) -> bool {
    deps.iter().any(|dep| dep.node == node)
}

/// View an erased cell value as the type its handle was created with.
pub(crate) fn downcast<T: 'static>(value: &Value) -> &T {
    match value.downcast_ref::<T>() {
        Some(value) => value,
        None => unreachable!("cell holds a value of another type"),
    }
}

/// State shared by everything that can be read: signals and computed cells.
pub(crate) struct SourceData {
    /// `None` until a computed cell has been evaluated once.
    pub(crate) value: Option<Value>,
    pub(crate) version: u64,
    pub(crate) equal: ErasedEq,
    pub(crate) subscribers: IndexSet<NodeId>,
}

impl SourceData {
    pub(crate) fn new(value: Option<Value>, equal: ErasedEq) -> Self {
        Self {
            value,
            version: 0,
            equal,
            subscribers: IndexSet::new(),
        }
    }

    /// Store a value that differs from the current one.
    pub(crate) fn replace(&mut self, value: Value) {
        self.value = Some(value);
        self.version = self.version.wrapping_add(1);
    }
}

pub(crate) struct ComputedData {
    pub(crate) source: SourceData,
    pub(crate) callback: ComputeFn,
    pub(crate) dependencies: Dependencies,
    pub(crate) clean: bool,
    /// Set when a direct signal edge dirtied this cell: the snapshot check
    /// can be skipped because the change is certain.
    pub(crate) must_recompute: bool,
    /// Cycle guard sentinel.
    pub(crate) computing: bool,
}

/// How an effect's run routine reaches a dispatch adapter.
#[derive(Clone)]
pub(crate) enum DispatchMode {
    /// Follow the runtime's `asynchronous` setting.
    Default,
    Sync,
    Async,
    Custom(Arc<dyn Dispatch>),
}

pub(crate) struct EffectData {
    pub(crate) callback: EffectFn,
    pub(crate) dependencies: Dependencies,
    pub(crate) state: EffectState,
    pub(crate) call: Option<CallFn>,
    pub(crate) dispatch: DispatchMode,
    pub(crate) on_destroy: Option<DestroyFn>,
    pub(crate) on_loop: Option<LoopFn>,
    /// Cells that changed while this effect was paused.
    pub(crate) indirect: IndexSet<NodeId>,
    /// A queued run was dropped because the effect got paused.
    pub(crate) missed: bool,
    /// The body is on the stack right now, whatever `state` says.
    pub(crate) running: bool,
    pub(crate) runs: u64,
}

pub(crate) enum Body {
    Signal(SourceData),
    Computed(ComputedData),
    Effect(EffectData),
}

/// A node in the dependency graph.
pub(crate) struct Node {
    pub(crate) label: Option<String>,
    pub(crate) body: Body,
}

impl Node {
    pub(crate) fn signal(label: Option<String>, value: Value, equal: ErasedEq) -> Self {
        Self {
            label,
            body: Body::Signal(SourceData::new(Some(value), equal)),
        }
    }

    pub(crate) fn computed(label: Option<String>, callback: ComputeFn, equal: ErasedEq) -> Self {
        Self {
            label,
            body: Body::Computed(ComputedData {
                source: SourceData::new(None, equal),
                callback,
                dependencies: Dependencies::new(),
                clean: false,
                must_recompute: false,
                computing: false,
            }),
        }
    }

    pub(crate) fn effect(label: Option<String>, data: EffectData) -> Self {
        Self {
            label,
            body: Body::Effect(data),
        }
    }

    pub(crate) fn kind(&self) -> NodeKind {
        match self.body {
            Body::Signal(_) => NodeKind::Signal,
            Body::Computed(_) => NodeKind::Computed,
            Body::Effect(_) => NodeKind::Effect,
        }
    }

    pub(crate) fn source(&self) -> Option<&SourceData> {
        match &self.body {
            Body::Signal(source) => Some(source),
            Body::Computed(computed) => Some(&computed.source),
            Body::Effect(_) => None,
        }
    }

    pub(crate) fn source_mut(&mut self) -> Option<&mut SourceData> {
        match &mut self.body {
            Body::Signal(source) => Some(source),
            Body::Computed(computed) => Some(&mut computed.source),
            Body::Effect(_) => None,
        }
    }

    pub(crate) fn dependencies(&self) -> Option<&Dependencies> {
        match &self.body {
            Body::Signal(_) => None,
            Body::Computed(computed) => Some(&computed.dependencies),
            Body::Effect(effect) => Some(&effect.dependencies),
        }
    }

    pub(crate) fn dependencies_mut(&mut self) -> Option<&mut Dependencies> {
        match &mut self.body {
            Body::Signal(_) => None,
            Body::Computed(computed) => Some(&mut computed.dependencies),
            Body::Effect(effect) => Some(&mut effect.dependencies),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn never_equal() -> ErasedEq {
        Arc::new(|_, _| false)
    }

    #[test]
    fn signal_node_starts_with_value() {
        let node = Node::signal(None, Arc::new(3_i32), never_equal());
        assert_eq!(node.kind(), NodeKind::Signal);

        let source = node.source().unwrap();
        assert_eq!(source.value.as_ref().unwrap().downcast_ref::<i32>(), Some(&3));
        assert_eq!(source.version, 0);
        assert!(node.dependencies().is_none());
    }

    #[test]
    fn computed_node_starts_unset_and_dirty() {
        let node = Node::computed(
            Some("total".into()),
            Arc::new(|| Arc::new(1_i32) as Value),
            never_equal(),
        );
        assert_eq!(node.kind(), NodeKind::Computed);

        match &node.body {
            Body::Computed(computed) => {
                assert!(computed.source.value.is_none());
                assert!(!computed.clean);
                assert!(!computed.computing);
            }
            _ => panic!("expected a computed node"),
        }
    }

    #[test]
    fn replace_bumps_version_and_wraps() {
        let mut source = SourceData::new(Some(Arc::new(0_u8)), never_equal());
        source.replace(Arc::new(1_u8));
        assert_eq!(source.version, 1);

        source.version = u64::MAX;
        source.replace(Arc::new(2_u8));
        assert_eq!(source.version, 0);
    }

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId::new(12).to_string(), "#12");
        assert_eq!(NodeKind::Computed.to_string(), "computed");
    }
}
