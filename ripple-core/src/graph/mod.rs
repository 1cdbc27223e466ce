//! Dependency Graph
//!
//! This module implements the storage side of the reactive system: the node
//! arena, the edges between nodes, and the two effect queues.
//!
//! # Overview
//!
//! - Nodes represent signals, computed cells and effects.
//! - A subscriber edge goes from a cell to everything that read it during
//!   its last evaluation. A dependency snapshot goes the other way and also
//!   remembers the value and version seen at read time.
//!
//! When a signal changes, the runtime walks subscriber edges outward,
//! marking computed cells dirty and queueing effects. Whether a dirty node
//! really has to recompute is decided later, lazily, by comparing its
//! snapshot against the live cells.
//!
//! # Design Decisions
//!
//! 1. Nodes live in an arena indexed by [`NodeId`]. The graph has back
//!    references everywhere (cell ↔ dependent), and indices keep that free of
//!    ownership cycles.
//!
//! 2. Subscriber sets are insertion-ordered so propagation visits dependents
//!    in the order they first subscribed.
//!
//! 3. The graph holds no locks of its own. The runtime owns it behind a
//!    single mutual-exclusion domain.

mod arena;
mod node;
mod scheduler;

pub(crate) use arena::Graph;
pub(crate) use node::{
    contains, downcast, CallFn, ComputeFn, Dependencies, Dependency, DestroyFn, DispatchMode,
    EffectData, EffectFn, ErasedEq, LoopFn, Node, Value,
};
pub use node::{NodeId, NodeKind};
pub(crate) use scheduler::EffectQueues;
