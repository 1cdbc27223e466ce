//! Ripple Core
//!
//! A fine-grained reactive state engine. It implements:
//!
//! - Reactive primitives (signals, computed cells, effects)
//! - Automatic dependency tracking with dynamic pruning
//! - Glitch-free, lazy, equality-aware propagation
//! - Pluggable effect scheduling (inline, deferred, tokio)
//!
//! # Architecture
//!
//! The crate is organized into a few modules:
//!
//! - `reactive`: the user-facing handles and the runtime that drives them
//! - `graph`: the node arena, dependency edges and effect queues
//! - `error`: the error type raised out of evaluations
//!
//! Every handle belongs to a [`Runtime`]. The free functions below use the
//! calling thread's default runtime ([`Runtime::current`]).
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use ripple_core::{computed, effect, signal};
//!
//! let count = signal(1);
//! let doubled = {
//!     let count = count.clone();
//!     computed(move || count.get() * 2)
//! };
//!
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let _printer = {
//!     let (doubled, log) = (doubled.clone(), log.clone());
//!     effect(move |_| log.lock().unwrap().push(doubled.get()))
//! };
//!
//! count.set(4);
//! assert_eq!(*log.lock().unwrap(), vec![2, 8]);
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

pub use error::{ReactiveError, Result};
pub use graph::{NodeId, NodeKind};
pub use reactive::{
    CellOptions, Computed, DeferredDispatch, Dispatch, Effect, EffectHooks, EffectOptions,
    EffectRunner, EffectState, EffectTask, Equality, Job, Runtime, RuntimeConfig,
    SequentialRunner, Signal, SyncDispatch, TokioDispatch,
};

/// Create a signal on the current thread's default runtime.
pub fn signal<T>(value: T) -> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Runtime::current().signal(value)
}

/// Create a computed cell on the current thread's default runtime.
pub fn computed<T, F>(compute: F) -> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Runtime::current().computed(compute)
}

/// Create and run an effect on the current thread's default runtime.
pub fn effect<F>(callback: F) -> Effect
where
    F: Fn(&EffectHooks<'_>) + Send + Sync + 'static,
{
    Runtime::current().effect(callback)
}

/// See [`Runtime::track`].
pub fn track<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().track(f)
}

/// See [`Runtime::untrack`].
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().untrack(f)
}

/// See [`Runtime::batch`].
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::current().batch(f)
}
