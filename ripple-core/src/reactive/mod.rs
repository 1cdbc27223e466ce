//! Reactive Primitives
//!
//! This module implements the user-facing side of the reactive system:
//! signals, computed cells and effects, and the runtime that connects them.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal is read while a
//! computed cell or effect is running, that computation is registered as a
//! dependent. When the signal's value changes, dependents are notified.
//!
//! ## Computed cells
//!
//! A Computed is a derived value that caches its result. It is lazy and
//! re-evaluates only when one of its inputs changed, and a re-evaluation
//! that produces an equal value is invisible downstream.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its inputs
//! change. Effects are how reactive state reaches the outside world, such as
//! logging, I/O or rendering.
//!
//! # Implementation Notes
//!
//! Dependency tracking is automatic: each runtime keeps a stack of running
//! computations, and every read is recorded against the top of that stack.
//! Propagation is push-then-pull. Writes push "dirty" marks outward, and
//! values are pulled (and snapshots re-checked) only when read, which keeps
//! diamonds glitch-free and skips work whose inputs turned out equal.

mod computed;
mod config;
mod context;
mod dispatch;
mod effect;
mod equality;
mod runtime;
mod signal;

pub use computed::Computed;
pub use config::RuntimeConfig;
pub use dispatch::{
    DeferredDispatch, Dispatch, EffectRunner, EffectTask, Job, SequentialRunner, SyncDispatch,
    TokioDispatch,
};
pub use effect::{Effect, EffectHooks, EffectOptions, EffectState};
pub use equality::Equality;
pub use runtime::Runtime;
pub use signal::{CellOptions, Signal};
