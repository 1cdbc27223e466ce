//! Dispatch Adapters
//!
//! The runtime never decides *when* an effect body actually executes. It
//! hands each confirmed effect to two pluggable pieces:
//!
//! 1. an [`EffectRunner`], which receives the whole snapshot of the must-run
//!    queue as one batch of [`EffectTask`]s, and
//! 2. a [`Dispatch`] adapter, which receives the single run routine of one
//!    effect (already wrapped by that effect's `call` option) and decides
//!    whether to execute it inline or submit it somewhere for later.
//!
//! [`SyncDispatch`] executes inline. [`DeferredDispatch`] pushes the job on
//! the runtime's microtask queue, drained by [`Runtime::run_microtasks`].
//! [`TokioDispatch`] spawns it onto a tokio runtime.

use std::fmt;

use tokio::runtime::Handle;

use super::runtime::{Runtime, Trigger};
use crate::graph::NodeId;

/// One unit of deferred work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Decides when an effect's run routine executes.
pub trait Dispatch: Send + Sync {
    /// Execute `job` now, or arrange for it to execute later.
    fn dispatch(&self, runtime: &Runtime, job: Job);
}

impl<F> Dispatch for F
where
    F: Fn(&Runtime, Job) + Send + Sync,
{
    fn dispatch(&self, runtime: &Runtime, job: Job) {
        self(runtime, job)
    }
}

/// Runs the job in the calling context.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncDispatch;

impl Dispatch for SyncDispatch {
    fn dispatch(&self, _runtime: &Runtime, job: Job) {
        job()
    }
}

/// Defers the job to the runtime's microtask queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredDispatch;

impl Dispatch for DeferredDispatch {
    fn dispatch(&self, runtime: &Runtime, job: Job) {
        runtime.defer(job)
    }
}

/// Spawns the job as a task on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioDispatch {
    handle: Handle,
}

impl TokioDispatch {
    /// Spawn onto the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Spawn onto the runtime the caller is running in, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Dispatch for TokioDispatch {
    fn dispatch(&self, _runtime: &Runtime, job: Job) {
        self.handle.spawn(async move { job() });
    }
}

/// A queued effect, handed to the [`EffectRunner`] as part of a batch.
pub struct EffectTask {
    runtime: Runtime,
    id: NodeId,
}

impl EffectTask {
    pub(crate) fn new(runtime: Runtime, id: NodeId) -> Self {
        Self { runtime, id }
    }

    /// The effect this task belongs to.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Push the effect through its `call` wrapper and dispatch adapter.
    ///
    /// A task whose effect was paused, destroyed or already re-run since it
    /// was queued does nothing.
    pub fn run(self) {
        self.runtime.dispatch_effect(self.id, Trigger::Scheduled);
    }
}

impl fmt::Debug for EffectTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectTask").field("id", &self.id).finish()
    }
}

/// Runs a flushed batch of effects.
pub trait EffectRunner: Send + Sync {
    /// Run (or submit) every task in `batch`. Tasks arrive in FIFO queue order.
    fn run_batch(&self, batch: Vec<EffectTask>);
}

impl<F> EffectRunner for F
where
    F: Fn(Vec<EffectTask>) + Send + Sync,
{
    fn run_batch(&self, batch: Vec<EffectTask>) {
        self(batch)
    }
}

/// The default runner: every task, in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialRunner;

impl EffectRunner for SequentialRunner {
    fn run_batch(&self, batch: Vec<EffectTask>) {
        for task in batch {
            task.run();
        }
    }
}
