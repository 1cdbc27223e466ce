//! Effect Implementation
//!
//! An Effect is a side-effecting computation that re-runs whenever
//! something it read actually changed.
//!
//! # How Effects Work
//!
//! 1. When created, the effect is dispatched once to establish its initial
//!    dependencies.
//!
//! 2. A change of a signal it read directly queues it to run. A change that
//!    only reaches it through a computed cell queues it as "maybe": before
//!    it runs, its snapshot is re-checked and the run is skipped if every
//!    input still compares equal.
//!
//! 3. Each run replaces the dependency snapshot with what that run read.
//!
//! # Lifecycle
//!
//! ```text
//! Unset -> Computing -> Computed <-> Queued / MayRecall
//!                           |  ^
//!                    pause  v  | resume
//!                         Paused
//! any state ------ destroy ------> Destroyed
//! ```
//!
//! A paused effect keeps its dependencies but does not run. Everything it
//! missed is re-checked once on resume, so it runs at most once for any
//! number of changes. Destroying releases every edge and fires the
//! `on_destroy` hook exactly once.

use std::fmt;
use std::sync::Arc;

use super::dispatch::Dispatch;
use super::runtime::{Runtime, Trigger};
use crate::error::{catch, check_label, ReactiveError, Result};
use crate::graph::{
    CallFn, Dependencies, DestroyFn, DispatchMode, EffectData, EffectFn, LoopFn, Node, NodeId,
};

/// Lifecycle state of an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectState {
    /// Created, first run not dispatched yet.
    Unset,
    /// The body is running.
    Computing,
    /// Ran, and nothing it read has changed since.
    Computed,
    /// Waiting in the must-run queue.
    Queued,
    /// Waiting in the maybe-run queue for its snapshot to be re-checked.
    MayRecall,
    Paused,
    Destroyed,
}

/// Options for [`Runtime::effect_with`].
///
/// # Example
///
/// ```rust
/// use ripple_core::{EffectOptions, Runtime};
///
/// let rt = Runtime::new();
/// let effect = rt.effect_with(
///     |_| {},
///     EffectOptions::new()
///         .label("noop")
///         .call(|run: &dyn Fn()| run()),
/// );
/// assert_eq!(effect.run_count(), 1);
/// ```
#[derive(Default)]
pub struct EffectOptions {
    call: Option<CallFn>,
    asynchronous: Option<bool>,
    dispatch: Option<Arc<dyn Dispatch>>,
    on_destroy: Option<DestroyFn>,
    on_loop: Option<LoopFn>,
    label: Option<String>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap every run: `call` receives the run routine and must invoke it
    /// (or decide not to).
    pub fn call(mut self, call: impl Fn(&dyn Fn()) + Send + Sync + 'static) -> Self {
        self.call = Some(Arc::new(call));
        self
    }

    /// Use the runtime's async (`true`) or sync (`false`) adapter regardless
    /// of its `asynchronous` setting.
    pub fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = Some(asynchronous);
        self
    }

    /// Use a dedicated dispatch adapter for this effect.
    pub fn dispatch(mut self, dispatch: impl Dispatch + 'static) -> Self {
        self.dispatch = Some(Arc::new(dispatch));
        self
    }

    /// Called once, when the effect is destroyed.
    pub fn on_destroy(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_destroy = Some(Box::new(hook));
        self
    }

    /// Consulted when the effect re-triggers itself while running. `true`
    /// queues another run, `false` drops the re-trigger. Without it, the
    /// re-trigger is a [`ReactiveError::Loop`].
    pub fn on_loop(mut self, allow: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.on_loop = Some(Arc::new(allow));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.asynchronous == Some(true) && self.dispatch.is_some() {
            return Err(ReactiveError::Construction {
                reason: "`asynchronous(true)` and a custom `dispatch` are mutually exclusive"
                    .to_string(),
            });
        }
        check_label(self.label.as_deref())
    }

    pub(crate) fn into_node(self, callback: EffectFn) -> Node {
        let dispatch = match (self.dispatch, self.asynchronous) {
            (Some(dispatch), _) => DispatchMode::Custom(dispatch),
            (None, Some(true)) => DispatchMode::Async,
            (None, Some(false)) => DispatchMode::Sync,
            (None, None) => DispatchMode::Default,
        };
        Node::effect(
            self.label,
            EffectData {
                callback,
                dependencies: Dependencies::new(),
                state: EffectState::Unset,
                call: self.call,
                dispatch,
                on_destroy: self.on_destroy,
                on_loop: self.on_loop,
                indirect: Default::default(),
                missed: false,
                running: false,
                runs: 0,
            },
        )
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("label", &self.label)
            .field("asynchronous", &self.asynchronous)
            .field("call", &self.call.is_some())
            .field("dispatch", &self.dispatch.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .field("on_loop", &self.on_loop.is_some())
            .finish()
    }
}

/// Passed to the effect body on every run.
pub struct EffectHooks<'a> {
    runtime: &'a Runtime,
    id: NodeId,
    first: bool,
}

impl<'a> EffectHooks<'a> {
    pub(crate) fn new(runtime: &'a Runtime, id: NodeId, first: bool) -> Self {
        Self { runtime, id, first }
    }

    /// Whether this is the effect's first run.
    pub fn is_first(&self) -> bool {
        self.first
    }

    /// A handle to the running effect, e.g. to pause or destroy itself.
    pub fn effect(&self) -> Effect {
        Effect::from_parts(self.runtime.clone(), self.id)
    }

    /// Register the destroy hook. Only the first registration is kept.
    pub fn on_destroy(&self, hook: impl FnOnce() + Send + 'static) {
        self.runtime.with(|state| {
            let effect = state.graph.effect_mut(self.id);
            if effect.on_destroy.is_none() && effect.state != EffectState::Destroyed {
                effect.on_destroy = Some(Box::new(hook));
            }
        });
    }

    /// Register the loop predicate. Only the first registration is kept.
    pub fn on_loop(&self, allow: impl Fn() -> bool + Send + Sync + 'static) {
        self.runtime.with(|state| {
            let effect = state.graph.effect_mut(self.id);
            if effect.on_loop.is_none() && effect.state != EffectState::Destroyed {
                effect.on_loop = Some(Arc::new(allow));
            }
        });
    }

    /// Run `f` on the first run only.
    pub fn on_init(&self, f: impl FnOnce()) {
        if self.first {
            f();
        }
    }

    /// Run `f` on every run except the first.
    pub fn on_not_init(&self, f: impl FnOnce()) {
        if !self.first {
            f();
        }
    }

    /// Alias of [`on_init`](Self::on_init).
    pub fn on_first(&self, f: impl FnOnce()) {
        self.on_init(f)
    }

    /// Alias of [`on_not_init`](Self::on_not_init).
    pub fn on_not_first(&self, f: impl FnOnce()) {
        self.on_not_init(f)
    }
}

/// Handle to an effect.
///
/// Dropping the handle does not stop the effect; call
/// [`destroy`](Self::destroy) for that.
///
/// # Example
///
/// ```rust
/// use std::sync::atomic::{AtomicI32, Ordering};
/// use std::sync::Arc;
/// use ripple_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
/// let seen = Arc::new(AtomicI32::new(0));
///
/// let effect = {
///     let (count, seen) = (count.clone(), seen.clone());
///     rt.effect(move |_| seen.store(count.get(), Ordering::SeqCst))
/// };
///
/// count.set(5);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
///
/// effect.destroy();
/// count.set(6);
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// ```
#[derive(Clone)]
pub struct Effect {
    runtime: Runtime,
    id: NodeId,
}

impl Effect {
    /// Create an effect on the current thread's default runtime.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&EffectHooks<'_>) + Send + Sync + 'static,
    {
        Runtime::current().effect(callback)
    }

    pub(crate) fn from_parts(runtime: Runtime, id: NodeId) -> Self {
        Self { runtime, id }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Dispatch the body now, even if nothing changed and even if paused.
    pub fn run(&self) {
        self.runtime
            .batch(|| self.runtime.dispatch_effect(self.id, Trigger::Direct));
    }

    pub fn try_run(&self) -> Result<()> {
        catch(|| self.run())
    }

    /// Stop reacting until [`resume`](Self::resume). Dependencies are kept.
    pub fn pause(&self) {
        self.runtime.pause_effect(self.id);
    }

    /// Re-check whatever changed while paused; runs at most once.
    pub fn resume(&self) {
        self.runtime.resume_effect(self.id);
    }

    pub fn try_resume(&self) -> Result<()> {
        catch(|| self.resume())
    }

    /// Release every edge and fire `on_destroy`. Idempotent.
    pub fn destroy(&self) {
        self.runtime.destroy_effect(self.id);
    }

    pub fn state(&self) -> EffectState {
        self.runtime.effect_state(self.id)
    }

    pub fn is_paused(&self) -> bool {
        self.state() == EffectState::Paused
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == EffectState::Destroyed
    }

    /// Number of completed runs.
    pub fn run_count(&self) -> u64 {
        self.runtime.run_count(self.id)
    }

    pub fn dependency_count(&self) -> usize {
        self.runtime.dependency_count(self.id)
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("runs", &self.run_count())
            .finish()
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.runtime.label(self.id) {
            Some(label) => write!(f, "[effect {label}]"),
            None => write!(f, "[effect {}]", self.id),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
