//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computed
//! cells and effects. It owns the dependency graph, the active-listener
//! stack and the effect queues, and it implements propagation and
//! scheduling.
//!
//! # How It Works
//!
//! 1. Reading a cell inside a running computed/effect records the cell in
//!    that listener's dependency snapshot and subscribes the listener.
//!
//! 2. Writing a signal stores the value (if it differs under the cell's
//!    equality), bumps the version and walks subscriber edges outward:
//!    a. computed cells are marked dirty, once;
//!    b. effects reached straight from the signal go to the must-run queue;
//!    c. effects reached through a computed go to the maybe-run queue.
//!
//! 3. The maybe-run queue is validated: each effect's snapshot is compared
//!    against the live cells, recomputing dirty computed cells on the way.
//!    Only effects whose inputs really changed are promoted.
//!
//! 4. The must-run queue is flushed in FIFO batches through the configured
//!    runner and dispatch adapters. Writes made by running effects land in
//!    the next batch, never in the one being drained.
//!
//! Computed cells are lazy: they are only brought up to date when read
//! (directly, or while validating something that depends on them).
//!
//! # Thread Safety
//!
//! All graph state sits behind one reentrant lock. The thread that holds it
//! may re-enter freely (a callback reading another cell), while other
//! threads wait until the whole operation, callbacks included, is done.
//! The lock is never held by the runtime while it waits for anything else.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use tracing::{debug, trace, warn};

use super::computed::Computed;
use super::config::RuntimeConfig;
use super::context::{Capture, TrackingScope, Tracker};
use super::dispatch::{Dispatch, EffectTask, Job};
use super::effect::{Effect, EffectHooks, EffectOptions, EffectState};
use super::signal::{CellOptions, Signal};
use crate::error::{catch, raise, ReactiveError, Result};
use crate::graph::{
    ComputeFn, Dependency, DispatchMode, EffectFn, EffectQueues, Graph, Node, NodeId, NodeKind,
    Value,
};

/// Everything guarded by the runtime lock.
pub(crate) struct State {
    pub(crate) graph: Graph,
    pub(crate) tracker: Tracker,
    pub(crate) queues: EffectQueues,
    /// Open batches plus the running flush. Flushing only happens at zero.
    depth: usize,
}

impl State {
    fn new() -> Self {
        Self {
            graph: Graph::new(),
            tracker: Tracker::new(),
            queues: EffectQueues::new(),
            depth: 0,
        }
    }

    fn value(&self, id: NodeId) -> Value {
        match &self.graph.source(id).value {
            Some(value) => Arc::clone(value),
            None => unreachable!("{} read before its first evaluation", self.graph.describe(id)),
        }
    }

    /// Register `id` as a dependency of whichever listener is running.
    fn capture(&mut self, id: NodeId) {
        let Some(listener) = self.tracker.current() else {
            return;
        };
        let source = self.graph.source(id);
        let Some(value) = source.value.clone() else {
            return;
        };
        let dependency = Dependency {
            node: id,
            value,
            version: source.version,
        };
        if self.tracker.record(dependency) {
            self.graph.subscribe(id, listener);
            trace!(node = %id, listener = %listener, "captured dependency");
        }
    }
}

struct Inner {
    state: ReentrantMutex<RefCell<State>>,
    config: RwLock<RuntimeConfig>,
    microtasks: Mutex<VecDeque<Job>>,
}

/// Why an effect's run routine is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// The first run, made on construction. A paused effect records it
    /// as missed instead.
    Initial,
    /// An explicit `run()`. Ignores pause.
    Direct,
    /// Taken off the must-run queue.
    Scheduled,
}

thread_local! {
    static CURRENT: Runtime = Runtime::new();
}

/// Handle to one independent reactive graph.
///
/// Cloning is cheap; all clones drive the same graph.
///
/// # Example
///
/// ```rust
/// use ripple_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(1);
/// let double = {
///     let count = count.clone();
///     rt.computed(move || count.get() * 2)
/// };
///
/// assert_eq!(double.get(), 2);
/// count.set(5);
/// assert_eq!(double.get(), 10);
/// ```
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<Inner>,
}

impl Runtime {
    /// Create an empty runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create an empty runtime.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: ReentrantMutex::new(RefCell::new(State::new())),
                config: RwLock::new(config),
                microtasks: Mutex::new(VecDeque::new()),
            }),
        }
    }

    /// The default runtime of the calling thread, used by the free
    /// functions and the `new` constructors of the handles.
    pub fn current() -> Self {
        CURRENT.with(Runtime::clone)
    }

    /// A copy of the current configuration.
    pub fn config(&self) -> RuntimeConfig {
        self.inner.config.read().clone()
    }

    /// Replace the configuration. Takes effect for the next dispatch.
    pub fn configure(&self, update: impl FnOnce(RuntimeConfig) -> RuntimeConfig) {
        let mut config = self.inner.config.write();
        *config = update(config.clone());
    }

    // ------------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------------

    /// Create a signal compared with `PartialEq`.
    pub fn signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        self.signal_with(value, CellOptions::default())
    }

    /// Create a signal with explicit options.
    ///
    /// # Panics
    ///
    /// Raises [`ReactiveError::Construction`] for invalid options; see
    /// [`try_signal_with`](Self::try_signal_with).
    pub fn signal_with<T>(&self, value: T, options: CellOptions<T>) -> Signal<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.try_signal_with(value, options) {
            Ok(signal) => signal,
            Err(err) => raise(err),
        }
    }

    pub fn try_signal_with<T>(&self, value: T, options: CellOptions<T>) -> Result<Signal<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        options.validate()?;
        let (equal, label) = options.into_parts();
        let id = self.with(|state| {
            state
                .graph
                .insert(Node::signal(label, Arc::new(value), equal.erase()))
        });
        trace!(node = %id, "signal created");
        Ok(Signal::from_parts(self.clone(), id))
    }

    /// Create a lazily evaluated computed cell compared with `PartialEq`.
    pub fn computed<T, F>(&self, compute: F) -> Computed<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.computed_with(compute, CellOptions::default())
    }

    /// Create a computed cell with explicit options.
    ///
    /// # Panics
    ///
    /// Raises [`ReactiveError::Construction`] for invalid options.
    pub fn computed_with<T, F>(&self, compute: F, options: CellOptions<T>) -> Computed<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        match self.try_computed_with(compute, options) {
            Ok(computed) => computed,
            Err(err) => raise(err),
        }
    }

    pub fn try_computed_with<T, F>(&self, compute: F, options: CellOptions<T>) -> Result<Computed<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        options.validate()?;
        let (equal, label) = options.into_parts();
        let callback: ComputeFn = Arc::new(move || Arc::new(compute()) as Value);
        let id = self.with(|state| {
            state
                .graph
                .insert(Node::computed(label, callback, equal.erase()))
        });
        trace!(node = %id, "computed created");
        Ok(Computed::from_parts(self.clone(), id))
    }

    /// Create an effect and run it once.
    pub fn effect<F>(&self, callback: F) -> Effect
    where
        F: Fn(&EffectHooks<'_>) + Send + Sync + 'static,
    {
        self.effect_with(callback, EffectOptions::default())
    }

    /// Create an effect with explicit options and run it once.
    ///
    /// # Panics
    ///
    /// Raises [`ReactiveError::Construction`] for invalid options, and
    /// whatever error the first run raises.
    pub fn effect_with<F>(&self, callback: F, options: EffectOptions) -> Effect
    where
        F: Fn(&EffectHooks<'_>) + Send + Sync + 'static,
    {
        let id = match self.create_effect(Arc::new(callback), options) {
            Ok(id) => id,
            Err(err) => raise(err),
        };
        Effect::from_parts(self.clone(), id)
    }

    pub fn try_effect_with<F>(&self, callback: F, options: EffectOptions) -> Result<Effect>
    where
        F: Fn(&EffectHooks<'_>) + Send + Sync + 'static,
    {
        let id = catch(|| self.create_effect(Arc::new(callback), options))??;
        Ok(Effect::from_parts(self.clone(), id))
    }

    fn create_effect(&self, callback: EffectFn, options: EffectOptions) -> Result<NodeId> {
        options.validate()?;
        let node = options.into_node(callback);
        let id = self.with(|state| state.graph.insert(node));
        debug!(node = %id, "effect created");
        self.batch(|| self.dispatch_effect(id, Trigger::Initial));
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------------

    /// Run `f` with dependency capture forced on for the running callback.
    pub fn track<R>(&self, f: impl FnOnce() -> R) -> R {
        let _serial = self.serial();
        let _scope = TrackingScope::enter(self, true);
        f()
    }

    /// Run `f` without recording any reads as dependencies.
    pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
        let _serial = self.serial();
        let _scope = TrackingScope::enter(self, false);
        f()
    }

    /// Run `f`, holding back effect flushing until the outermost batch ends.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _serial = self.serial();
        let result = {
            let _depth = Depth::enter(self);
            f()
        };
        self.flush();
        result
    }

    /// Drain the microtask queue used by [`DeferredDispatch`](super::DeferredDispatch),
    /// including jobs queued while draining. Returns how many jobs ran.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.inner.microtasks.lock().pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => break,
            }
        }
        if ran > 0 {
            trace!(jobs = ran, "drained microtasks");
        }
        ran
    }

    pub fn pending_microtasks(&self) -> usize {
        self.inner.microtasks.lock().len()
    }

    pub(crate) fn defer(&self, job: Job) {
        self.inner.microtasks.lock().push_back(job);
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    /// Number of nodes ever created in this runtime.
    pub fn node_count(&self) -> usize {
        self.with(|state| state.graph.len())
    }

    /// No effect is queued and no batch is open.
    pub fn is_idle(&self) -> bool {
        self.with(|state| state.depth == 0 && state.queues.is_idle())
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.with(|state| state.graph.kind(id))
    }

    pub(crate) fn describe(&self, id: NodeId) -> String {
        self.with(|state| state.graph.describe(id))
    }

    pub(crate) fn label(&self, id: NodeId) -> Option<String> {
        self.with(|state| state.graph.node(id).label.clone())
    }

    pub(crate) fn version(&self, id: NodeId) -> u64 {
        self.with(|state| state.graph.source(id).version)
    }

    pub(crate) fn subscriber_count(&self, id: NodeId) -> usize {
        self.with(|state| state.graph.source(id).subscribers.len())
    }

    pub(crate) fn dependency_count(&self, id: NodeId) -> usize {
        self.with(|state| state.graph.dependencies(id).len())
    }

    pub(crate) fn is_clean(&self, id: NodeId) -> bool {
        self.with(|state| !state.graph.is_dirty_computed(id))
    }

    pub(crate) fn effect_state(&self, id: NodeId) -> EffectState {
        self.with(|state| state.graph.effect(id).state)
    }

    pub(crate) fn run_count(&self, id: NodeId) -> u64 {
        self.with(|state| state.graph.effect(id).runs)
    }

    // ------------------------------------------------------------------------
    // Locking
    // ------------------------------------------------------------------------

    /// Hold the runtime for a whole operation.
    pub(crate) fn serial(&self) -> ReentrantMutexGuard<'_, RefCell<State>> {
        self.inner.state.lock()
    }

    /// Short, exclusive access to the state. `f` must not call back into
    /// user code or into another `with`.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    pub(crate) fn read_source(&self, id: NodeId, tracked: bool) -> Value {
        let _serial = self.serial();
        self.with(|state| {
            if tracked {
                state.capture(id);
            }
            state.value(id)
        })
    }

    /// Store `value` unless it equals the current one (or `force` is set),
    /// then propagate and flush. Returns the value now held by the cell.
    pub(crate) fn write_source(&self, id: NodeId, value: Value, force: bool) -> Value {
        let _serial = self.serial();
        let (current, equal) = self.with(|state| {
            let source = state.graph.source(id);
            (state.value(id), Arc::clone(&source.equal))
        });

        if !force && equal(&*current, &*value) {
            trace!(node = %id, "write skipped, value unchanged");
            return current;
        }

        let version = self.with(|state| {
            let source = state.graph.source_mut(id);
            source.replace(Arc::clone(&value));
            source.version
        });
        debug!(node = %id, version, forced = force, "signal changed");

        self.mark_dirty(id, true, id);
        self.flush();
        value
    }

    pub(crate) fn force_change(&self, id: NodeId) {
        let _serial = self.serial();
        let current = self.with(|state| state.value(id));
        self.write_source(id, current, true);
    }

    // ------------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------------

    /// Walk the subscribers of `node`. `from_state` is true only for the
    /// direct subscribers of the written signal; `origin` is that signal.
    fn mark_dirty(&self, node: NodeId, from_state: bool, origin: NodeId) {
        let subscribers = self.with(|state| state.graph.subscribers(node));

        for subscriber in subscribers {
            match self.with(|state| state.graph.kind(subscriber)) {
                NodeKind::Effect => self.mark_effect(subscriber, from_state, origin),
                NodeKind::Computed => {
                    let newly_dirty = self.with(|state| {
                        let computed = state.graph.computed_mut(subscriber);
                        if from_state {
                            computed.must_recompute = true;
                        }
                        if !computed.clean {
                            return false;
                        }
                        computed.clean = false;
                        true
                    });

                    // Already-dirty cells were covered by an earlier pass.
                    if newly_dirty {
                        trace!(node = %subscriber, "marked dirty");
                        self.mark_dirty(subscriber, false, origin);
                    }
                }
                NodeKind::Signal => {}
            }
        }
    }

    fn mark_effect(&self, id: NodeId, from_state: bool, origin: NodeId) {
        let state = self.effect_state(id);

        if state == EffectState::Computing {
            let on_loop = self.with(|s| s.graph.effect(id).on_loop.clone());
            let Some(on_loop) = on_loop else {
                raise(ReactiveError::Loop {
                    name: self.describe(id),
                });
            };
            if !on_loop() {
                trace!(node = %id, "self-retrigger suppressed by on_loop");
                return;
            }
            warn!(node = %id, "effect re-triggered itself, allowed by on_loop");
            self.with(|s| {
                s.graph.effect_mut(id).state = EffectState::Queued;
                s.queues.push_must(id);
            });
            return;
        }

        match state {
            EffectState::Queued | EffectState::Destroyed => return,
            EffectState::Paused => {
                self.with(|s| s.graph.link_indirect(origin, id));
                trace!(node = %id, cell = %origin, "paused effect missed a change");
                return;
            }
            _ => {}
        }

        if from_state {
            self.with(|s| {
                s.graph.effect_mut(id).state = EffectState::Queued;
                s.queues.push_must(id);
            });
            trace!(node = %id, "queued effect (must run)");
        } else if state != EffectState::MayRecall {
            self.with(|s| {
                s.graph.effect_mut(id).state = EffectState::MayRecall;
                s.queues.push_maybe(id);
            });
            trace!(node = %id, "queued effect (may run)");
        }
    }

    /// Promote maybe-run effects whose inputs really changed; settle the rest.
    fn resolve_maybe(&self) {
        while let Some(id) = self.with(|state| state.queues.pop_maybe()) {
            if self.effect_state(id) != EffectState::MayRecall {
                continue;
            }

            let revalidate = Revalidate::arm(self, id);
            let changed = !self.dependencies_clean(id);
            revalidate.disarm();
            self.with(|state| {
                let effect = state.graph.effect_mut(id);
                if effect.state != EffectState::MayRecall {
                    return;
                }
                if changed {
                    effect.state = EffectState::Queued;
                    state.queues.push_must(id);
                } else {
                    effect.state = EffectState::Computed;
                }
            });
            trace!(node = %id, changed, "validated maybe-run effect");
        }
    }

    /// Whether every recorded dependency of `id` still has the value and
    /// version it had when it was read. Dirty computed dependencies are
    /// brought up to date first.
    fn dependencies_clean(&self, id: NodeId) -> bool {
        let dependencies = self.with(|state| state.graph.dependencies(id));

        for dependency in &dependencies {
            if !self.snapshot_matches(dependency) {
                return false;
            }
            if self.with(|state| state.graph.is_dirty_computed(dependency.node)) {
                self.evaluate(dependency.node, false);
                if !self.snapshot_matches(dependency) {
                    return false;
                }
            }
        }

        true
    }

    fn snapshot_matches(&self, dependency: &Dependency) -> bool {
        let (value, version, equal) = self.with(|state| {
            let source = state.graph.source(dependency.node);
            (source.value.clone(), source.version, Arc::clone(&source.equal))
        });
        version == dependency.version
            && value.is_some_and(|value| equal(&*value, &*dependency.value))
    }

    // ------------------------------------------------------------------------
    // Computed cells
    // ------------------------------------------------------------------------

    /// Bring a computed cell up to date, register the read, return the value.
    /// `fresh` recomputes even when the cached value is known current.
    pub(crate) fn read_computed(&self, id: NodeId, fresh: bool) -> Value {
        let _serial = self.serial();
        self.evaluate(id, fresh);
        self.with(|state| {
            state.capture(id);
            state.value(id)
        })
    }

    fn evaluate(&self, id: NodeId, force: bool) {
        let _computing = Computing::enter(self, id);

        let (unset, clean, must_recompute) = self.with(|state| {
            let computed = state.graph.computed(id);
            (
                computed.source.value.is_none(),
                computed.clean,
                computed.must_recompute,
            )
        });

        if !force && !unset {
            if clean {
                return;
            }
            if !must_recompute && self.dependencies_clean(id) {
                self.with(|state| state.graph.computed_mut(id).clean = true);
                trace!(node = %id, "dependencies unchanged, kept cached value");
                return;
            }
        }

        self.recompute(id);
    }

    fn recompute(&self, id: NodeId) {
        let callback = self.with(|state| Arc::clone(&state.graph.computed(id).callback));

        let capture = Capture::begin(self, id);
        let next = callback();
        let dependencies = capture.finish();

        let (current, equal) = self.with(|state| {
            state.graph.replace_dependencies(id, dependencies);
            let source = &state.graph.computed(id).source;
            (source.value.clone(), Arc::clone(&source.equal))
        });
        let changed = match &current {
            Some(current) => !equal(&**current, &*next),
            None => true,
        };

        let version = self.with(|state| {
            let computed = state.graph.computed_mut(id);
            if changed {
                computed.source.replace(next);
            }
            computed.clean = true;
            computed.must_recompute = false;
            computed.source.version
        });
        debug!(node = %id, changed, version, "recomputed");
    }

    // ------------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------------

    /// Pass an effect's run routine through its `call` wrapper and the
    /// dispatch adapter it is configured for.
    pub(crate) fn dispatch_effect(&self, id: NodeId, trigger: Trigger) {
        let (state, mode, call) = self.with(|state| {
            let effect = state.graph.effect(id);
            (effect.state, effect.dispatch.clone(), effect.call.clone())
        });
        if state == EffectState::Destroyed {
            return;
        }

        let dispatcher: Arc<dyn Dispatch> = {
            let config = self.inner.config.read();
            match mode {
                DispatchMode::Default if config.asynchronous => Arc::clone(&config.async_dispatch),
                DispatchMode::Default | DispatchMode::Sync => Arc::clone(&config.sync_dispatch),
                DispatchMode::Async => Arc::clone(&config.async_dispatch),
                DispatchMode::Custom(dispatch) => dispatch,
            }
        };

        let runtime = self.clone();
        let job: Job = Box::new(move || {
            let run = || runtime.execute_effect(id, trigger);
            match &call {
                Some(call) => call(&run),
                None => run(),
            }
        });
        dispatcher.dispatch(self, job);
    }

    fn execute_effect(&self, id: NodeId, trigger: Trigger) {
        let _serial = self.serial();
        let (state, running) = self.with(|state| {
            let effect = state.graph.effect(id);
            (effect.state, effect.running)
        });

        if state == EffectState::Destroyed {
            return;
        }
        if running {
            raise(ReactiveError::Cycle {
                name: self.describe(id),
            });
        }
        match (trigger, state) {
            (Trigger::Direct, _) | (_, EffectState::Queued) => {}
            (_, EffectState::Paused) => {
                self.with(|state| state.graph.effect_mut(id).missed = true);
                trace!(node = %id, ?trigger, "paused effect missed a run");
                return;
            }
            (Trigger::Initial, _) => {}
            (Trigger::Scheduled, _) => {
                trace!(node = %id, ?state, "skipped stale effect task");
                return;
            }
        }

        self.batch(|| self.run_effect_body(id, state));
    }

    fn run_effect_body(&self, id: NodeId, previous: EffectState) {
        let (callback, first) = self.with(|state| {
            let effect = state.graph.effect_mut(id);
            effect.state = EffectState::Computing;
            effect.running = true;
            (Arc::clone(&effect.callback), effect.runs == 0)
        });
        let _run = EffectRun {
            runtime: self,
            id,
            resting: match previous {
                EffectState::Paused => EffectState::Paused,
                _ => EffectState::Computed,
            },
        };
        debug!(node = %id, first, "running effect");

        let capture = Capture::begin(self, id);
        callback(&EffectHooks::new(self, id, first));
        let dependencies = capture.finish();

        self.with(|state| {
            if state.graph.effect(id).state == EffectState::Destroyed {
                // Destroyed by its own callback: keep it edgeless.
                for dependency in dependencies {
                    state.graph.unsubscribe(dependency.node, id);
                }
            } else {
                state.graph.replace_dependencies(id, dependencies);
                state.graph.clear_indirect(id);
            }
            state.graph.effect_mut(id).runs += 1;
        });
    }

    pub(crate) fn pause_effect(&self, id: NodeId) {
        let paused = self.with(|state| {
            let effect = state.graph.effect_mut(id);
            match effect.state {
                EffectState::Destroyed | EffectState::Paused => return false,
                EffectState::Queued | EffectState::MayRecall => effect.missed = true,
                _ => {}
            }
            effect.state = EffectState::Paused;
            true
        });
        if paused {
            debug!(node = %id, "effect paused");
        }
    }

    /// Un-pause. Everything missed while paused is rechecked once against
    /// the effect's snapshot, and the effect runs at most once for it.
    pub(crate) fn resume_effect(&self, id: NodeId) {
        let _serial = self.serial();
        let pending = self.with(|state| {
            let effect = state.graph.effect_mut(id);
            if effect.state != EffectState::Paused {
                return None;
            }
            effect.state = if effect.running {
                EffectState::Computing
            } else {
                EffectState::Computed
            };
            let never_ran = effect.runs == 0;
            let missed = std::mem::take(&mut effect.missed);
            let linked = state.graph.clear_indirect(id);
            Some((missed || linked, never_ran))
        });

        let never_ran = match pending {
            None => return,
            Some((false, _)) => {
                debug!(node = %id, "effect resumed");
                return;
            }
            Some((true, never_ran)) => {
                debug!(node = %id, never_ran, "effect resumed with missed changes");
                never_ran
            }
        };

        // Without a first run there is no snapshot to check against.
        if !never_ran && self.dependencies_clean(id) {
            return;
        }
        self.with(|state| {
            let effect = state.graph.effect_mut(id);
            if effect.state == EffectState::Computed {
                effect.state = EffectState::Queued;
                state.queues.push_must(id);
            }
        });
        self.flush();
    }

    pub(crate) fn destroy_effect(&self, id: NodeId) {
        let hook = self.with(|state| {
            if state.graph.effect(id).state == EffectState::Destroyed {
                return None;
            }
            state.graph.release_all(id);
            state.graph.clear_indirect(id);

            let effect = state.graph.effect_mut(id);
            effect.state = EffectState::Destroyed;
            effect.call = None;
            effect.on_loop = None;
            effect.callback = Arc::new(inert);
            Some(effect.on_destroy.take())
        });

        let Some(hook) = hook else {
            return;
        };
        debug!(node = %id, "effect destroyed");
        if let Some(hook) = hook {
            hook();
        }
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Resolve the maybe-run queue and drain the must-run queue in batches.
    /// Does nothing while a batch or another flush is open; the outermost
    /// one picks the work up.
    fn flush(&self) {
        let _serial = self.serial();
        if self.with(|state| state.depth > 0) {
            return;
        }
        let _depth = Depth::enter(self);

        loop {
            self.resolve_maybe();
            let batch = self.with(|state| state.queues.take_must());
            if batch.is_empty() {
                break;
            }
            debug!(effects = batch.len(), "flushing effect batch");

            let runner = Arc::clone(&self.inner.config.read().runner);
            let requeue = Requeue::arm(self, batch.clone());
            runner.run_batch(
                batch
                    .into_iter()
                    .map(|id| EffectTask::new(self.clone(), id))
                    .collect(),
            );
            requeue.disarm();
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("node_count", &self.node_count())
            .field("pending_microtasks", &self.pending_microtasks())
            .finish()
    }
}

fn inert(_: &EffectHooks<'_>) {}

// ----------------------------------------------------------------------------
// Guards
// ----------------------------------------------------------------------------

/// Cycle guard for one computed evaluation.
struct Computing<'a> {
    runtime: &'a Runtime,
    id: NodeId,
}

impl<'a> Computing<'a> {
    fn enter(runtime: &'a Runtime, id: NodeId) -> Self {
        let entered = runtime.with(|state| {
            let computed = state.graph.computed_mut(id);
            !std::mem::replace(&mut computed.computing, true)
        });
        if !entered {
            raise(ReactiveError::Cycle {
                name: runtime.describe(id),
            });
        }
        Self { runtime, id }
    }
}

impl Drop for Computing<'_> {
    fn drop(&mut self) {
        let id = self.id;
        let unwinding = std::thread::panicking();
        self.runtime.with(|state| {
            let computed = state.graph.computed_mut(id);
            computed.computing = false;
            if unwinding {
                computed.clean = false;
                computed.must_recompute = true;
            }
        });
    }
}

/// Settles an effect's state once its body returns or unwinds.
struct EffectRun<'a> {
    runtime: &'a Runtime,
    id: NodeId,
    resting: EffectState,
}

impl Drop for EffectRun<'_> {
    fn drop(&mut self) {
        let (id, resting) = (self.id, self.resting);
        self.runtime.with(|state| {
            let effect = state.graph.effect_mut(id);
            effect.running = false;
            // Paused, destroyed or re-queued during the run: keep that.
            if effect.state == EffectState::Computing {
                effect.state = resting;
            }
        });
    }
}

/// Batch/flush nesting counter.
struct Depth<'a>(&'a Runtime);

impl<'a> Depth<'a> {
    fn enter(runtime: &'a Runtime) -> Self {
        runtime.with(|state| state.depth += 1);
        Self(runtime)
    }
}

impl Drop for Depth<'_> {
    fn drop(&mut self) {
        self.0.with(|state| state.depth -= 1);
    }
}

/// Puts effects that never got to run back on the must-run queue when a
/// batch unwinds.
struct Requeue<'a> {
    runtime: &'a Runtime,
    batch: Vec<NodeId>,
    armed: bool,
}

impl<'a> Requeue<'a> {
    fn arm(runtime: &'a Runtime, batch: Vec<NodeId>) -> Self {
        Self {
            runtime,
            batch,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Requeue<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let batch = std::mem::take(&mut self.batch);
        self.runtime.with(|state| {
            for id in batch {
                if state.graph.effect(id).state == EffectState::Queued {
                    state.queues.push_must(id);
                }
            }
        });
    }
}

/// Puts a maybe-run effect back on its queue when validating it unwinds.
struct Revalidate<'a> {
    runtime: &'a Runtime,
    id: NodeId,
    armed: bool,
}

impl<'a> Revalidate<'a> {
    fn arm(runtime: &'a Runtime, id: NodeId) -> Self {
        Self {
            runtime,
            id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Revalidate<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let id = self.id;
        self.runtime.with(|state| {
            if state.graph.effect(id).state == EffectState::MayRecall {
                state.queues.push_maybe(id);
            }
        });
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn runtime_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Runtime>();
    }

    #[test]
    fn current_runtime_is_shared_per_thread() {
        let a = Runtime::current();
        let before = a.node_count();
        let _signal = Runtime::current().signal(1);
        assert_eq!(a.node_count(), before + 1);
    }

    #[test]
    fn runtimes_are_isolated() {
        let a = Runtime::new();
        let b = Runtime::new();
        let _x = a.signal(1);

        assert_eq!(a.node_count(), 1);
        assert_eq!(b.node_count(), 0);
    }

    #[test]
    fn write_marks_and_validates() {
        let rt = Runtime::new();
        let source = rt.signal(1);
        let parity = {
            let source = source.clone();
            rt.computed(move || source.get() % 2)
        };
        let runs = Arc::new(AtomicI32::new(0));
        let _effect = {
            let parity = parity.clone();
            let runs = runs.clone();
            rt.effect(move |_| {
                parity.get();
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };

        // 1 -> 3 keeps parity at 1: the effect was only "maybe" dirty.
        source.set(3);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(rt.is_idle());

        source.set(4);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn batch_defers_flush_until_outermost_end() {
        let rt = Runtime::new();
        let a = rt.signal(0);
        let runs = Arc::new(AtomicI32::new(0));
        let _effect = {
            let a = a.clone();
            let runs = runs.clone();
            rt.effect(move |_| {
                a.get();
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };

        rt.batch(|| {
            a.set(1);
            rt.batch(|| a.set(2));
            a.set(3);
            assert_eq!(runs.load(Ordering::SeqCst), 1);
        });

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn configure_replaces_settings() {
        let rt = Runtime::new();
        assert!(!rt.config().is_asynchronous());

        rt.configure(|config| config.asynchronous(true));
        assert!(rt.config().is_asynchronous());
    }
}
