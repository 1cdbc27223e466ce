//! Runtime Configuration
//!
//! Settings that apply to every effect of one runtime unless the effect's
//! own options override them. They can be replaced at any time through
//! [`Runtime::configure`](super::Runtime::configure); effects pick up the
//! new adapters the next time they are dispatched.

use std::fmt;
use std::sync::Arc;

use super::dispatch::{DeferredDispatch, Dispatch, EffectRunner, SequentialRunner, SyncDispatch};

/// Configuration of a [`Runtime`](super::Runtime).
///
/// # Example
///
/// ```rust
/// use ripple_core::{Runtime, RuntimeConfig};
///
/// let rt = Runtime::with_config(RuntimeConfig::default().asynchronous(true));
/// let count = rt.signal(0);
/// let seen = count.clone();
/// let _log = rt.effect(move |_| {
///     let _ = seen.get();
/// });
///
/// // The first run was deferred to the microtask queue.
/// assert_eq!(rt.run_microtasks(), 1);
/// ```
#[derive(Clone)]
pub struct RuntimeConfig {
    pub(crate) asynchronous: bool,
    pub(crate) sync_dispatch: Arc<dyn Dispatch>,
    pub(crate) async_dispatch: Arc<dyn Dispatch>,
    pub(crate) runner: Arc<dyn EffectRunner>,
}

impl RuntimeConfig {
    /// Route effects through the async adapter unless they opt out.
    pub fn asynchronous(mut self, asynchronous: bool) -> Self {
        self.asynchronous = asynchronous;
        self
    }

    /// Adapter used for synchronous effects.
    pub fn sync_dispatch(mut self, dispatch: impl Dispatch + 'static) -> Self {
        self.sync_dispatch = Arc::new(dispatch);
        self
    }

    /// Adapter used for asynchronous effects.
    pub fn async_dispatch(mut self, dispatch: impl Dispatch + 'static) -> Self {
        self.async_dispatch = Arc::new(dispatch);
        self
    }

    /// Runner that receives every flushed batch.
    pub fn runner(mut self, runner: impl EffectRunner + 'static) -> Self {
        self.runner = Arc::new(runner);
        self
    }

    pub fn is_asynchronous(&self) -> bool {
        self.asynchronous
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            asynchronous: false,
            sync_dispatch: Arc::new(SyncDispatch),
            async_dispatch: Arc::new(DeferredDispatch),
            runner: Arc::new(SequentialRunner),
        }
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("asynchronous", &self.asynchronous)
            .finish_non_exhaustive()
    }
}
