//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive: a mutable cell that
//! computed cells and effects depend on by reading it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read inside a running computed/effect, that
//!    computation is recorded as a subscriber, together with the value and
//!    version it saw.
//!
//! 2. When a signal is written with a value that differs under its
//!    [`Equality`], the version is bumped and subscribers are marked.
//!
//! 3. Effects that end up confirmed dirty are flushed before `set` returns
//!    (unless a batch is open or they dispatch asynchronously).
//!
//! # Memory Layout
//!
//! The handle is just a runtime pointer and an arena index. The value lives
//! type-erased in the runtime's graph, and the handle's type parameter puts
//! the type back on the way out.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use super::computed::Computed;
use super::equality::Equality;
use super::runtime::Runtime;
use crate::error::{catch, check_label, Result};
use crate::graph::{downcast, NodeId};

/// Options shared by signals and computed cells.
pub struct CellOptions<T> {
    equal: Equality<T>,
    label: Option<String>,
}

impl<T: 'static> CellOptions<T> {
    /// Options with the given equality and no label.
    pub fn new(equal: Equality<T>) -> Self {
        Self { equal, label: None }
    }

    pub fn equal(mut self, equal: Equality<T>) -> Self {
        self.equal = equal;
        self
    }

    /// Name used in errors and logs instead of the arena index.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        check_label(self.label.as_deref())
    }

    pub(crate) fn into_parts(self) -> (Equality<T>, Option<String>) {
        (self.equal, self.label)
    }
}

impl<T: PartialEq + 'static> Default for CellOptions<T> {
    fn default() -> Self {
        Self::new(Equality::default())
    }
}

impl<T> fmt::Debug for CellOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CellOptions")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// A reactive signal holding a value of type `T`.
///
/// # Example
///
/// ```rust
/// use ripple_core::Runtime;
///
/// let rt = Runtime::new();
/// let count = rt.signal(0);
///
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T> {
    runtime: Runtime,
    id: NodeId,
    _value: PhantomData<fn() -> T>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a signal on the current thread's default runtime.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Runtime::current().signal(value)
    }

    pub(crate) fn from_parts(runtime: Runtime, id: NodeId) -> Self {
        Self {
            runtime,
            id,
            _value: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Get the current value, registering the read with the running
    /// computation (if any).
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without establishing a dependency.
    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }

    /// Borrow the current value for the duration of `f`. Tracked.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.runtime.read_source(self.id, true);
        f(downcast(&value))
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.runtime.read_source(self.id, false);
        f(downcast(&value))
    }

    /// Store `value` and propagate.
    ///
    /// Nothing happens if `value` equals the current value; the current
    /// value is kept and returned. Otherwise the new value is returned once
    /// every synchronously dispatched effect has settled.
    ///
    /// # Panics
    ///
    /// Raises a [`ReactiveError`](crate::ReactiveError) when propagation
    /// hits a cycle or an effect loop. Use [`try_set`](Self::try_set) to get
    /// it back as an `Err`.
    pub fn set(&self, value: T) -> T {
        let stored = self.runtime.write_source(self.id, Arc::new(value), false);
        downcast::<T>(&stored).clone()
    }

    pub fn try_set(&self, value: T) -> Result<T> {
        catch(|| self.set(value))
    }

    /// Derive the next value from the current one. Untracked.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> T {
        let _serial = self.runtime.serial();
        let next = self.with_untracked(f);
        self.set(next)
    }

    pub fn try_update(&self, f: impl FnOnce(&T) -> T) -> Result<T> {
        catch(|| self.update(f))
    }

    /// Edit a copy of the value in place and store it. Skips the equality
    /// check: dependents are always notified, even if `f` left the value
    /// as it was.
    pub fn mutate(&self, f: impl FnOnce(&mut T)) {
        let _serial = self.runtime.serial();
        let mut value = self.get_untracked();
        f(&mut value);
        self.runtime.write_source(self.id, Arc::new(value), true);
    }

    /// Propagate as if the value had changed, without touching it.
    pub fn force_change(&self) {
        self.runtime.force_change(self.id);
    }

    /// A read-only view that tracks this signal.
    pub fn as_readonly(&self) -> Computed<T>
    where
        T: PartialEq,
    {
        let source = self.clone();
        self.runtime.computed(move || source.get())
    }

    /// Bumped on every stored change.
    pub fn version(&self) -> u64 {
        self.runtime.version(self.id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.runtime.subscriber_count(self.id)
    }
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Signal<T>
where
    T: fmt::Debug + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_untracked(|value| {
            f.debug_struct("Signal")
                .field("id", &self.id)
                .field("value", value)
                .finish()
        })
    }
}

impl<T> fmt::Display for Signal<T>
where
    T: fmt::Display + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_untracked(|value| write!(f, "[signal {value}]"))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::ReactiveError;

    #[test]
    fn signal_get_set() {
        let rt = Runtime::new();
        let signal = rt.signal(42);
        assert_eq!(signal.get(), 42);

        assert_eq!(signal.set(100), 100);
        assert_eq!(signal.get(), 100);
    }

    #[test]
    fn signal_update() {
        let rt = Runtime::new();
        let signal = rt.signal(10);
        signal.update(|v| v * 2);
        assert_eq!(signal.get(), 20);
    }

    #[test]
    fn equal_write_keeps_version() {
        let rt = Runtime::new();
        let signal = rt.signal(String::from("a"));
        let before = signal.version();

        signal.set("a".to_string());
        assert_eq!(signal.version(), before);

        signal.set("b".to_string());
        assert_eq!(signal.version(), before + 1);
    }

    #[test]
    fn custom_equality_keeps_current_value() {
        let rt = Runtime::new();
        let rounded = rt.signal_with(
            1.0_f64,
            CellOptions::new(Equality::new(|a: &f64, b: &f64| (a - b).abs() < 0.5)),
        );

        assert_eq!(rounded.set(1.2), 1.0);
        assert_eq!(rounded.set(2.0), 2.0);
    }

    #[test]
    fn mutate_always_propagates() {
        let rt = Runtime::new();
        let items = rt.signal(vec![1, 2]);
        let before = items.version();

        items.mutate(|items| items.clear());
        items.mutate(|items| items.clear());

        assert!(items.get().is_empty());
        assert_eq!(items.version(), before + 2);
    }

    #[test]
    fn mutate_notifies_even_when_nothing_changed() {
        let rt = Runtime::new();
        let items = rt.signal(vec![1, 2]);
        let runs = Arc::new(AtomicUsize::new(0));
        let _effect = {
            let (items, runs) = (items.clone(), runs.clone());
            rt.effect(move |_| {
                items.with(|items| items.len());
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };

        items.mutate(|_| {});

        assert_eq!(items.get(), vec![1, 2]);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn force_change_bumps_version_only() {
        let rt = Runtime::new();
        let signal = rt.signal(5);
        signal.force_change();
        assert_eq!(signal.get(), 5);
        assert_eq!(signal.version(), 1);
    }

    #[test]
    fn readonly_view_follows_signal() {
        let rt = Runtime::new();
        let signal = rt.signal(1);
        let view = signal.as_readonly();

        signal.set(2);
        assert_eq!(view.get(), 2);
    }

    #[test]
    fn display_and_debug() {
        let rt = Runtime::new();
        let signal = rt.signal(7);
        assert_eq!(signal.to_string(), "[signal 7]");
        assert!(format!("{signal:?}").contains("value: 7"));
    }

    #[test]
    fn blank_label_is_a_construction_error() {
        let rt = Runtime::new();
        let result = rt.try_signal_with(0, CellOptions::default().label(" "));
        assert!(matches!(result, Err(ReactiveError::Construction { .. })));
        assert_eq!(rt.node_count(), 0);
    }
}
