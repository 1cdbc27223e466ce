//! Computed Implementation
//!
//! A computed cell is a cached derived value that re-evaluates only when
//! something it read actually changed.
//!
//! # How Computed Cells Work
//!
//! 1. Nothing runs at construction. On first access the callback runs and
//!    the result is cached along with a snapshot of every cell it read.
//!
//! 2. When a signal the cell read directly changes, the cell is marked
//!    dirty *and* flagged for a certain recompute.
//!
//! 3. When the change arrives through another computed cell, the cell is
//!    only marked dirty. On next access it re-checks its snapshot first and
//!    keeps the cached value if every input still compares equal.
//!
//! 4. A recompute whose result equals the cached value (under the cell's
//!    equality) keeps the old value and version, so dependents see no change.
//!
//! # Why This Matters
//!
//! - A signal changes
//! - 10 computed cells depend on it
//! - Only the ones actually read will recompute
//! - Cells that are never read stay dirty (no wasted work)

use std::fmt;
use std::marker::PhantomData;

use super::runtime::Runtime;
use crate::error::{catch, Result};
use crate::graph::{downcast, NodeId};

/// A lazily evaluated, memoized derived value.
///
/// # Example
///
/// ```rust
/// use ripple_core::Runtime;
///
/// let rt = Runtime::new();
/// let width = rt.signal(3);
/// let height = rt.signal(4);
/// let area = {
///     let (width, height) = (width.clone(), height.clone());
///     rt.computed(move || width.get() * height.get())
/// };
///
/// assert_eq!(area.get(), 12);
/// width.set(5);
/// assert_eq!(area.get(), 20);
/// ```
pub struct Computed<T> {
    runtime: Runtime,
    id: NodeId,
    _value: PhantomData<fn() -> T>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a computed cell on the current thread's default runtime.
    pub fn new<F>(compute: F) -> Self
    where
        T: PartialEq,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Runtime::current().computed(compute)
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

    /// Get the up-to-date value, evaluating if needed.
    ///
    /// # Panics
    ///
    /// Raises [`ReactiveError::Cycle`](crate::ReactiveError::Cycle) when the
    /// cell is read from inside its own evaluation. Use
    /// [`try_get`](Self::try_get) to get it back as an `Err`.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    pub fn try_get(&self) -> Result<T> {
        catch(|| self.get())
    }

    /// Borrow the up-to-date value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let value = self.runtime.read_computed(self.id, false);
        f(downcast(&value))
    }

    /// Recompute unconditionally, then return the value. Dependents only
    /// see a change if the fresh result differs from the cached one.
    pub fn get_fresh(&self) -> T {
        let value = self.runtime.read_computed(self.id, true);
        downcast::<T>(&value).clone()
    }

    pub fn try_get_fresh(&self) -> Result<T> {
        catch(|| self.get_fresh())
    }

    /// Whether the cached value is known to be current.
    pub fn is_clean(&self) -> bool {
        self.runtime.is_clean(self.id)
    }

    pub fn version(&self) -> u64 {
        self.runtime.version(self.id)
    }

    /// Number of cells read during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.runtime.dependency_count(self.id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.runtime.subscriber_count(self.id)
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            id: self.id,
            _value: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id)
            .field("clean", &self.runtime.is_clean(self.id))
            .finish()
    }
}

impl<T> fmt::Display for Computed<T>
where
    T: fmt::Display + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with(|value| write!(f, "[computed {value}]"))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::{CellOptions, Signal};
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    fn counted(
        rt: &Runtime,
        source: &Signal<i32>,
        count: &Arc<AtomicI32>,
    ) -> Computed<i32> {
        let source = source.clone();
        let count = Arc::clone(count);
        rt.computed(move || {
            count.fetch_add(1, Ordering::SeqCst);
            source.get() * 2
        })
    }

    #[test]
    fn computed_is_lazy() {
        let rt = Runtime::new();
        let source = rt.signal(5);
        let count = Arc::new(AtomicI32::new(0));
        let doubled = counted(&rt, &source, &count);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!doubled.is_clean());

        assert_eq!(doubled.get(), 10);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn computed_caches_value_when_clean() {
        let rt = Runtime::new();
        let source = rt.signal(5);
        let count = Arc::new(AtomicI32::new(0));
        let doubled = counted(&rt, &source, &count);

        doubled.get();
        doubled.get();
        doubled.get();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn computed_recomputes_after_change() {
        let rt = Runtime::new();
        let source = rt.signal(5);
        let count = Arc::new(AtomicI32::new(0));
        let doubled = counted(&rt, &source, &count);

        doubled.get();
        source.set(6);
        assert!(!doubled.is_clean());
        assert_eq!(doubled.get(), 12);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn equal_result_keeps_version() {
        let rt = Runtime::new();
        let source = rt.signal(2);
        let parity = {
            let source = source.clone();
            rt.computed(move || source.get() % 2)
        };

        parity.get();
        let version = parity.version();
        source.set(4);
        parity.get();
        assert_eq!(parity.version(), version);
    }

    #[test]
    fn get_fresh_recomputes() {
        let rt = Runtime::new();
        let source = rt.signal(1);
        let count = Arc::new(AtomicI32::new(0));
        let doubled = counted(&rt, &source, &count);

        doubled.get();
        assert_eq!(doubled.get_fresh(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn self_read_is_a_cycle() {
        let rt = Runtime::new();
        let slot: Arc<parking_lot::Mutex<Option<Computed<i32>>>> = Default::default();
        let looped = {
            let slot = Arc::clone(&slot);
            rt.computed_with(
                move || {
                    let me = slot.lock().clone();
                    me.map_or(0, |me| me.get() + 1)
                },
                CellOptions::default().label("looped"),
            )
        };
        *slot.lock() = Some(looped.clone());

        assert_eq!(
            looped.try_get(),
            Err(ReactiveError::Cycle {
                name: "computed `looped`".into()
            })
        );
        assert!(!looped.is_clean());
    }

    #[test]
    fn dependency_count_reflects_last_run() {
        let rt = Runtime::new();
        let flag = rt.signal(true);
        let a = rt.signal(1);
        let b = rt.signal(2);
        let pick = {
            let (flag, a, b) = (flag.clone(), a.clone(), b.clone());
            rt.computed(move || if flag.get() { a.get() } else { b.get() })
        };

        pick.get();
        assert_eq!(pick.dependency_count(), 2);
        assert_eq!(b.subscriber_count(), 0);

        flag.set(false);
        pick.get();
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 1);
    }
}
