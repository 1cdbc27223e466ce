//! Equality Functions
//!
//! A cell only bumps its version, and only wakes its dependents, when the
//! new value differs from the old one under the cell's [`Equality`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::graph::ErasedEq;

/// How a cell decides that a new value is the same as the current one.
///
/// # Example
///
/// ```rust
/// use ripple_core::{CellOptions, Equality, Runtime};
///
/// let rt = Runtime::new();
/// let name = rt.signal_with(
///     String::from("Ada"),
///     CellOptions::new(Equality::new(|a: &String, b: &String| a.eq_ignore_ascii_case(b))),
/// );
/// name.set("ADA".to_string());
/// assert_eq!(name.get(), "Ada");
/// ```
pub struct Equality<T>(Arc<dyn Fn(&T, &T) -> bool + Send + Sync>);

impl<T: 'static> Equality<T> {
    /// Use a custom comparison.
    pub fn new<F>(equal: F) -> Self
    where
        F: Fn(&T, &T) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(equal))
    }

    /// Treat every write as a change.
    pub fn never() -> Self {
        Self::new(|_, _| false)
    }

    /// Compare two values.
    pub fn eq(&self, a: &T, b: &T) -> bool {
        (self.0)(a, b)
    }

    pub(crate) fn erase(self) -> ErasedEq {
        let equal = self.0;
        Arc::new(move |a: &dyn Any, b: &dyn Any| {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => equal(a, b),
                _ => false,
            }
        })
    }
}

impl<T: Serialize + 'static> Equality<T> {
    /// Structural deep equality over the serialized shape of the values.
    ///
    /// Works for types that do not implement `PartialEq`, and ignores
    /// anything `Serialize` skips. Values that fail to serialize are never
    /// equal.
    pub fn structural() -> Self {
        Self::new(|a, b| match (serde_json::to_value(a), serde_json::to_value(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        })
    }
}

impl<U: ?Sized + Send + Sync + 'static> Equality<Arc<U>> {
    /// Reference identity: two handles are equal only if they point at the
    /// same allocation.
    pub fn identity() -> Self {
        Self::new(|a, b| Arc::ptr_eq(a, b))
    }
}

impl<T: PartialEq + 'static> Default for Equality<T> {
    fn default() -> Self {
        Self::new(|a, b| a == b)
    }
}

impl<T> Clone for Equality<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Equality<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Equality(..)")
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn default_uses_partial_eq() {
        let equal = Equality::<i32>::default();
        assert!(equal.eq(&1, &1));
        assert!(!equal.eq(&1, &2));
    }

    #[test]
    fn structural_compares_shape() {
        let equal = Equality::<Point>::structural();
        assert!(equal.eq(&Point { x: 1, y: 2 }, &Point { x: 1, y: 2 }));
        assert!(!equal.eq(&Point { x: 1, y: 2 }, &Point { x: 2, y: 1 }));
    }

    #[test]
    fn identity_compares_allocations() {
        let equal = Equality::<Arc<String>>::identity();
        let a = Arc::new("same".to_string());
        let b = Arc::new("same".to_string());

        assert!(equal.eq(&a, &Arc::clone(&a)));
        assert!(!equal.eq(&a, &b));
    }

    #[test]
    fn never_reports_change() {
        assert!(!Equality::<u8>::never().eq(&0, &0));
    }

    #[test]
    fn erased_rejects_mismatched_types() {
        let erased = Equality::<i32>::default().erase();
        assert!(erased(&5_i32, &5_i32));
        assert!(!erased(&5_i32, &5_i64));
    }
}
