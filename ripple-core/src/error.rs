//! Errors
//!
//! Every failure in the reactive graph surfaces to whichever caller's
//! `get`, `set` or constructor triggered it. There are no retries.
//!
//! # Unwinding
//!
//! Cells are evaluated through user closures that return plain values, so
//! an error found deep inside an evaluation (a computed reading itself three
//! levels down, an effect re-triggering itself through a chain of computed
//! cells) cannot travel back through those closures as a `Result`. Instead the
//! runtime raises the [`ReactiveError`] as a panic payload. Drop guards put
//! the graph back into a consistent state while the stack unwinds, and the
//! `try_*` entry points catch exactly that payload and hand it back as an
//! `Err`. Panics that did not originate in the runtime are resumed as-is.
//!
//! Under a `try_*` call the error unwinds silently, without the panic hook.
//! With nobody catching it, it panics with its display message.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;

/// Errors raised by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computed cell was read while it was already being evaluated.
    #[error("cycle detected while evaluating {name}")]
    Cycle {
        /// Label (or arena index) of the cell that was re-entered.
        name: String,
    },

    /// An effect re-queued itself while it was still running and has no
    /// `on_loop` predicate to decide what to do about it.
    #[error("{name} re-triggered itself while running; register `on_loop` to allow it")]
    Loop {
        /// Label (or arena index) of the effect.
        name: String,
    },

    /// The options passed to a constructor were rejected before any node
    /// or edge was created.
    #[error("invalid options: {reason}")]
    Construction {
        /// What was wrong with the options.
        reason: String,
    },
}

/// Result alias used throughout the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

thread_local! {
    /// Number of [`catch`] frames on this thread's stack.
    static CATCHING: Cell<usize> = const { Cell::new(0) };
}

/// Raise `err` out of the current evaluation.
pub(crate) fn raise(err: ReactiveError) -> ! {
    if CATCHING.with(Cell::get) > 0 {
        panic::resume_unwind(Box::new(err))
    }
    panic!("{err}")
}

struct Catching;

impl Catching {
    fn enter() -> Self {
        CATCHING.with(|depth| depth.set(depth.get() + 1));
        Catching
    }
}

impl Drop for Catching {
    fn drop(&mut self) {
        CATCHING.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Run `f`, turning a raised [`ReactiveError`] back into an `Err`.
pub(crate) fn catch<R>(f: impl FnOnce() -> R) -> Result<R> {
    let outcome = {
        let _catching = Catching::enter();
        panic::catch_unwind(AssertUnwindSafe(f))
    };
    match outcome {
        Ok(value) => Ok(value),
        Err(payload) => match payload.downcast::<ReactiveError>() {
            Ok(err) => Err(*err),
            Err(other) => panic::resume_unwind(other),
        },
    }
}

/// Labels show up in error messages and logs, so a blank one is rejected.
pub(crate) fn check_label(label: Option<&str>) -> Result<()> {
    match label {
        Some(label) if label.trim().is_empty() => Err(ReactiveError::Construction {
            reason: "label must not be blank".to_string(),
        }),
        _ => Ok(()),
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catch_returns_value_when_nothing_is_raised() {
        assert_eq!(catch(|| 7), Ok(7));
    }

    #[test]
    fn catch_converts_raised_error() {
        let result: Result<()> = catch(|| {
            raise(ReactiveError::Cycle {
                name: "total".into(),
            })
        });

        assert_eq!(
            result,
            Err(ReactiveError::Cycle {
                name: "total".into()
            })
        );
    }

    #[test]
    fn catch_resumes_foreign_panics() {
        let outer = panic::catch_unwind(|| catch(|| panic!("not ours")));
        assert!(outer.is_err());
    }

    #[test]
    fn uncaught_errors_panic_with_their_message() {
        let payload = panic::catch_unwind(|| {
            raise(ReactiveError::Cycle {
                name: "computed `total`".into(),
            })
        })
        .unwrap_err();

        let message = payload.downcast_ref::<String>().unwrap();
        assert_eq!(message, "cycle detected while evaluating computed `total`");
    }

    #[test]
    fn nested_catches_keep_the_error_typed() {
        let outer = catch(|| {
            let inner: Result<()> = catch(|| {
                raise(ReactiveError::Loop {
                    name: "effect #3".into(),
                })
            });
            assert!(inner.is_err());
            raise(ReactiveError::Cycle {
                name: "computed #1".into(),
            })
        });

        assert_eq!(
            outer,
            Err::<(), _>(ReactiveError::Cycle {
                name: "computed #1".into()
            })
        );
        assert_eq!(CATCHING.with(Cell::get), 0);
    }

    #[test]
    fn error_messages_name_the_node() {
        let err = ReactiveError::Loop {
            name: "effect `logger`".into(),
        };
        assert!(err.to_string().contains("effect `logger`"));
        assert!(err.to_string().contains("on_loop"));
    }

    #[test]
    fn blank_labels_are_rejected() {
        assert!(check_label(None).is_ok());
        assert!(check_label(Some("total")).is_ok());
        assert!(matches!(
            check_label(Some("  ")),
            Err(ReactiveError::Construction { .. })
        ));
    }
}
