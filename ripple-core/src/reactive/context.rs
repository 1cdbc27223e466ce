//! Dependency Tracker
//!
//! The tracker records which computation is currently running so that reads
//! can register it as a dependent. This is what makes dependency discovery
//! implicit: a computed cell or effect never declares its inputs, it just
//! reads them.
//!
//! # Implementation
//!
//! A stack of frames, one per running computed/effect callback. Entering a
//! callback pushes a frame, every tracked read appends to the top frame, and
//! leaving pops it and hands back what was captured. Nested evaluation (a
//! computed reading another computed that is stale) simply pushes a second
//! frame on top.
//!
//! Each frame carries its own tracking flag, so `untrack` inside one
//! callback does not stop a nested computed from capturing its own inputs.

use super::runtime::Runtime;
use crate::graph::{contains, Dependencies, Dependency, NodeId};

#[derive(Clone)]
struct Frame {
    listener: NodeId,
    dependencies: Dependencies,
    tracking: bool,
}

/// The active-listener stack of one runtime.
#[derive(Default)]
pub(crate) struct Tracker {
    frames: Vec<Frame>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        Self { frames: Vec::new() }
    }

    pub(crate) fn push(&mut self, listener: NodeId) {
        self.frames.push(Frame {
            listener,
            dependencies: Dependencies::new(),
            tracking: true,
        });
    }

    /// Pop the top frame and return what it captured.
    pub(crate) fn pop(&mut self, listener: NodeId) -> Dependencies {
        match self.frames.pop() {
            Some(frame) => {
                // Catches frames that were pushed and popped out of order.
                debug_assert_eq!(
                    frame.listener, listener,
                    "tracker mismatch: expected {:?}, got {:?}",
                    listener, frame.listener
                );
                frame.dependencies
            }
            None => Dependencies::new(),
        }
    }

    /// The listener that a read right now would be recorded for.
    pub(crate) fn current(&self) -> Option<NodeId> {
        self.frames
            .last()
            .filter(|frame| frame.tracking)
            .map(|frame| frame.listener)
    }

    /// Record a read for the current listener. Returns `false` when the cell
    /// was already captured during this evaluation.
    pub(crate) fn record(&mut self, dependency: Dependency) -> bool {
        match self.frames.last_mut() {
            Some(frame) if frame.tracking => {
                if contains(&frame.dependencies, dependency.node) {
                    return false;
                }
                frame.dependencies.push(dependency);
                true
            }
            _ => false,
        }
    }

    /// Switch capturing for the top frame. Returns the previous setting, or
    /// `None` when no callback is running.
    pub(crate) fn set_tracking(&mut self, tracking: bool) -> Option<bool> {
        self.frames
            .last_mut()
            .map(|frame| std::mem::replace(&mut frame.tracking, tracking))
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// Guard for one capturing evaluation.
///
/// If the evaluation unwinds, dropping the guard pops the frame and releases
/// any subscriptions the half-finished run made, so the listener keeps
/// exactly the edges of its last complete evaluation.
pub(crate) struct Capture<'a> {
    runtime: &'a Runtime,
    listener: NodeId,
    finished: bool,
}

impl<'a> Capture<'a> {
    pub(crate) fn begin(runtime: &'a Runtime, listener: NodeId) -> Self {
        runtime.with(|state| state.tracker.push(listener));
        Self {
            runtime,
            listener,
            finished: false,
        }
    }

    pub(crate) fn finish(mut self) -> Dependencies {
        self.finished = true;
        let listener = self.listener;
        self.runtime.with(|state| state.tracker.pop(listener))
    }
}

impl Drop for Capture<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let listener = self.listener;
        self.runtime.with(|state| {
            let captured = state.tracker.pop(listener);
            state.graph.release_captured(listener, captured);
        });
    }
}

/// Guard that restores the top frame's tracking flag.
pub(crate) struct TrackingScope<'a> {
    runtime: &'a Runtime,
    previous: Option<bool>,
}

impl<'a> TrackingScope<'a> {
    pub(crate) fn enter(runtime: &'a Runtime, tracking: bool) -> Self {
        let previous = runtime.with(|state| state.tracker.set_tracking(tracking));
        Self { runtime, previous }
    }
}

impl Drop for TrackingScope<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous {
            self.runtime.with(|state| {
                state.tracker.set_tracking(previous);
            });
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
