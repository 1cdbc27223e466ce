//! Effect Queues
//!
//! Effects reached by dirty propagation land in one of two queues:
//!
//! - the **maybe-run** queue, for effects reached through a computed cell.
//!   The computed might recompute to the same value, so these are validated
//!   against their dependency snapshot before anything runs.
//! - the **must-run** queue, for effects reached directly from a signal
//!   write (or promoted out of the maybe-run queue). These run in FIFO order.
//!
//! Deduplication is done by the effect's state (`Queued`, `MayRecall`), not
//! by the queues themselves, so an id may appear twice after a pause/resume
//! cycle. The runtime skips entries whose state no longer matches.

use std::collections::VecDeque;

use super::node::NodeId;

#[derive(Debug, Default)]
pub(crate) struct EffectQueues {
    maybe: VecDeque<NodeId>,
    must: VecDeque<NodeId>,
}

impl EffectQueues {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_maybe(&mut self, id: NodeId) {
        self.maybe.push_back(id);
    }

    pub(crate) fn push_must(&mut self, id: NodeId) {
        self.must.push_back(id);
    }

    /// Next effect waiting for validation. Entries are popped one at a time
    /// so anything left behind by an aborted validation is still queued.
    pub(crate) fn pop_maybe(&mut self) -> Option<NodeId> {
        self.maybe.pop_front()
    }

    /// Snapshot and clear the must-run queue.
    pub(crate) fn take_must(&mut self) -> Vec<NodeId> {
        self.must.drain(..).collect()
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.maybe.is_empty() && self.must.is_empty()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn must_queue_is_fifo_snapshot() {
        let mut queues = EffectQueues::new();
        let ids: Vec<NodeId> = (0..3).map(NodeId::new).collect();

        for id in &ids {
            queues.push_must(*id);
        }

        assert_eq!(queues.take_must(), ids);
        assert!(queues.take_must().is_empty());
        assert!(queues.is_idle());
    }

    #[test]
    fn maybe_queue_pops_in_order() {
        let mut queues = EffectQueues::new();
        queues.push_maybe(NodeId::new(4));
        queues.push_maybe(NodeId::new(2));

        assert!(!queues.is_idle());
        assert_eq!(queues.pop_maybe(), Some(NodeId::new(4)));
        assert_eq!(queues.pop_maybe(), Some(NodeId::new(2)));
        assert_eq!(queues.pop_maybe(), None);
    }
}
