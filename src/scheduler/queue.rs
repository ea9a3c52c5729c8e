//! Dispatch ordering.
//!
//! A max-heap keyed on `(priority, Reverse(seq))`: strictly higher priority
//! first, then lowest submission sequence. Retries re-enter with the
//! sequence they were submitted with, so FIFO holds within a band across
//! retries too.
//!
//! Entries are not removed on cancel. The scheduler skips entries whose
//! task is no longer `Queued` when it pops them.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::types::task::TaskId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueueEntry {
    pub(crate) priority: i32,
    pub(crate) seq: u64,
    pub(crate) task_id: TaskId,
}

impl QueueEntry {
    fn key(&self) -> (i32, Reverse<u64>) {
        (self.priority, Reverse(self.seq))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub(crate) struct PriorityQueue {
    heap: BinaryHeap<QueueEntry>,
}

impl PriorityQueue {
    pub(crate) fn push(&mut self, entry: QueueEntry) {
        self.heap.push(entry);
    }

    pub(crate) fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    /// Drops entries for which `keep` is false.
    pub(crate) fn retain(&mut self, keep: impl FnMut(&QueueEntry) -> bool) {
        self.heap.retain(keep);
    }

    /// Entries in dispatch order.
    pub(crate) fn ordered(&self) -> Vec<&QueueEntry> {
        let mut entries: Vec<&QueueEntry> = self.heap.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries
    }
}
