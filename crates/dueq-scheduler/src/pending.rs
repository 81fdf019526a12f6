//! Pending store: tasks that are not yet due, earliest first.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;

use crate::task::Task;

/// Thread-safe min-heap of tasks ordered by `(due_at, seq)`, paired with the
/// wake signal the dispatcher parks on.
///
/// Any number of submitters may [`push`](Self::push); a single dispatcher
/// drains it with [`pop_due`](Self::pop_due).
pub struct PendingStore<T> {
    heap: Mutex<BinaryHeap<Reverse<Task<T>>>>,
    wake: Notify,
}

impl<T> PendingStore<T> {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            wake: Notify::new(),
        }
    }

    /// Insert a task. Wakes the dispatcher when the task became the earliest
    /// entry, since that is the only case where its current deadline is stale.
    ///
    /// Returns `true` if the dispatcher was signalled.
    pub fn push(&self, task: Task<T>) -> bool {
        let seq = task.seq();
        let is_head = {
            let mut heap = self.heap.lock().expect("pending store poisoned");
            heap.push(Reverse(task));
            heap.peek().is_some_and(|Reverse(head)| head.seq() == seq)
        };
        if is_head {
            // notify_one keeps a permit when nobody is parked yet, so a push
            // racing with the dispatcher's deadline computation is not lost.
            self.wake.notify_one();
        }
        is_head
    }

    /// Remove and return the earliest task if it is due at `now`.
    ///
    /// Peek and pop happen under one lock, so a task inserted concurrently
    /// can only be returned here if it is itself the earliest and due.
    pub fn pop_due(&self, now: DateTime<Utc>) -> Option<Task<T>> {
        let mut heap = self.heap.lock().expect("pending store poisoned");
        if heap.peek().is_some_and(|Reverse(head)| head.is_due(now)) {
            heap.pop().map(|Reverse(task)| task)
        } else {
            None
        }
    }

    /// Due time of the earliest pending task.
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        let heap = self.heap.lock().expect("pending store poisoned");
        heap.peek().map(|Reverse(head)| head.due_at())
    }

    pub fn len(&self) -> usize {
        self.heap.lock().expect("pending store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Future that completes on the next wake signal (or immediately if one
    /// was raised while nobody was waiting).
    pub fn notified(&self) -> Notified<'_> {
        self.wake.notified()
    }
}

impl<T> Default for PendingStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
