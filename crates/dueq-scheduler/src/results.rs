//! Result table and the single-assignment handles it hands out.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::error::TaskFailure;

/// Final outcome delivered through a [`ResultHandle`].
pub type Outcome<T> = std::result::Result<T, TaskFailure>;

/// Maps sequence numbers to the completion side of their result handle.
///
/// Submitters register, the executor claims. Claiming removes the entry, so
/// at most one party can ever resolve a given handle.
pub struct ResultTable<T> {
    slots: DashMap<u64, Completion<T>>,
}

impl<T> ResultTable<T> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Create the handle pair for `seq` and keep the completion side.
    pub fn register(&self, seq: u64) -> ResultHandle<T> {
        let (tx, rx) = oneshot::channel();
        self.slots.insert(seq, Completion { seq, tx });
        ResultHandle { seq, rx }
    }

    /// Take ownership of the completion for `seq`. `None` if it was never
    /// registered or has already been claimed.
    pub fn claim(&self, seq: u64) -> Option<Completion<T>> {
        self.slots.remove(&seq).map(|(_, completion)| completion)
    }

    /// Handles registered but not yet claimed.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<T> Default for ResultTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Write side of a result handle. Consumed by [`resolve`](Self::resolve).
pub struct Completion<T> {
    seq: u64,
    tx: oneshot::Sender<Outcome<T>>,
}

impl<T> Completion<T> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Deliver the outcome. Returns `false` if the caller already dropped the handle.
    pub fn resolve(self, outcome: Outcome<T>) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

/// Read side: resolves once with the computation's value or its failure.
///
/// Await it from async code, or call [`wait`](Self::wait) from a plain thread.
#[must_use = "the task's result is only observable through its handle"]
pub struct ResultHandle<T> {
    seq: u64,
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> ResultHandle<T> {
    /// Sequence number of the task behind this handle.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Block the current thread until the task resolves. Returns immediately
    /// if it already has.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async execution context; `.await`
    /// the handle there instead.
    pub fn wait(self) -> Outcome<T> {
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_closed| Err(TaskFailure::Abandoned))
    }
}

impl<T> Future for ResultHandle<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_closed| Err(TaskFailure::Abandoned)))
    }
}

impl<T> std::fmt::Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandle").field("seq", &self.seq).finish()
    }
}
