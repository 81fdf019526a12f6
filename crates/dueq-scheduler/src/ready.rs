//! Ready queue: due tasks handed from the dispatcher to the executor.

use tokio::sync::mpsc;

use crate::task::Task;

/// Create a connected ready queue. Unbounded, so the dispatcher never waits on
/// a slow executor; backlog accumulates here instead.
pub fn channel<T>() -> (ReadySender<T>, ReadyReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReadySender { tx }, ReadyReceiver { rx })
}

/// Dispatcher side. Tasks are delivered in exactly the order they are pushed.
pub struct ReadySender<T> {
    tx: mpsc::UnboundedSender<Task<T>>,
}

impl<T> ReadySender<T> {
    /// Enqueue a due task. Gives the task back if the executor has exited.
    pub fn push(&self, task: Task<T>) -> std::result::Result<(), Task<T>> {
        self.tx.send(task).map_err(|e| e.0)
    }
}

/// Executor side.
pub struct ReadyReceiver<T> {
    rx: mpsc::UnboundedReceiver<Task<T>>,
}

impl<T> ReadyReceiver<T> {
    /// Wait for the next due task. `None` once the dispatcher side is gone
    /// and the queue is drained. Cancel-safe.
    pub async fn pop(&mut self) -> Option<Task<T>> {
        self.rx.recv().await
    }
}
