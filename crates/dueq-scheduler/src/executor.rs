//! Executor: runs due tasks one at a time and resolves their handles.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::TaskFailure;
use crate::ready::ReadyReceiver;
use crate::results::{Outcome, ResultTable};
use crate::task::Task;

pub struct Executor<T> {
    name: String,
    ready: ReadyReceiver<T>,
    results: Arc<ResultTable<T>>,
    blocking_pool: bool,
}

impl<T: Send + 'static> Executor<T> {
    pub fn new(
        name: String,
        ready: ReadyReceiver<T>,
        results: Arc<ResultTable<T>>,
        blocking_pool: bool,
    ) -> Self {
        Self { name, ready, results, blocking_pool }
    }

    /// Main loop. Exits when `shutdown` interrupts the wait for the next task.
    /// A computation that is already running is allowed to finish.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(scheduler = %self.name, blocking_pool = self.blocking_pool, "executor started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let task = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                next = self.ready.pop() => match next {
                    Some(task) => task,
                    None => break,
                },
            };
            self.execute(task).await;
        }
        info!(scheduler = %self.name, "executor stopped");
    }

    /// Claim the task's handle, run the computation, resolve the handle.
    ///
    /// The handle leaves the result table before the computation starts, so it
    /// can be resolved at most once.
    pub async fn execute(&self, task: Task<T>) {
        let seq = task.seq();
        let Some(completion) = self.results.claim(seq) else {
            error!(scheduler = %self.name, seq, "queued task has no registered result handle; dropping it");
            return;
        };

        let outcome = self.run_computation(task).await;
        match &outcome {
            Ok(_) => debug!(scheduler = %self.name, seq, "task completed"),
            Err(e) => warn!(scheduler = %self.name, seq, error = %e, "task failed"),
        }
        if !completion.resolve(outcome) {
            debug!(scheduler = %self.name, seq, "result handle dropped before completion");
        }
    }

    async fn run_computation(&self, task: Task<T>) -> Outcome<T> {
        if self.blocking_pool {
            match tokio::task::spawn_blocking(move || task.run()).await {
                Ok(result) => result.map_err(TaskFailure::Failed),
                Err(join) if join.is_panic() => Err(TaskFailure::Panicked(panic_message(join.into_panic()))),
                // Cancelled: the runtime shut down before the computation could start.
                Err(_) => Err(TaskFailure::Abandoned),
            }
        } else {
            match catch_unwind(AssertUnwindSafe(move || task.run())) {
                Ok(result) => result.map_err(TaskFailure::Failed),
                Err(payload) => Err(TaskFailure::Panicked(panic_message(payload))),
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::error::TaskError;
    use crate::ready;

    fn executor(blocking_pool: bool) -> (Executor<u32>, Arc<ResultTable<u32>>) {
        let results = Arc::new(ResultTable::new());
        let (_tx, rx) = ready::channel();
        (Executor::new("test".into(), rx, Arc::clone(&results), blocking_pool), results)
    }

    #[tokio::test]
    async fn resolves_value_and_clears_table() {
        for blocking_pool in [true, false] {
            let (executor, results) = executor(blocking_pool);
            let handle = results.register(1);
            executor.execute(Task::new(1, Utc::now(), Box::new(|| Ok(10)))).await;
            assert_eq!(handle.await.unwrap(), 10);
            assert!(results.is_empty());
        }
    }

    #[tokio::test]
    async fn error_is_attached_to_handle() {
        let (executor, results) = executor(true);
        let handle = results.register(1);
        executor
            .execute(Task::new(
                1,
                Utc::now(),
                Box::new(|| Err(TaskError::from(std::io::Error::other("io error")))),
            ))
            .await;
        let failure = handle.await.unwrap_err();
        let source = failure.task_error().expect("computation error kept");
        assert_eq!(source.to_string(), "io error");
        assert!(source.downcast_ref::<std::io::Error>().is_some());
    }

    #[tokio::test]
    async fn panic_is_captured_in_both_modes() {
        for blocking_pool in [true, false] {
            let (executor, results) = executor(blocking_pool);
            let handle = results.register(1);
            executor
                .execute(Task::new(1, Utc::now(), Box::new(|| -> Result<u32, TaskError> { panic!("boom") })))
                .await;
            match handle.await {
                Err(TaskFailure::Panicked(msg)) => assert_eq!(msg, "boom"),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn task_without_handle_is_dropped_without_running() {
        let (executor, _results) = executor(false);
        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        executor
            .execute(Task::new(
                9,
                Utc::now(),
                Box::new(move || {
                    flag.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok(0)
                }),
            ))
            .await;
        assert!(!ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
