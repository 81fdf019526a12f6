use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dueq_core::{Clock, SchedulerConfig};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{Result, SchedulerError, TaskError};
use crate::executor::Executor;
use crate::pending::PendingStore;
use crate::ready;
use crate::results::{ResultHandle, ResultTable};
use crate::task::{Computation, Task};
use crate::types::{LifecycleState, SchedulerStats};

/// Time-ordered task scheduler.
///
/// Submit from any thread with [`submit`](Self::submit) or [`task`](Self::task);
/// each call returns a [`ResultHandle`] right away. Computations run in
/// `(due_at, seq)` order on a single executor, so a long computation delays
/// everything due after it rather than letting later tasks overtake it.
pub struct Scheduler<T> {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    runtime: Option<Handle>,
    pending: Arc<PendingStore<T>>,
    results: Arc<ResultTable<T>>,
    /// Last sequence number handed out; the first task gets 1.
    next_seq: AtomicU64,
    stopped: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    state: LifecycleState,
    shutdown: Option<watch::Sender<bool>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> Scheduler<T> {
    /// Scheduler with default settings.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        let clock = config.clock.build();
        Self {
            config,
            clock,
            runtime: None,
            pending: Arc::new(PendingStore::new()),
            results: Arc::new(ResultTable::new()),
            next_seq: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            lifecycle: Mutex::new(Lifecycle {
                state: LifecycleState::NotStarted,
                shutdown: None,
                workers: Vec::new(),
            }),
        }
    }

    /// Replace the time source. Due times passed to `submit` must be on the
    /// same timeline as this clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Spawn background loops on this runtime instead of the one current at `start()`.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Spawn the dispatcher and executor. A scheduler can be started once.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().expect("scheduler lifecycle poisoned");
        match lifecycle.state {
            LifecycleState::NotStarted => {}
            LifecycleState::Running => return Err(SchedulerError::AlreadyStarted),
            LifecycleState::Stopped => return Err(SchedulerError::CannotRestart),
        }

        let runtime = match &self.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|e| SchedulerError::Runtime(e.to_string()))?,
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = ready::channel();
        let executor = Executor::new(
            self.config.name.clone(),
            ready_rx,
            Arc::clone(&self.results),
            self.config.blocking_pool,
        );
        let dispatcher = Dispatcher::new(
            self.config.name.clone(),
            Arc::clone(&self.pending),
            ready_tx,
            Arc::clone(&self.clock),
            self.config.max_park(),
        );

        lifecycle.workers = vec![
            runtime.spawn(executor.run(shutdown_rx.clone())),
            runtime.spawn(dispatcher.run(shutdown_rx)),
        ];
        lifecycle.shutdown = Some(shutdown_tx);
        lifecycle.state = LifecycleState::Running;

        info!(
            scheduler = %self.config.name,
            pending = self.pending.len(),
            max_park_ms = self.config.max_park_ms,
            "scheduler started"
        );
        Ok(())
    }

    /// Signal both background loops to exit. Queued tasks are left where they
    /// are and their handles stay unresolved while this scheduler is alive.
    pub fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().expect("scheduler lifecycle poisoned");
        match lifecycle.state {
            LifecycleState::Running => {}
            LifecycleState::NotStarted => return Err(SchedulerError::NotStarted),
            LifecycleState::Stopped => return Err(SchedulerError::AlreadyStopped),
        }

        lifecycle.state = LifecycleState::Stopped;
        self.stopped.store(true, Ordering::Release);
        if let Some(shutdown) = &lifecycle.shutdown {
            // Receivers only disappear once both loops have already exited.
            let _ = shutdown.send(true);
        }

        info!(
            scheduler = %self.config.name,
            pending = self.pending.len(),
            outstanding = self.results.len(),
            "scheduler stopped"
        );
        Ok(())
    }

    /// Wait until the dispatcher and executor have exited. Returns at once if
    /// they were never spawned or were already joined.
    pub async fn join(&self) {
        let workers = {
            let mut lifecycle = self.lifecycle.lock().expect("scheduler lifecycle poisoned");
            std::mem::take(&mut lifecycle.workers)
        };
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(scheduler = %self.config.name, error = %e, "background loop ended abnormally");
            }
        }
    }

    /// Schedule `computation` to run at or after `due_at`.
    ///
    /// Never blocks on execution. A `due_at` at or before now makes the task
    /// eligible immediately. Tasks submitted before `start()` wait for it.
    pub fn submit<F, E>(&self, due_at: DateTime<Utc>, computation: F) -> Result<ResultHandle<T>>
    where
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
        E: Into<TaskError>,
    {
        self.enqueue(
            due_at,
            Box::new(move || -> std::result::Result<T, TaskError> { computation().map_err(Into::into) }),
        )
    }

    /// Start a task request whose parts are supplied piecemeal.
    pub fn task(&self) -> TaskBuilder<'_, T> {
        TaskBuilder {
            scheduler: self,
            due_at: None,
            computation: None,
            invalid: None,
        }
    }

    fn enqueue(&self, due_at: DateTime<Utc>, computation: Computation<T>) -> Result<ResultHandle<T>> {
        if self.is_stopped() {
            return Err(SchedulerError::Stopped);
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        // Register before inserting so the executor always finds the handle.
        let handle = self.results.register(seq);
        let woke = self.pending.push(Task::new(seq, due_at, computation));
        debug!(scheduler = %self.config.name, seq, %due_at, woke, "task submitted");
        Ok(handle)
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Current time on the scheduler's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.lock().expect("scheduler lifecycle poisoned").state
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            state: self.state(),
            pending: self.pending.len(),
            outstanding: self.results.len(),
            submitted: self.next_seq.load(Ordering::SeqCst),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

impl<T: Send + 'static> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Scheduler<T> {
    fn drop(&mut self) {
        // Dropping the watch sender ends both loops; this only adds the log line.
        if let Ok(lifecycle) = self.lifecycle.get_mut() {
            if lifecycle.state == LifecycleState::Running {
                info!(scheduler = %self.config.name, "scheduler dropped while running");
            }
        }
    }
}

/// Task request assembled step by step, validated on [`submit`](Self::submit).
#[must_use = "nothing is scheduled until submit() is called"]
pub struct TaskBuilder<'a, T> {
    scheduler: &'a Scheduler<T>,
    due_at: Option<DateTime<Utc>>,
    computation: Option<Computation<T>>,
    invalid: Option<String>,
}

impl<'a, T: Send + 'static> TaskBuilder<'a, T> {
    /// Run at or after this instant.
    pub fn at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    /// Run `delay` from now on the scheduler's clock.
    pub fn after(mut self, delay: Duration) -> Self {
        let due_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| self.scheduler.now().checked_add_signed(d));
        match due_at {
            Some(at) => self.due_at = Some(at),
            None => self.invalid = Some(format!("delay out of range: {delay:?}")),
        }
        self
    }

    /// Run as soon as possible.
    pub fn now(self) -> Self {
        let at = self.scheduler.now();
        self.at(at)
    }

    pub fn run<F, E>(mut self, computation: F) -> Self
    where
        F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
        E: Into<TaskError>,
    {
        self.computation = Some(Box::new(move || -> std::result::Result<T, TaskError> {
            computation().map_err(Into::into)
        }));
        self
    }

    /// Validate and schedule. Lifecycle is checked first, then the arguments.
    pub fn submit(self) -> Result<ResultHandle<T>> {
        if self.scheduler.is_stopped() {
            return Err(SchedulerError::Stopped);
        }
        if let Some(reason) = self.invalid {
            return Err(SchedulerError::InvalidArgument(reason));
        }
        let due_at = self
            .due_at
            .ok_or_else(|| SchedulerError::InvalidArgument("time can not be null".to_string()))?;
        let computation = self
            .computation
            .ok_or_else(|| SchedulerError::InvalidArgument("callable can not be null".to_string()))?;
        self.scheduler.enqueue(due_at, computation)
    }
}
