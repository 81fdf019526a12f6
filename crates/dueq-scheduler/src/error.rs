use thiserror::Error;

/// Error type a computation may return.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported synchronously by the scheduler API.
///
/// Lifecycle messages match the scheduler's long-standing wording so existing
/// log searches and assertions keep working.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// `stop()` called before `start()`.
    #[error("Not started yet")]
    NotStarted,

    /// `start()` called on a running scheduler.
    #[error("Already started")]
    AlreadyStarted,

    /// `start()` called after `stop()`.
    #[error("Cannot restart")]
    CannotRestart,

    /// `stop()` called twice.
    #[error("Already stopped")]
    AlreadyStopped,

    /// Submission after `stop()`.
    #[error("Stopped")]
    Stopped,

    /// A task request is missing its due time or computation.
    #[error("{0}")]
    InvalidArgument(String),

    /// No Tokio runtime was injected or available at `start()`.
    #[error("Runtime unavailable: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Why a [`ResultHandle`](crate::ResultHandle) resolved without a value.
#[derive(Debug, Error)]
pub enum TaskFailure {
    /// The computation returned an error.
    #[error("task failed: {0}")]
    Failed(#[source] TaskError),

    /// The computation panicked; the payload message is kept when it is a string.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The scheduler was dropped while the task was still queued.
    #[error("task abandoned: scheduler dropped before execution")]
    Abandoned,
}

impl TaskFailure {
    /// The computation's own error, if it returned one.
    pub fn task_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            TaskFailure::Failed(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
