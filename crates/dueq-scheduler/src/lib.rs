//! `dueq-scheduler` — time-ordered task scheduler on Tokio.
//!
//! # Overview
//!
//! Callers submit `(due_at, computation)` pairs from any thread. Each task
//! passes through two stages:
//!
//! | Stage         | Structure                         | Driven by      |
//! |---------------|-----------------------------------|----------------|
//! | Pending store | min-heap on `(due_at, seq)`       | [`dispatcher`] |
//! | Ready queue   | unbounded FIFO channel            | [`executor`]   |
//!
//! The dispatcher parks until the earliest pending task is due (or until an
//! earlier one is submitted) and moves due tasks to the ready queue in order.
//! The executor runs them one at a time and resolves each task's
//! [`ResultHandle`]. Tasks due at the same instant run in submission order.
//!
//! A [`Scheduler`] is single-shot: once stopped it cannot be started again.

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod executor;
pub mod pending;
pub mod ready;
pub mod results;
pub mod task;
pub mod types;

pub use dueq_core::{Clock, MonotonicClock, SchedulerConfig, SystemClock};
pub use engine::{Scheduler, TaskBuilder};
pub use error::{Result, SchedulerError, TaskError, TaskFailure};
pub use results::ResultHandle;
pub use task::Task;
pub use types::{LifecycleState, SchedulerStats};
