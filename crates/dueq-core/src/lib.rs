//! `dueq-core` — configuration, clock, and error types shared by the dueq crates.

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, MonotonicClock, SystemClock};
pub use config::{ClockKind, DueqConfig, LoggingConfig, SchedulerConfig};
pub use error::{ConfigError, Result};
