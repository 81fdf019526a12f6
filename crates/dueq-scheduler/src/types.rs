use serde::Serialize;

/// Lifecycle of a [`Scheduler`](crate::Scheduler). Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Created; submissions are accepted and wait for `start()`.
    NotStarted,
    /// Dispatcher and executor are running.
    Running,
    /// Terminal. Background loops have been told to exit.
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::NotStarted => "not_started",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Point-in-time counters, cheap enough to log on every tick.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub state: LifecycleState,
    /// Tasks not yet due (still in the pending store).
    pub pending: usize,
    /// Handles registered but not yet claimed by the executor.
    pub outstanding: usize,
    /// Sequence numbers handed out so far.
    pub submitted: u64,
}
