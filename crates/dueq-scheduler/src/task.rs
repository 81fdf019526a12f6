use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::error::TaskError;

/// The work a task performs once it is due.
pub type Computation<T> = Box<dyn FnOnce() -> std::result::Result<T, TaskError> + Send + 'static>;

/// A submitted unit of work: sequence number, due time, and computation.
///
/// Immutable after creation. Tasks are totally ordered by `(due_at, seq)`;
/// `seq` comes from the scheduler's atomic counter, so tasks due at the same
/// instant compare in submission order no matter which thread submitted them.
pub struct Task<T> {
    seq: u64,
    due_at: DateTime<Utc>,
    computation: Computation<T>,
}

impl<T> Task<T> {
    pub fn new(seq: u64, due_at: DateTime<Utc>, computation: Computation<T>) -> Self {
        Self { seq, due_at, computation }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn due_at(&self) -> DateTime<Utc> {
        self.due_at
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }

    /// Consume the task and run its computation on the current thread.
    pub fn run(self) -> std::result::Result<T, TaskError> {
        (self.computation)()
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("seq", &self.seq)
            .field("due_at", &self.due_at)
            .finish_non_exhaustive()
    }
}

// Equality follows the ordering key only; seq is unique per scheduler, so two
// distinct tasks never compare equal.
impl<T> PartialEq for Task<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Task<T> {}

impl<T> PartialOrd for Task<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Task<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due_at
            .cmp(&other.due_at)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn task(seq: u64, due_at: DateTime<Utc>) -> Task<u64> {
        Task::new(seq, due_at, Box::new(move || Ok(seq)))
    }

    #[test]
    fn earlier_due_time_sorts_first() {
        let now = Utc::now();
        let early = task(2, now);
        let late = task(1, now + Duration::seconds(1));
        assert!(early < late);
    }

    #[test]
    fn equal_due_time_breaks_tie_by_seq() {
        let now = Utc::now();
        let first = task(1, now);
        let second = task(2, now);
        assert!(first < second);
        assert_ne!(first, second);
    }

    #[test]
    fn is_due_includes_exact_instant() {
        let now = Utc::now();
        assert!(task(1, now).is_due(now));
        assert!(!task(1, now + Duration::milliseconds(1)).is_due(now));
    }

    #[test]
    fn run_returns_computation_result() {
        let t = task(7, Utc::now());
        assert_eq!(t.run().unwrap(), 7);
    }

    #[test]
    fn debug_omits_computation() {
        let rendered = format!("{:?}", task(3, Utc::now()));
        assert!(rendered.contains("seq: 3"));
    }
}
