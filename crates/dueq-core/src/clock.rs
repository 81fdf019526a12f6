//! Time sources consumed by the scheduler.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::ClockKind;

/// Source of "now" for due-time comparisons.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the system wall clock on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall-clock time that never goes backwards.
///
/// The wall clock is read once at construction; afterwards time advances with
/// `Instant`, so NTP steps or manual clock changes do not move due times.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    anchor_wall: DateTime<Utc>,
    anchor: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            anchor_wall: Utc::now(),
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        // chrono::Duration::from_std only fails past ~292 billion years of uptime.
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed()).unwrap_or(chrono::Duration::MAX);
        self.anchor_wall
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl ClockKind {
    /// Build the clock this kind names.
    pub fn build(self) -> Arc<dyn Clock> {
        match self {
            ClockKind::Monotonic => Arc::new(MonotonicClock::new()),
            ClockKind::System => Arc::new(SystemClock),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let mut prev = clock.now();
        for _ in 0..1_000 {
            let next = clock.now();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn monotonic_clock_tracks_wall_clock() {
        let clock = MonotonicClock::new();
        let drift = (Utc::now() - clock.now()).num_milliseconds().abs();
        assert!(drift < 50, "drift was {drift}ms");
    }

    #[test]
    fn clock_kind_builds_matching_clock() {
        let wall = Utc::now();
        let clock = ClockKind::System.build();
        assert!(clock.now() >= wall);
    }
}
