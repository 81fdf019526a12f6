//! Dispatcher: moves tasks from the pending store to the ready queue once due.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dueq_core::Clock;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::pending::PendingStore;
use crate::ready::ReadySender;

/// Result of one drain pass over the pending store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStep {
    /// Nothing pending; park until woken.
    Idle,
    /// Earliest remaining task is due at this instant.
    Wait(DateTime<Utc>),
    /// The executor is gone; nothing left to dispatch to.
    Closed,
}

pub struct Dispatcher<T> {
    name: String,
    pending: Arc<PendingStore<T>>,
    ready: ReadySender<T>,
    clock: Arc<dyn Clock>,
    max_park: Option<Duration>,
}

impl<T: Send + 'static> Dispatcher<T> {
    pub fn new(
        name: String,
        pending: Arc<PendingStore<T>>,
        ready: ReadySender<T>,
        clock: Arc<dyn Clock>,
        max_park: Option<Duration>,
    ) -> Self {
        Self { name, pending, ready, clock, max_park }
    }

    /// Move every task that is due now, earliest first, then report what to
    /// wait for next.
    pub fn dispatch_due(&self) -> DispatchStep {
        let now = self.clock.now();
        while let Some(task) = self.pending.pop_due(now) {
            let seq = task.seq();
            let due_at = task.due_at();
            if let Err(task) = self.ready.push(task) {
                debug!(scheduler = %self.name, seq = task.seq(), "executor gone; task left undispatched");
                return DispatchStep::Closed;
            }
            debug!(scheduler = %self.name, seq, %due_at, lag_ms = (now - due_at).num_milliseconds(), "task dispatched");
        }
        match self.pending.next_due_at() {
            Some(at) => DispatchStep::Wait(at),
            None => DispatchStep::Idle,
        }
    }

    /// How long to park before `at` is due, re-read from the clock and capped
    /// by `max_park`. Zero means it is due already.
    pub fn park_duration(&self, at: DateTime<Utc>) -> Duration {
        let delay = (at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        match self.max_park {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Main loop. Exits when `shutdown` becomes `true` or its sender is dropped.
    ///
    /// Every wake, whether timeout, submit signal, or spurious, leads back to a
    /// fresh drain, so the reason for waking never matters.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(scheduler = %self.name, "dispatcher started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let park = match self.dispatch_due() {
                DispatchStep::Closed => break,
                DispatchStep::Idle => None,
                DispatchStep::Wait(at) => {
                    let delay = self.park_duration(at);
                    if delay.is_zero() {
                        continue;
                    }
                    Some(delay)
                }
            };

            trace!(scheduler = %self.name, park = ?park, "dispatcher parking");
            tokio::select! {
                _ = self.pending.notified() => {
                    trace!(scheduler = %self.name, "dispatcher woken by submit");
                }
                _ = park_for(park) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(scheduler = %self.name, pending = self.pending.len(), "dispatcher stopped");
    }
}

async fn park_for(delay: Option<Duration>) {
    match delay {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::ready;
    use crate::task::Task;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn advance(&self, by: ChronoDuration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn task(seq: u64, due_at: DateTime<Utc>) -> Task<u64> {
        Task::new(seq, due_at, Box::new(move || Ok(seq)))
    }

    fn setup(
        max_park: Option<Duration>,
    ) -> (Dispatcher<u64>, Arc<PendingStore<u64>>, ready::ReadyReceiver<u64>, Arc<ManualClock>, DateTime<Utc>) {
        let start = Utc::now();
        let clock = Arc::new(ManualClock(Mutex::new(start)));
        let pending = Arc::new(PendingStore::new());
        let (tx, rx) = ready::channel();
        let dispatcher = Dispatcher::new("test".into(), Arc::clone(&pending), tx, clock.clone(), max_park);
        (dispatcher, pending, rx, clock, start)
    }

    #[tokio::test]
    async fn moves_only_due_tasks_in_order() {
        let (dispatcher, pending, mut rx, clock, start) = setup(None);
        pending.push(task(1, start + ChronoDuration::seconds(10)));
        pending.push(task(2, start + ChronoDuration::seconds(5)));
        pending.push(task(3, start + ChronoDuration::seconds(5)));
        pending.push(task(4, start));

        assert_eq!(dispatcher.dispatch_due(), DispatchStep::Wait(start + ChronoDuration::seconds(5)));
        assert_eq!(rx.pop().await.unwrap().seq(), 4);

        clock.advance(ChronoDuration::seconds(5));
        assert_eq!(dispatcher.dispatch_due(), DispatchStep::Wait(start + ChronoDuration::seconds(10)));
        assert_eq!(rx.pop().await.unwrap().seq(), 2);
        assert_eq!(rx.pop().await.unwrap().seq(), 3);

        clock.advance(ChronoDuration::seconds(5));
        assert_eq!(dispatcher.dispatch_due(), DispatchStep::Idle);
        assert_eq!(rx.pop().await.unwrap().seq(), 1);
    }

    #[test]
    fn reports_closed_when_executor_gone() {
        let (dispatcher, pending, rx, _clock, start) = setup(None);
        drop(rx);
        pending.push(task(1, start));
        assert_eq!(dispatcher.dispatch_due(), DispatchStep::Closed);
    }

    #[test]
    fn park_duration_is_capped_and_never_negative() {
        let (dispatcher, _pending, _rx, _clock, start) = setup(Some(Duration::from_secs(1)));
        assert_eq!(dispatcher.park_duration(start + ChronoDuration::hours(1)), Duration::from_secs(1));
        assert_eq!(dispatcher.park_duration(start - ChronoDuration::seconds(3)), Duration::ZERO);
        assert_eq!(
            dispatcher.park_duration(start + ChronoDuration::milliseconds(250)),
            Duration::from_millis(250)
        );
    }

    #[tokio::test]
    async fn run_exits_promptly_on_shutdown_while_parked() {
        let (dispatcher, pending, _rx, _clock, start) = setup(None);
        pending.push(task(1, start + ChronoDuration::hours(1)));
        let (tx, rx_shutdown) = watch::channel(false);
        let worker = tokio::spawn(dispatcher.run(rx_shutdown));

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_millis(500), worker)
            .await
            .expect("dispatcher did not observe shutdown")
            .unwrap();
    }
}
