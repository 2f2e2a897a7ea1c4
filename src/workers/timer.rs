use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::counter::format_timestamp;

/// Fires on wall-clock boundaries that are whole multiples of `period` since
/// the Unix epoch, so a 15s schedule fires at :00, :15, :30 and :45.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    period: TimeDelta,
}

impl Schedule {
    /// `None` for a zero period or one too large to represent.
    pub fn every(period: Duration) -> Option<Self> {
        let period = TimeDelta::from_std(period).ok()?;
        if period.num_milliseconds() <= 0 {
            return None;
        }
        Some(Self { period })
    }

    /// First boundary strictly after `t`.
    pub fn next_after(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let period_ms = self.period.num_milliseconds();
        let slot = t.timestamp_millis().div_euclid(period_ms) + 1;
        slot.checked_mul(period_ms)
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(t + self.period)
    }
}

/// What the timer knows when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleInfo {
    pub scheduled_for: DateTime<Utc>,
    pub fired_at: DateTime<Utc>,
    pub next_fire: DateTime<Utc>,
    /// Fired a full period or more after `scheduled_for`.
    pub is_past_due: bool,
}

impl ScheduleInfo {
    fn new(schedule: &Schedule, scheduled_for: DateTime<Utc>, fired_at: DateTime<Utc>) -> Self {
        Self {
            scheduled_for,
            fired_at,
            next_fire: schedule.next_after(fired_at),
            is_past_due: fired_at - scheduled_for >= schedule.period,
        }
    }
}

/// Timer callback. Logs only.
pub fn on_timer_fired(info: &ScheduleInfo) {
    tracing::info!(
        past_due = info.is_past_due,
        "timer function executed at: {}",
        format_timestamp(info.fired_at)
    );
    tracing::info!("next timer schedule at: {}", format_timestamp(info.next_fire));
}

/// Spawn the timer task. It exits when `shutdown` flips to true.
pub fn spawn_timer(
    schedule: Schedule,
    clock: Arc<dyn Clock>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run_timer(schedule, clock, shutdown, on_timer_fired))
}

/// Fires each slot at most once, even when the wall clock still reads a
/// moment before the slot after the monotonic sleep ends.
async fn run_timer(
    schedule: Schedule,
    clock: Arc<dyn Clock>,
    mut shutdown: watch::Receiver<bool>,
    mut on_fire: impl FnMut(&ScheduleInfo) + Send + 'static,
) {
    tracing::info!(period_ms = schedule.period.num_milliseconds(), "timer started");

    let mut last_fired: Option<DateTime<Utc>> = None;

    loop {
        if *shutdown.borrow() {
            tracing::info!("timer shutting down");
            return;
        }

        let now = clock.now();
        let from = last_fired.map_or(now, |last| now.max(last));
        let scheduled_for = schedule.next_after(from);
        let wait = (scheduled_for - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                on_fire(&ScheduleInfo::new(&schedule, scheduled_for, clock.now()));
                last_fired = Some(scheduled_for);
            }
            _ = shutdown.changed() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, s).unwrap()
    }

    fn every_15s() -> Schedule {
        Schedule::every(Duration::from_secs(15)).expect("valid period")
    }

    #[test]
    fn zero_period_is_rejected() {
        assert!(Schedule::every(Duration::ZERO).is_none());
    }

    #[test]
    fn unrepresentable_period_is_rejected() {
        assert!(Schedule::every(Duration::from_secs(u64::MAX)).is_none());
    }

    #[test]
    fn next_fire_aligns_to_period_boundaries() {
        let s = every_15s();
        assert_eq!(s.next_after(at(10, 0, 1)), at(10, 0, 15));
        assert_eq!(s.next_after(at(10, 0, 44)), at(10, 0, 45));
        assert_eq!(s.next_after(at(10, 0, 50)), at(10, 1, 0));
    }

    #[test]
    fn next_fire_is_strictly_after_a_boundary() {
        let s = every_15s();
        assert_eq!(s.next_after(at(10, 0, 30)), at(10, 0, 45));
    }

    #[test]
    fn late_fire_is_past_due() {
        let s = every_15s();
        let on_time = ScheduleInfo::new(&s, at(10, 0, 15), at(10, 0, 15));
        assert!(!on_time.is_past_due);
        assert_eq!(on_time.next_fire, at(10, 0, 30));

        let late = ScheduleInfo::new(&s, at(10, 0, 15), at(10, 0, 31));
        assert!(late.is_past_due);
        assert_eq!(late.next_fire, at(10, 0, 45));
    }

    #[tokio::test(start_paused = true)]
    async fn timer_stops_on_shutdown() {
        let clock = Arc::new(ManualClock::new(at(10, 0, 5)));
        let (tx, rx) = watch::channel(false);

        let handle = spawn_timer(every_15s(), clock.clone(), rx);
        tokio::time::sleep(Duration::from_secs(31)).await;
        clock.advance(TimeDelta::seconds(31));

        tx.send(true).expect("timer still listening");
        handle.await.expect("timer task exits cleanly");
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_wall_clock_fires_each_slot_once() {
        // Wall clock stuck just before the 10:00:15 boundary.
        let start = at(10, 0, 14) + TimeDelta::milliseconds(999);
        let clock = Arc::new(ManualClock::new(start));
        let (tx, rx) = watch::channel(false);

        let fired: Arc<std::sync::Mutex<Vec<DateTime<Utc>>>> = Arc::default();
        let log = fired.clone();
        let handle = tokio::spawn(run_timer(every_15s(), clock, rx, move |info| {
            log.lock().expect("fire log lock").push(info.scheduled_for);
        }));

        tokio::time::sleep(Duration::from_secs(20)).await;
        tx.send(true).expect("timer still listening");
        handle.await.expect("timer task exits cleanly");

        let fired = fired.lock().expect("fire log lock").clone();
        assert_eq!(fired, vec![at(10, 0, 15), at(10, 0, 30)]);
    }
}
