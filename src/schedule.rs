//! Tick Scheduler - minute-aligned, single-fire wakeups
//!
//! Each tick lands a fixed skew past the start of the next minute, so
//! checks from many hosts do not all hit their targets on the exact
//! boundary. A `Tick` fires once; the caller arms the next one.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use log::debug;
use tokio::time::{Instant, Sleep};

/// Seconds past the minute boundary at which ticks fire
pub const DEFAULT_SKEW_SECS: i64 = 2;

/// Compute the next wakeup instant after `now`.
///
/// Truncates `now` to the start of its minute, adds one minute and then
/// `skew`. The result is always strictly after `now` for a non-negative skew.
pub fn next_tick(now: DateTime<Utc>, skew: TimeDelta) -> DateTime<Utc> {
    let minute_start = now.duration_trunc(TimeDelta::minutes(1)).unwrap_or(now);
    minute_start + TimeDelta::minutes(1) + skew
}

/// Source of wall-clock time for the scheduler
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall-clock anchor advanced by tokio's monotonic clock.
///
/// Follows `tokio::time::pause`/`advance`, so paused-time tests can let
/// whole minutes pass instantly.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: DateTime<Utc>,
    origin: Instant,
}

impl TokioClock {
    /// Create a clock that reads `anchor` right now
    pub fn starting_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.anchor + TimeDelta::from_std(self.origin.elapsed()).unwrap_or(TimeDelta::zero())
    }
}

/// Arms minute-aligned ticks against a clock
#[derive(Debug, Clone)]
pub struct TickScheduler<C: Clock = SystemClock> {
    clock: C,
    skew: TimeDelta,
}

impl TickScheduler<SystemClock> {
    /// Scheduler on the system clock with the default skew
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for TickScheduler<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> TickScheduler<C> {
    /// Scheduler on a custom clock with the default skew
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            skew: TimeDelta::seconds(DEFAULT_SKEW_SECS),
        }
    }

    /// Arm a single-fire tick for the next aligned instant
    pub fn arm(&self) -> Tick {
        let now = self.clock.now();
        let at = next_tick(now, self.skew);
        let delay = (at - now).to_std().unwrap_or(Duration::ZERO);
        debug!("Next tick at {} (in {:?})", at, delay);
        Tick {
            at,
            sleep: Box::pin(tokio::time::sleep(delay)),
        }
    }
}

/// A single-fire wakeup; resolves to the instant it was armed for
#[derive(Debug)]
pub struct Tick {
    at: DateTime<Utc>,
    sleep: Pin<Box<Sleep>>,
}

impl Tick {
    /// Instant this tick fires at
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }
}

impl Future for Tick {
    type Output = DateTime<Utc>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match this.sleep.as_mut().poll(cx) {
            Poll::Ready(()) => Poll::Ready(this.at),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn at(h: u32, m: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, h, m, s).unwrap() + TimeDelta::milliseconds(ms as i64)
    }

    fn skew() -> TimeDelta {
        TimeDelta::seconds(DEFAULT_SKEW_SECS)
    }

    #[test]
    fn test_next_tick_half_second_past_minute() {
        assert_eq!(next_tick(at(12, 0, 0, 500), skew()), at(12, 1, 2, 0));
    }

    #[test]
    fn test_next_tick_exactly_on_boundary() {
        assert_eq!(next_tick(at(12, 0, 0, 0), skew()), at(12, 1, 2, 0));
    }

    #[test]
    fn test_next_tick_inside_skew_window_skips_to_next_minute() {
        // 12:00:01 is before 12:00:02, but the current minute is never reused
        assert_eq!(next_tick(at(12, 0, 1, 0), skew()), at(12, 1, 2, 0));
    }

    #[test]
    fn test_next_tick_end_of_minute() {
        assert_eq!(next_tick(at(12, 0, 59, 999), skew()), at(12, 1, 2, 0));
    }

    #[test]
    fn test_next_tick_rolls_over_hour_and_day() {
        assert_eq!(next_tick(at(12, 59, 30, 0), skew()), at(13, 0, 2, 0));
        let late = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 58).unwrap();
        let expected = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 2).unwrap();
        assert_eq!(next_tick(late, skew()), expected);
    }

    #[test]
    fn test_next_tick_is_strictly_later_and_aligned() {
        let start = at(8, 0, 0, 0);
        for step in 0..600 {
            let now = start + TimeDelta::milliseconds(step * 317);
            let next = next_tick(now, skew());
            assert!(next > now, "{} not after {}", next, now);
            assert_eq!(next.second(), 2);
            assert_eq!(next.nanosecond(), 0);
            assert!(next - now <= TimeDelta::seconds(62));
        }
    }

    #[test]
    fn test_next_tick_from_previous_tick_advances_one_minute() {
        let first = next_tick(at(12, 0, 0, 500), skew());
        let second = next_tick(first, skew());
        let third = next_tick(second, skew());
        assert_eq!(second, at(12, 2, 2, 0));
        assert_eq!(third, at(12, 3, 2, 0));
    }

    #[test]
    fn test_next_tick_zero_skew() {
        assert_eq!(next_tick(at(12, 0, 30, 0), TimeDelta::zero()), at(12, 1, 0, 0));
        assert_eq!(next_tick(at(12, 1, 0, 0), TimeDelta::zero()), at(12, 2, 0, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_arms_with_default_skew() {
        let scheduler = TickScheduler::with_clock(TokioClock::starting_at(at(12, 0, 30, 0)));
        assert_eq!(scheduler.arm().at(), at(12, 1, 2, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::starting_at(at(12, 0, 0, 0));
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), at(12, 1, 30, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_armed_tick_fires_at_aligned_instant() {
        let clock = TokioClock::starting_at(at(12, 0, 0, 500));
        let scheduler = TickScheduler::with_clock(clock);

        let tick = scheduler.arm();
        assert_eq!(tick.at(), at(12, 1, 2, 0));

        let fired = tick.await;
        assert_eq!(fired, at(12, 1, 2, 0));
        assert!(clock.now() >= at(12, 1, 2, 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_after_fire_never_repeats_instant() {
        let clock = TokioClock::starting_at(at(12, 0, 0, 500));
        let scheduler = TickScheduler::with_clock(clock);

        let first = scheduler.arm().await;
        let second = scheduler.arm().await;
        assert_eq!(first, at(12, 1, 2, 0));
        assert_eq!(second, at(12, 2, 2, 0));
    }
}
