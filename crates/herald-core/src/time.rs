//! Clock abstraction for testable timing.
//!
//! Every component that reads wall-clock time or pauses between sends takes
//! a clock so tests can control due-ness checks and rate-limit delays
//! deterministically.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};

/// Time source injected into the worker, scheduler, and queue.
///
/// Production code uses [`RealClock`]; tests inject [`TestClock`] to advance
/// time without waiting.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Pauses for the given duration.
    ///
    /// In production this maps to `tokio::time::sleep`; in tests it advances
    /// virtual time immediately.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Production clock backed by system time and tokio sleep.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Controllable clock for deterministic tests.
///
/// Sleeping advances virtual time instead of waiting, so rate-limited send
/// loops run at full speed under test.
#[derive(Debug, Clone)]
pub struct TestClock {
    /// Milliseconds since UNIX_EPOCH.
    epoch_ms: Arc<AtomicI64>,
}

impl TestClock {
    /// Creates a test clock starting at the current system time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Creates a test clock starting at a specific time.
    pub fn at(start: DateTime<Utc>) -> Self {
        Self {
            epoch_ms: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        let ms = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.epoch_ms.fetch_add(ms, Ordering::AcqRel);
    }

    /// Jumps the clock to a specific time. Backwards jumps are allowed.
    pub fn jump_to(&self, time: DateTime<Utc>) {
        self.epoch_ms.store(time.timestamp_millis(), Ordering::Release);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.epoch_ms.load(Ordering::Acquire);
        match Utc.timestamp_millis_opt(ms) {
            chrono::LocalResult::Single(t) => t,
            _ => DateTime::<Utc>::MIN_UTC,
        }
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_time_forward() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let clock = TestClock::at(start);

        clock.advance(Duration::from_secs(90));

        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
    }

    #[test]
    fn jump_allows_backwards_travel() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let earlier = start - chrono::Duration::days(1);
        let clock = TestClock::at(start);

        clock.jump_to(earlier);

        assert_eq!(clock.now(), earlier);
    }

    #[tokio::test]
    async fn sleep_advances_without_waiting() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let clock = TestClock::at(start);

        clock.sleep(Duration::from_secs(3600)).await;

        assert_eq!(clock.now(), start + chrono::Duration::hours(1));
    }
}
