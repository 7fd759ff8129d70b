//! Time source abstraction
//!
//! The query orchestrator needs "now" twice per query: to clamp ranges that
//! reach into the future and to compute the leading-edge cutoff. Injecting a
//! [`Clock`] keeps both deterministic under test.

use parking_lot::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current wall-clock time
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> SystemTime;

    /// Current time in nanoseconds since the Unix epoch
    ///
    /// Times before the epoch are reported as negative values.
    fn now_nanos(&self) -> i64 {
        system_time_to_nanos(self.now())
    }
}

/// Convert a [`SystemTime`] to signed nanoseconds since the Unix epoch
pub fn system_time_to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(e) => -(e.duration().as_nanos() as i64),
    }
}

/// Convert signed nanoseconds since the Unix epoch to a [`SystemTime`]
pub fn nanos_to_system_time(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos as u64)
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}

/// Clock backed by the operating system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually driven clock for tests
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<SystemTime>,
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        *self.now.read()
    }
}

impl MockClock {
    /// Create a clock frozen at `time`
    pub fn with_time(time: SystemTime) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    /// Create a clock frozen at `nanos` since the Unix epoch
    pub fn with_nanos(nanos: i64) -> Self {
        Self::with_time(nanos_to_system_time(nanos))
    }

    /// Create a clock frozen at the current system time
    pub fn new() -> Self {
        Self::with_time(SystemTime::now())
    }

    /// Move the clock forward
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.write();
        *now += duration;
    }

    /// Replace the clock's time
    pub fn set_time(&self, time: SystemTime) {
        *self.now.write() = time;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::with_nanos(1_000);
        clock.advance(Duration::from_nanos(500));
        assert_eq!(clock.now_nanos(), 1_500);

        clock.set_time(nanos_to_system_time(42));
        assert_eq!(clock.now_nanos(), 42);
    }

    #[test]
    fn test_nanos_conversion_handles_pre_epoch() {
        assert_eq!(system_time_to_nanos(nanos_to_system_time(-10)), -10);
        assert_eq!(system_time_to_nanos(UNIX_EPOCH), 0);
    }
}
