use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Millisecond clock shared by the dispatcher, the actuation engine and the
/// timer-expiry context.
///
/// - now_ms(): absolute milliseconds; never goes backwards
/// - delay(): bounded busy delay used for pulse widths and the sync turnaround
pub trait Clock {
    fn now_ms(&self) -> i64;
    fn delay(&self, d: Duration);

    /// Milliseconds elapsed since `epoch_ms`, saturating at 0.
    fn ms_since(&self, epoch_ms: i64) -> u64 {
        let elapsed = self.now_ms().saturating_sub(epoch_ms);
        u64::try_from(elapsed).unwrap_or(0)
    }
}

/// Delays shorter than this are spun instead of handed to the scheduler.
const SPIN_THRESHOLD: Duration = Duration::from_millis(2);

/// Real clock: wall time captured once at construction, advanced by
/// `std::time::Instant` so it stays monotonic after NTP/RTC steps.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
    origin_ms: i64,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        let wall_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self::with_origin_ms(wall_ms)
    }

    /// Start counting from an explicit absolute time.
    pub fn with_origin_ms(origin_ms: i64) -> Self {
        Self {
            origin: Instant::now(),
            origin_ms,
        }
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> i64 {
        let elapsed = self.origin.elapsed().as_millis();
        self.origin_ms
            .saturating_add(i64::try_from(elapsed).unwrap_or(i64::MAX))
    }

    fn delay(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        if d >= SPIN_THRESHOLD {
            std::thread::sleep(d);
            return;
        }
        let start = Instant::now();
        while start.elapsed() < d {
            std::hint::spin_loop();
        }
    }
}

/// Deterministic clock whose time only moves when told to.
///
/// Time is kept in microseconds so sub-millisecond delays accumulate the way
/// they would on hardware. Clones share the same time source, which lets a
/// test hand one copy to a timer thread and keep another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at_ms(ms: i64) -> Self {
        let clock = Self::new();
        clock.set_ms(ms);
        clock
    }

    /// Advance the clock by the given number of milliseconds.
    pub fn advance_ms(&self, ms: i64) {
        self.micros
            .fetch_add(ms.saturating_mul(1_000), Ordering::AcqRel);
    }

    /// Advance the clock by an arbitrary duration.
    pub fn advance(&self, d: Duration) {
        let us = i64::try_from(d.as_micros()).unwrap_or(i64::MAX);
        self.micros.fetch_add(us, Ordering::AcqRel);
    }

    /// Set the absolute time in milliseconds.
    pub fn set_ms(&self, ms: i64) {
        self.micros.store(ms.saturating_mul(1_000), Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.micros.load(Ordering::Acquire).div_euclid(1_000)
    }

    fn delay(&self, d: Duration) {
        self.advance(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_accumulates_sub_millisecond_delays() {
        let clock = ManualClock::starting_at_ms(10);
        for _ in 0..9 {
            clock.delay(Duration::from_micros(100));
        }
        assert_eq!(clock.now_ms(), 10);
        clock.delay(Duration::from_micros(100));
        assert_eq!(clock.now_ms(), 11);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let a = ManualClock::new();
        let b = a.clone();
        a.advance_ms(42);
        assert_eq!(b.now_ms(), 42);
        assert_eq!(b.ms_since(40), 2);
        assert_eq!(b.ms_since(100), 0);
    }

    #[test]
    fn monotonic_clock_starts_at_origin() {
        let clock = MonotonicClock::with_origin_ms(1_000);
        let t = clock.now_ms();
        assert!(t >= 1_000);
        clock.delay(Duration::from_micros(200));
        assert!(clock.now_ms() >= t);
    }
}
