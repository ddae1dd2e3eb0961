//! Running actuation-error statistics.
//!
//! Every field is an atomic so the timer-expiry context can record a result
//! without locks; the normal context only reads snapshots.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

/// An actuation error at or below this is counted as within tolerance (ms).
pub const TOLERANCE_MS: u64 = 5;

#[derive(Debug)]
pub struct RunningStats {
    total_commands: AtomicU32,
    within_tolerance: AtomicU32,
    total_error_ms: AtomicU64,
    max_error_ms: AtomicU64,
    min_error_ms: AtomicU64,
    stale_expiries: AtomicU32,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningStats {
    pub const fn new() -> Self {
        Self {
            total_commands: AtomicU32::new(0),
            within_tolerance: AtomicU32::new(0),
            total_error_ms: AtomicU64::new(0),
            max_error_ms: AtomicU64::new(0),
            min_error_ms: AtomicU64::new(u64::MAX),
            stale_expiries: AtomicU32::new(0),
        }
    }

    /// Record one absolute actuation error. Safe from the expiry context.
    #[inline]
    pub fn record(&self, error_abs_ms: u64) {
        self.total_error_ms
            .fetch_add(error_abs_ms, Ordering::Relaxed);
        if error_abs_ms <= TOLERANCE_MS {
            self.within_tolerance.fetch_add(1, Ordering::Relaxed);
        }
        self.max_error_ms.fetch_max(error_abs_ms, Ordering::Relaxed);
        self.min_error_ms.fetch_min(error_abs_ms, Ordering::Relaxed);
        // Count last: a snapshot never sees more commands than errors summed.
        self.total_commands.fetch_add(1, Ordering::Release);
    }

    /// A timer fired for an actuation that had already been superseded.
    #[inline]
    pub fn note_stale_expiry(&self) {
        self.stale_expiries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total_commands = self.total_commands.load(Ordering::Acquire);
        let min = self.min_error_ms.load(Ordering::Relaxed);
        StatsSnapshot {
            total_commands,
            commands_within_tolerance: self.within_tolerance.load(Ordering::Relaxed),
            total_error_ms: self.total_error_ms.load(Ordering::Relaxed),
            max_error_ms: self.max_error_ms.load(Ordering::Relaxed),
            min_error_ms: (total_commands > 0 && min != u64::MAX).then_some(min),
            stale_expiries: self.stale_expiries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`RunningStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub total_commands: u32,
    pub commands_within_tolerance: u32,
    pub total_error_ms: u64,
    pub max_error_ms: u64,
    /// `None` until the first error is recorded.
    pub min_error_ms: Option<u64>,
    pub stale_expiries: u32,
}

impl StatsSnapshot {
    pub fn mean_error_ms(&self) -> Option<f64> {
        (self.total_commands > 0)
            .then(|| self.total_error_ms as f64 / f64::from(self.total_commands))
    }

    pub fn within_tolerance_pct(&self) -> f64 {
        if self.total_commands == 0 {
            0.0
        } else {
            100.0 * f64::from(self.commands_within_tolerance) / f64::from(self.total_commands)
        }
    }
}

/// Emits the running-stats log line at a fixed interval.
#[derive(Debug, Clone)]
pub struct StatsReporter {
    interval_ms: u64,
    last_report_ms: Option<i64>,
}

impl StatsReporter {
    /// `interval_ms == 0` disables reporting.
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_report_ms: None,
        }
    }

    /// Returns true when a report line was written.
    pub fn poll(&mut self, now_ms: i64, stats: &RunningStats, session_active: bool) -> bool {
        if self.interval_ms == 0 {
            return false;
        }
        let Some(last) = self.last_report_ms else {
            self.last_report_ms = Some(now_ms);
            return false;
        };
        if now_ms.saturating_sub(last) < i64::try_from(self.interval_ms).unwrap_or(i64::MAX) {
            return false;
        }
        self.last_report_ms = Some(now_ms);
        if !session_active {
            return false;
        }
        let snap = stats.snapshot();
        tracing::info!(
            total = snap.total_commands,
            within_tolerance = snap.commands_within_tolerance,
            within_pct = snap.within_tolerance_pct(),
            avg_error_ms = snap.mean_error_ms().unwrap_or(0.0),
            max_error_ms = snap.max_error_ms,
            stale_expiries = snap.stale_expiries,
            "actuation stats"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_no_min_or_mean() {
        let stats = RunningStats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.total_commands, 0);
        assert_eq!(snap.min_error_ms, None);
        assert_eq!(snap.mean_error_ms(), None);
        assert_eq!(snap.within_tolerance_pct(), 0.0);
    }

    #[test]
    fn tolerance_boundary_is_inclusive() {
        let stats = RunningStats::new();
        stats.record(5);
        stats.record(6);
        let snap = stats.snapshot();
        assert_eq!(snap.commands_within_tolerance, 1);
        assert_eq!(snap.max_error_ms, 6);
        assert_eq!(snap.min_error_ms, Some(5));
        assert_eq!(snap.within_tolerance_pct(), 50.0);
    }

    #[test]
    fn reporter_waits_one_interval_and_needs_a_session() {
        let stats = RunningStats::new();
        let mut r = StatsReporter::new(5_000);
        assert!(!r.poll(0, &stats, true));
        assert!(!r.poll(4_999, &stats, true));
        assert!(r.poll(5_000, &stats, true));
        assert!(!r.poll(10_000, &stats, false));
        assert!(r.poll(15_000, &stats, true));
    }

    #[test]
    fn reporter_disabled_by_zero_interval() {
        let stats = RunningStats::new();
        let mut r = StatsReporter::new(0);
        assert!(!r.poll(0, &stats, true));
        assert!(!r.poll(1_000_000, &stats, true));
    }
}
