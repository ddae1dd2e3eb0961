//! Periodic deviation analysis.
//!
//! Every expected time is computed from the first sample of the series
//! (`baseline + k * period`), never from the previous sample. Jitter on one
//! sample therefore shows up as that sample's deviation only and does not
//! shift the schedule for the samples after it.

use thiserror::Error;

use crate::util::saturate_i16;

/// Fixed sample capacity of one series.
pub const SERIES_CAPACITY: usize = tempo_config::MAX_SERIES_SAMPLES as usize;

/// One accepted sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// 0-based position in the series.
    pub index: usize,
    pub received_at: i64,
    pub deviation: i16,
    /// This sample filled the series and stopped it.
    pub completed: bool,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RecordRejected {
    #[error("series is not running")]
    NotRunning,
    #[error("series capacity of {SERIES_CAPACITY} samples reached")]
    Full,
}

/// One run of a repeated-signal measurement.
#[derive(Debug, Clone)]
pub struct PeriodicSeries {
    running: bool,
    expected_count: usize,
    period_ms: u32,
    tolerance_ms: u32,
    baseline_ms: Option<i64>,
    timestamps: heapless::Vec<i64, SERIES_CAPACITY>,
    deviations: heapless::Vec<i16, SERIES_CAPACITY>,
}

impl PeriodicSeries {
    pub fn new(tolerance_ms: u32) -> Self {
        Self {
            running: false,
            expected_count: 0,
            period_ms: 0,
            tolerance_ms,
            baseline_ms: None,
            timestamps: heapless::Vec::new(),
            deviations: heapless::Vec::new(),
        }
    }

    /// Discard all samples and begin a new series.
    ///
    /// `count` is clamped to [`SERIES_CAPACITY`]. A count of zero leaves the
    /// series reset and stopped.
    pub fn start(&mut self, count: usize, period_ms: u32) {
        self.reset();
        self.expected_count = count.min(SERIES_CAPACITY);
        self.period_ms = period_ms;
        self.running = self.expected_count > 0;
    }

    /// Discard all samples and stop.
    pub fn reset(&mut self) {
        self.running = false;
        self.expected_count = 0;
        self.baseline_ms = None;
        self.timestamps.clear();
        self.deviations.clear();
    }

    pub fn record(&mut self, received_at: i64) -> Result<Sample, RecordRejected> {
        if !self.running {
            return Err(RecordRejected::NotRunning);
        }
        if self.timestamps.is_full() || self.deviations.is_full() {
            return Err(RecordRejected::Full);
        }

        let index = self.timestamps.len();
        let baseline = *self.baseline_ms.get_or_insert(received_at);
        let offset = i64::from(self.period_ms).saturating_mul(index as i64);
        let expected = baseline.saturating_add(offset);
        let deviation = saturate_i16(received_at.saturating_sub(expected));

        self.timestamps
            .push(received_at)
            .map_err(|_| RecordRejected::Full)?;
        if self.deviations.push(deviation).is_err() {
            self.timestamps.pop();
            return Err(RecordRejected::Full);
        }

        let completed = self.timestamps.len() >= self.expected_count;
        if completed {
            self.running = false;
        }
        Ok(Sample {
            index,
            received_at,
            deviation,
            completed,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn sample_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn expected_count(&self) -> usize {
        self.expected_count
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    pub fn tolerance_ms(&self) -> u32 {
        self.tolerance_ms
    }

    pub fn set_tolerance_ms(&mut self, tolerance_ms: u32) {
        self.tolerance_ms = tolerance_ms;
    }

    pub fn baseline_ms(&self) -> Option<i64> {
        self.baseline_ms
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.timestamps
    }

    pub fn deviations(&self) -> &[i16] {
        &self.deviations
    }

    /// Whether a deviation counts as within this series' tolerance.
    #[inline]
    pub fn within_tolerance(&self, deviation: i16) -> bool {
        u32::from(deviation.unsigned_abs()) <= self.tolerance_ms
    }
}
