//! Analog signal monitor: polls an [`AnalogInput`], runs the edge detector
//! and feeds every rising edge into its own periodic series.

use tempo_traits::AnalogInput;
use tracing::{debug, info, warn};

use crate::config::MonitorCfg;
use crate::edge::{Edge, EdgeDetector};
use crate::error::BuildError;
use crate::export::{SeriesSummary, SignalReport, export_summary, query_record};
use crate::periodic::{PeriodicSeries, Sample};

pub struct SignalMonitor<A: AnalogInput> {
    input: A,
    detector: EdgeDetector,
    series: PeriodicSeries,
    expected_count: u16,
    period_ms: u32,
    poll_ms: i64,
    enabled: bool,
    last_poll_ms: Option<i64>,
    read_failures: u64,
    /// Edges seen after the series completed or filled up.
    dropped_edges: u64,
}

impl<A: AnalogInput> core::fmt::Debug for SignalMonitor<A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignalMonitor")
            .field("enabled", &self.enabled)
            .field("samples", &self.series.sample_count())
            .field("is_high", &self.detector.is_high())
            .field("read_failures", &self.read_failures)
            .field("dropped_edges", &self.dropped_edges)
            .finish()
    }
}

impl<A: AnalogInput> SignalMonitor<A> {
    pub fn new(input: A, cfg: &MonitorCfg) -> Result<Self, BuildError> {
        if cfg.period_ms == 0 {
            return Err(BuildError::InvalidConfig("monitor period_ms must be > 0"));
        }
        if cfg.poll_ms == 0 {
            return Err(BuildError::InvalidConfig("monitor poll_ms must be >= 1"));
        }
        let mut monitor = Self {
            input,
            detector: EdgeDetector::new(cfg.thresholds)?,
            series: PeriodicSeries::new(cfg.tolerance_ms),
            expected_count: cfg.expected_count,
            period_ms: cfg.period_ms,
            poll_ms: i64::try_from(cfg.poll_ms).unwrap_or(i64::MAX),
            enabled: false,
            last_poll_ms: None,
            read_failures: 0,
            dropped_edges: 0,
        };
        if cfg.enabled {
            monitor.start();
        }
        Ok(monitor)
    }

    /// Enable monitoring and begin a fresh series.
    pub fn start(&mut self) {
        self.series
            .start(usize::from(self.expected_count), self.period_ms);
        self.enabled = true;
        info!(
            count = self.series.expected_count(),
            period_ms = self.period_ms,
            "signal monitoring started"
        );
    }

    /// Stop polling; collected samples are kept for reporting.
    pub fn stop(&mut self) {
        if self.enabled {
            info!(samples = self.series.sample_count(), "signal monitoring stopped");
        }
        self.enabled = false;
    }

    /// One bounded poll step. Reads the input at most once per `poll_ms` and
    /// returns the sample recorded for a rising edge, if any.
    pub fn poll(&mut self, now_ms: i64) -> Option<Sample> {
        if !self.enabled {
            return None;
        }
        if let Some(last) = self.last_poll_ms
            && now_ms.saturating_sub(last) < self.poll_ms
        {
            return None;
        }
        self.last_poll_ms = Some(now_ms);

        let level = match self.input.read_level() {
            Ok(level) => level,
            Err(e) => {
                self.read_failures += 1;
                // one line per burst of failures
                if self.read_failures.is_power_of_two() {
                    warn!(error = %e, failures = self.read_failures, "analog read failed");
                }
                return None;
            }
        };

        match self.detector.sample(level, now_ms)? {
            Edge::Falling => None,
            Edge::Rising => self.record_edge(now_ms),
        }
    }

    fn record_edge(&mut self, now_ms: i64) -> Option<Sample> {
        match self.series.record(now_ms) {
            Ok(sample) => {
                debug!(
                    index = sample.index,
                    deviation_ms = sample.deviation,
                    "signal edge"
                );
                if sample.completed {
                    let s = export_summary(&self.series);
                    info!(
                        samples = s.sample_count,
                        avg_deviation_ms = s.average_deviation_ms,
                        max_abs_deviation_ms = s.max_abs_deviation_ms,
                        within_pct = s.within_tolerance_pct,
                        "monitored series complete"
                    );
                }
                Some(sample)
            }
            Err(e) => {
                self.dropped_edges += 1;
                warn!(
                    error = %e,
                    at_ms = now_ms,
                    dropped = self.dropped_edges,
                    "signal edge dropped"
                );
                None
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn read_failures(&self) -> u64 {
        self.read_failures
    }

    pub fn dropped_edges(&self) -> u64 {
        self.dropped_edges
    }

    pub fn series(&self) -> &PeriodicSeries {
        &self.series
    }

    /// Read-only record for the external query layer.
    pub fn report(&self) -> SignalReport {
        query_record(&self.series, self.enabled)
    }

    pub fn summary(&self) -> SeriesSummary {
        export_summary(&self.series)
    }
}
