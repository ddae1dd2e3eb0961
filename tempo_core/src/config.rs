//! Runtime configuration for the dispatcher and the signal monitor.
//!
//! These are separate from the TOML-deserialized config in `tempo_config`;
//! see `conversions` for the mapping.

use crate::edge::EdgeThresholds;

/// Dispatcher-side settings.
#[derive(Debug, Clone)]
pub struct DispatchCfg {
    /// Tolerance of the command-driven periodic series (ms).
    pub tolerance_ms: u32,
    /// Interval of the running-stats log line; 0 disables it.
    pub report_interval_ms: u64,
}

impl Default for DispatchCfg {
    fn default() -> Self {
        Self {
            tolerance_ms: 10,
            report_interval_ms: 5_000,
        }
    }
}

/// Analog signal monitor settings.
#[derive(Debug, Clone)]
pub struct MonitorCfg {
    /// Begin monitoring as soon as the monitor is built.
    pub enabled: bool,
    /// Rising edges in one monitored series.
    pub expected_count: u16,
    /// Nominal period of the sensed signal (ms).
    pub period_ms: u32,
    /// Tolerance used for the monitored series summary (ms).
    pub tolerance_ms: u32,
    pub thresholds: EdgeThresholds,
    /// Minimum spacing between analog reads (ms).
    pub poll_ms: u64,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            expected_count: 100,
            period_ms: 1_000,
            tolerance_ms: 10,
            thresholds: EdgeThresholds {
                high: 2_600,
                low: 1_400,
                debounce_ms: 50,
            },
            poll_ms: 1,
        }
    }
}
