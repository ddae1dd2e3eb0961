//! `From` implementations bridging `tempo_config` types to `tempo_core` types.

use crate::config::{DispatchCfg, MonitorCfg};
use crate::edge::EdgeThresholds;

// ── DispatchCfg ──────────────────────────────────────────────────────────────

impl From<&tempo_config::Config> for DispatchCfg {
    fn from(c: &tempo_config::Config) -> Self {
        Self {
            tolerance_ms: c.periodic.tolerance_ms,
            report_interval_ms: c.stats.report_interval_ms,
        }
    }
}

// ── EdgeThresholds ───────────────────────────────────────────────────────────

impl From<&tempo_config::Audio> for EdgeThresholds {
    fn from(a: &tempo_config::Audio) -> Self {
        Self {
            high: a.high_threshold,
            low: a.low_threshold,
            debounce_ms: a.debounce_ms,
        }
    }
}

// ── MonitorCfg ───────────────────────────────────────────────────────────────

impl From<&tempo_config::Config> for MonitorCfg {
    fn from(c: &tempo_config::Config) -> Self {
        Self {
            enabled: c.audio.enabled,
            expected_count: c.audio.expected_count,
            period_ms: c.audio.period_ms,
            tolerance_ms: c.periodic.tolerance_ms,
            thresholds: EdgeThresholds::from(&c.audio),
            poll_ms: c.audio.poll_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
[pins]
actuator = 18
indicator = 23

[periodic]
tolerance_ms = 7

[audio]
enabled = true
high_threshold = 3000
low_threshold = 900
debounce_ms = 40
"#;

    #[test]
    fn maps_sections_into_runtime_config() {
        let cfg = tempo_config::load_toml(TOML).unwrap();
        let d = DispatchCfg::from(&cfg);
        assert_eq!(d.tolerance_ms, 7);
        assert_eq!(d.report_interval_ms, 5_000);

        let m = MonitorCfg::from(&cfg);
        assert!(m.enabled);
        assert_eq!(m.tolerance_ms, 7);
        assert_eq!(
            m.thresholds,
            EdgeThresholds {
                high: 3000,
                low: 900,
                debounce_ms: 40
            }
        );
        assert_eq!(m.period_ms, 1_000);
    }
}
