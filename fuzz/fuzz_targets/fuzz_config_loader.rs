#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary TOML must either fail to parse, fail validation, or convert
// cleanly into the runtime configs.
fuzz_target!(|data: &str| {
    let Ok(cfg) = tempo_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_ok() {
        let _ = tempo_core::DispatchCfg::from(&cfg);
        let monitor = tempo_core::MonitorCfg::from(&cfg);
        let _ = tempo_core::EdgeDetector::new(monitor.thresholds)
            .expect("validated thresholds are accepted by the detector");
    }
});
