use rstest::rstest;
use tempo_core::mocks::ScriptedAnalog;
use tempo_core::{BuildError, EdgeThresholds, MonitorCfg, SignalMonitor};

fn cfg(count: u16, period_ms: u32) -> MonitorCfg {
    MonitorCfg {
        enabled: true,
        expected_count: count,
        period_ms,
        tolerance_ms: 10,
        thresholds: EdgeThresholds {
            high: 3000,
            low: 1000,
            debounce_ms: 30,
        },
        poll_ms: 1,
    }
}

/// Square wave: `high_ms` HIGH at the start of every `period` (1 ms per read).
fn square(periods: &[i64], high_ms: i64) -> (ScriptedAnalog, i64) {
    let mut levels = Vec::new();
    let mut t = 0i64;
    for &p in periods {
        for i in 0..p {
            levels.push(if i < high_ms { 4000 } else { 0 });
            t += 1;
        }
    }
    (ScriptedAnalog::from_levels(levels), t)
}

#[test]
fn rising_edges_feed_the_monitor_series() {
    // edges at 0, 101, 199, 300
    let (input, total) = square(&[101, 98, 101, 100], 20);
    let mut m = SignalMonitor::new(input, &cfg(4, 100)).unwrap();
    let mut edges = Vec::new();
    for t in 0..total {
        if let Some(s) = m.poll(t) {
            edges.push((s.received_at, s.deviation));
        }
    }
    assert_eq!(edges, vec![(0, 0), (101, 1), (199, -1), (300, 0)]);
    assert!(!m.series().is_running());

    let report = m.report();
    assert_eq!(report.signal_count, 4);
    assert_eq!(report.baseline_time_ms, Some(0));
    assert!(report.monitoring_enabled);
    assert_eq!(report.deviations, vec![0, 1, -1, 0]);

    let summary = m.summary();
    assert_eq!(summary.max_abs_deviation_ms, 1);
    assert_eq!(summary.within_tolerance_pct, 100.0);
}

#[test]
fn poll_interval_gates_reads() {
    let input = ScriptedAnalog::from_levels([0, 4000, 4000]);
    let mut c = cfg(10, 100);
    c.poll_ms = 5;
    let mut m = SignalMonitor::new(input, &c).unwrap();
    assert_eq!(m.poll(0), None); // reads 0
    assert_eq!(m.poll(3), None); // too early, no read
    let s = m.poll(5).expect("rising edge on second read");
    assert_eq!(s.received_at, 5);
}

#[test]
fn disabled_monitor_does_not_read() {
    let input = ScriptedAnalog::from_levels([4000]);
    let mut c = cfg(10, 100);
    c.enabled = false;
    let mut m = SignalMonitor::new(input, &c).unwrap();
    assert_eq!(m.poll(0), None);
    assert!(!m.report().monitoring_enabled);

    m.start();
    assert!(m.poll(1).is_some());
    m.stop();
    assert!(!m.is_enabled());
    assert_eq!(m.report().signal_count, 1);
}

#[test]
fn read_failures_are_counted_and_skipped() {
    let input = ScriptedAnalog::new([None, None, Some(4000)]);
    let mut m = SignalMonitor::new(input, &cfg(3, 100)).unwrap();
    assert_eq!(m.poll(0), None);
    assert_eq!(m.poll(1), None);
    assert!(m.poll(2).is_some());
    assert_eq!(m.read_failures(), 2);
}

#[test]
fn restart_discards_previous_series() {
    let (input, total) = square(&[100, 100, 100], 10);
    let mut m = SignalMonitor::new(input, &cfg(10, 100)).unwrap();
    for t in 0..total {
        m.poll(t);
    }
    assert_eq!(m.series().sample_count(), 3);
    m.start();
    assert_eq!(m.series().sample_count(), 0);
    assert!(m.series().is_running());
}

#[rstest]
#[case::inverted(EdgeThresholds { high: 100, low: 200, debounce_ms: 0 }, 100, 1)]
#[case::zero_period(EdgeThresholds { high: 200, low: 100, debounce_ms: 0 }, 0, 1)]
#[case::zero_poll(EdgeThresholds { high: 200, low: 100, debounce_ms: 0 }, 100, 0)]
fn invalid_monitor_config_is_rejected(
    #[case] thresholds: EdgeThresholds,
    #[case] period_ms: u32,
    #[case] poll_ms: u64,
) {
    let c = MonitorCfg {
        thresholds,
        period_ms,
        poll_ms,
        ..MonitorCfg::default()
    };
    let err = SignalMonitor::new(ScriptedAnalog::default(), &c).unwrap_err();
    assert!(matches!(err, BuildError::InvalidConfig(_)));
}

#[test]
fn edges_after_the_series_completes_are_dropped_and_counted() {
    // edges at 0, 100, 200, 300; only the first two fit the series
    let (input, total) = square(&[100, 100, 100, 100], 20);
    let mut m = SignalMonitor::new(input, &cfg(2, 100)).unwrap();
    let mut recorded = 0;
    for t in 0..total {
        if m.poll(t).is_some() {
            recorded += 1;
        }
    }
    assert_eq!(recorded, 2);
    assert_eq!(m.dropped_edges(), 2);
    assert_eq!(m.series().sample_count(), 2);
    assert_eq!(m.report().deviations, vec![0, 0]);
    assert!(m.is_enabled());
}
