use proptest::prelude::*;
use tempo_core::export::{MAX_EXPORTED_DEVIATIONS, MAX_RESULT_PAYLOAD, decode_binary};
use tempo_core::{
    Edge, EdgeDetector, EdgeThresholds, PeriodicSeries, RunningStats, SERIES_CAPACITY,
    export_binary,
};

prop_compose! {
    // baseline, period and per-sample jitter around the nominal schedule
    fn jittered_series()(
        baseline in -1_000_000i64..1_000_000,
        period in 1u32..2_000,
        jitter in prop::collection::vec(-500i64..500, 1..200),
    ) -> (i64, u32, Vec<i64>) {
        (baseline, period, jitter)
    }
}

proptest! {
    #[test]
    fn deviation_is_anchored_to_the_first_sample((baseline, period, jitter) in jittered_series()) {
        let mut s = PeriodicSeries::new(10);
        s.start(jitter.len(), period);
        // first sample defines the baseline; its jitter is absorbed
        let times: Vec<i64> = jitter
            .iter()
            .enumerate()
            .map(|(i, j)| {
                let j = if i == 0 { 0 } else { *j };
                baseline + i as i64 * i64::from(period) + j
            })
            .collect();
        for &t in &times {
            s.record(t).unwrap();
        }
        prop_assert_eq!(s.deviations()[0], 0);
        for (i, &t) in times.iter().enumerate() {
            let expected = baseline + i as i64 * i64::from(period);
            prop_assert_eq!(i64::from(s.deviations()[i]), t - expected);
        }
        prop_assert!(!s.is_running());
    }

    #[test]
    fn jitter_on_one_sample_does_not_shift_later_ones(
        period in 1u32..1_000,
        n in 3usize..50,
        hit in 1usize..50,
        off in -300i64..300,
    ) {
        let hit = hit % (n - 1) + 1;
        let mut s = PeriodicSeries::new(10);
        s.start(n, period);
        for i in 0..n {
            let t = i as i64 * i64::from(period) + if i == hit { off } else { 0 };
            s.record(t).unwrap();
        }
        for (i, &d) in s.deviations().iter().enumerate() {
            prop_assert_eq!(i64::from(d), if i == hit { off } else { 0 });
        }
    }

    #[test]
    fn binary_export_recovers_capped_prefix(n in 0usize..SERIES_CAPACITY, period in 1u32..100) {
        let mut s = PeriodicSeries::new(10);
        s.start(n, period);
        for i in 0..n as i64 {
            s.record(i * i64::from(period) + (i % 7) - 3).unwrap();
        }
        let bytes = export_binary(&s).unwrap();
        prop_assert!(bytes.len() <= MAX_RESULT_PAYLOAD);
        let decoded = decode_binary(&bytes).unwrap();
        let keep = n.min(MAX_EXPORTED_DEVIATIONS);
        prop_assert_eq!(decoded.len(), keep);
        prop_assert_eq!(decoded.as_slice(), &s.deviations()[..keep]);
    }

    #[test]
    fn stats_bounds_and_mean(errors in prop::collection::vec(0u64..100_000, 1..300)) {
        let stats = RunningStats::new();
        for &e in &errors {
            stats.record(e);
        }
        let snap = stats.snapshot();
        prop_assert_eq!(snap.total_commands as usize, errors.len());
        for &e in &errors {
            prop_assert!(snap.max_error_ms >= e);
            prop_assert!(snap.min_error_ms.unwrap() <= e);
        }
        let sum: u64 = errors.iter().sum();
        prop_assert_eq!(snap.total_error_ms, sum);
        let mean = sum as f64 / errors.len() as f64;
        prop_assert!((snap.mean_error_ms().unwrap() - mean).abs() < 1e-9);
        let within = errors.iter().filter(|&&e| e <= 5).count();
        prop_assert_eq!(snap.commands_within_tolerance as usize, within);
    }

    #[test]
    fn close_transitions_collapse_to_one(debounce in 1u32..500, gap in 0u32..500) {
        prop_assume!(gap < debounce);
        let mut d = EdgeDetector::new(EdgeThresholds { high: 3000, low: 1000, debounce_ms: debounce }).unwrap();
        // an accepted transition first, so the debounce window is armed
        prop_assert_eq!(d.sample(4000, 0), Some(Edge::Rising));
        prop_assert_eq!(d.sample(0, i64::from(debounce)), Some(Edge::Falling));
        let t0 = 2 * i64::from(debounce);
        let first = d.sample(4000, t0);
        let second = d.sample(0, t0 + i64::from(gap));
        prop_assert_eq!(first, Some(Edge::Rising));
        prop_assert_eq!(second, None);
    }

    #[test]
    fn arbitrary_levels_never_panic(levels in prop::collection::vec(any::<u16>(), 0..500)) {
        let mut d = EdgeDetector::new(EdgeThresholds { high: 2600, low: 1400, debounce_ms: 5 }).unwrap();
        let mut last = None;
        for (t, l) in levels.into_iter().enumerate() {
            if let Some(e) = d.sample(l, t as i64) {
                // edges strictly alternate
                prop_assert_ne!(Some(e), last);
                last = Some(e);
            }
        }
    }
}
