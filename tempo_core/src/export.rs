//! Result encoding: the compact binary GET_RESULTS payload, the series
//! summary, and the structured record served to the external query layer.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::{FrameError, TempoError};
use crate::periodic::PeriodicSeries;

/// Largest payload the transport will carry in one notification (bytes).
pub const MAX_RESULT_PAYLOAD: usize = 512;
/// Deviations that fit next to the 2-byte count header.
pub const MAX_EXPORTED_DEVIATIONS: usize = (MAX_RESULT_PAYLOAD - 2) / 2;
/// Entries per array in the external query record.
pub const QUERY_RECORD_LIMIT: usize = 100;

/// Encode `count:u16` followed by `count` little-endian `i16` deviations.
///
/// The element count is capped at [`MAX_EXPORTED_DEVIATIONS`] and the header
/// always equals the number of elements written. An empty series encodes as
/// `[0, 0]`.
pub fn export_binary(series: &PeriodicSeries) -> Result<Vec<u8>, TempoError> {
    let devs = series.deviations();
    let n = devs.len().min(MAX_EXPORTED_DEVIATIONS);
    let len = 2 + n * 2;

    let mut out = Vec::new();
    out.try_reserve_exact(len)
        .map_err(|_| TempoError::Allocation("result buffer"))?;
    out.resize(len, 0);

    LittleEndian::write_u16(&mut out[..2], n as u16);
    LittleEndian::write_i16_into(&devs[..n], &mut out[2..]);
    Ok(out)
}

/// Client-side inverse of [`export_binary`].
pub fn decode_binary(payload: &[u8]) -> Result<Vec<i16>, FrameError> {
    if payload.len() < 2 {
        return Err(FrameError::Truncated {
            expected: 2,
            len: payload.len(),
        });
    }
    let n = usize::from(LittleEndian::read_u16(&payload[..2]));
    let expected = 2 + n * 2;
    if payload.len() < expected {
        return Err(FrameError::Truncated {
            expected,
            len: payload.len(),
        });
    }
    let mut devs = vec![0i16; n];
    LittleEndian::read_i16_into(&payload[2..expected], &mut devs);
    Ok(devs)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub sample_count: usize,
    pub average_deviation_ms: f64,
    pub max_abs_deviation_ms: u16,
    pub within_tolerance_pct: f64,
    pub tolerance_ms: u32,
}

pub fn export_summary(series: &PeriodicSeries) -> SeriesSummary {
    let devs = series.deviations();
    let (sum, max_abs, within) = devs.iter().fold((0i64, 0u16, 0usize), |(s, m, w), &d| {
        (
            s + i64::from(d),
            m.max(d.unsigned_abs()),
            w + usize::from(series.within_tolerance(d)),
        )
    });
    let (average, pct) = if devs.is_empty() {
        (0.0, 0.0)
    } else {
        let n = devs.len() as f64;
        (sum as f64 / n, 100.0 * within as f64 / n)
    };
    SeriesSummary {
        sample_count: devs.len(),
        average_deviation_ms: average,
        max_abs_deviation_ms: max_abs,
        within_tolerance_pct: pct,
        tolerance_ms: series.tolerance_ms(),
    }
}

/// Read-only snapshot of the monitored signal for the network layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalReport {
    pub signal_count: usize,
    pub baseline_time_ms: Option<i64>,
    pub monitoring_enabled: bool,
    pub timestamps: Vec<i64>,
    pub deviations: Vec<i16>,
}

/// Build the query record; arrays hold the first [`QUERY_RECORD_LIMIT`] samples.
pub fn query_record(series: &PeriodicSeries, monitoring_enabled: bool) -> SignalReport {
    let n = series.sample_count().min(QUERY_RECORD_LIMIT);
    SignalReport {
        signal_count: series.sample_count(),
        baseline_time_ms: series.baseline_ms(),
        monitoring_enabled,
        timestamps: series.timestamps()[..n].to_vec(),
        deviations: series.deviations()[..n].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series_with(n: usize) -> PeriodicSeries {
        let mut s = PeriodicSeries::new(10);
        s.start(n, 10);
        for i in 0..n as i64 {
            // alternate -3/+3 around the schedule after the baseline
            let jitter = if i == 0 { 0 } else if i % 2 == 0 { 3 } else { -3 };
            s.record(i * 10 + jitter).unwrap();
        }
        s
    }

    #[test]
    fn empty_series_encodes_two_zero_bytes() {
        let s = PeriodicSeries::new(10);
        assert_eq!(export_binary(&s).unwrap(), vec![0x00, 0x00]);
    }

    #[test]
    fn payload_is_capped_and_header_matches() {
        let s = series_with(400);
        let bytes = export_binary(&s).unwrap();
        assert!(bytes.len() <= MAX_RESULT_PAYLOAD);
        let header = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        assert_eq!(header, MAX_EXPORTED_DEVIATIONS);
        assert_eq!(bytes.len(), 2 + header * 2);
        let decoded = decode_binary(&bytes).unwrap();
        assert_eq!(decoded.as_slice(), &s.deviations()[..MAX_EXPORTED_DEVIATIONS]);
    }

    #[test]
    fn decode_rejects_short_payloads() {
        assert!(decode_binary(&[1]).is_err());
        assert!(decode_binary(&[2, 0, 1, 0]).is_err());
    }

    #[test]
    fn summary_of_known_series() {
        let s = series_with(4); // deviations 0, -3, 3, -3
        let sum = export_summary(&s);
        assert_eq!(sum.sample_count, 4);
        assert_eq!(sum.max_abs_deviation_ms, 3);
        assert!((sum.average_deviation_ms - (-0.75)).abs() < 1e-9);
        assert_eq!(sum.within_tolerance_pct, 100.0);
    }

    #[test]
    fn summary_of_empty_series_is_zeroed() {
        let sum = export_summary(&PeriodicSeries::new(10));
        assert_eq!(sum.sample_count, 0);
        assert_eq!(sum.average_deviation_ms, 0.0);
        assert_eq!(sum.within_tolerance_pct, 0.0);
    }

    #[test]
    fn query_record_caps_arrays_not_count() {
        let s = series_with(150);
        let rec = query_record(&s, true);
        assert_eq!(rec.signal_count, 150);
        assert_eq!(rec.timestamps.len(), QUERY_RECORD_LIMIT);
        assert_eq!(rec.deviations.len(), QUERY_RECORD_LIMIT);
        assert_eq!(rec.baseline_time_ms, Some(0));
        assert!(rec.monitoring_enabled);
    }
}
