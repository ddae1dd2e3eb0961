//! CSV export of a completed periodic series.

use std::path::Path;

use tempo_core::PeriodicSeries;

pub const HEADER: [&str; 4] = ["sequence", "timestamp_ms", "deviation_ms", "within_tolerance"];

/// Write one row per sample, replacing any previous file. Returns the row count.
pub fn write_series_csv(path: &Path, series: &PeriodicSeries) -> eyre::Result<usize> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(HEADER)?;
    let rows = series.timestamps().iter().zip(series.deviations());
    let mut n = 0usize;
    for (i, (&ts, &dev)) in rows.enumerate() {
        wtr.serialize((i, ts, dev, series.within_tolerance(dev)))?;
        n += 1;
    }
    wtr.flush()?;
    Ok(n)
}
