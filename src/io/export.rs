//! CSV export of a read-only stats snapshot.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::stats::StatsSnapshot;

/// Column header of the per-metric summary.
const SUMMARY_HEADER: &str = "metric,count,sum,mean,min,max";

/// Column header of the histogram bins.
const HISTOGRAM_HEADER: &str = "metric,lower,upper,count";

fn opt(x: Option<f64>) -> String {
    x.map_or_else(String::new, |v| format!("{v:.6}"))
}

/// Exports one summary row per metric to a CSV file at the given path.
///
/// Metrics appear in name order; output is deterministic for identical
/// input.
///
/// # Arguments
///
/// * `snapshot` - Stats of one or more runs
/// * `path` - Output file path
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_stats_csv(snapshot: &StatsSnapshot, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_stats_csv(snapshot, io::BufWriter::new(file))
}

/// Writes the per-metric summary as CSV to any writer.
///
/// Empty `mean`, `min` and `max` cells mark metrics without samples.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_stats_csv(snapshot: &StatsSnapshot, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(SUMMARY_HEADER.split(','))?;
    for (name, acc) in &snapshot.metrics {
        wtr.write_record(&[
            name.clone(),
            acc.count().to_string(),
            format!("{:.6}", acc.sum()),
            opt(acc.mean()),
            opt(acc.min()),
            opt(acc.max()),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Exports every histogram bin to a CSV file at the given path.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_histograms_csv(snapshot: &StatsSnapshot, path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    write_histograms_csv(snapshot, io::BufWriter::new(file))
}

/// Writes one row per histogram bin as CSV to any writer.
///
/// Samples outside the edges are not listed.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_histograms_csv(snapshot: &StatsSnapshot, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(HISTOGRAM_HEADER.split(','))?;
    for (name, acc) in &snapshot.metrics {
        let Some(h) = acc.histogram() else { continue };
        for (lower, upper, count) in h.bins() {
            wtr.write_record(&[name.clone(), lower.to_string(), upper.to_string(), count.to_string()])?;
        }
    }
    wtr.flush()?;
    Ok(())
}
