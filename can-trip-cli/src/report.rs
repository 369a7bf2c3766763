//! Output generation
//!
//! Writes exported speed events as one CSV file per trip and prints
//! trip summaries.

use anyhow::{Context, Result};
use can_trip_decoder::{CsvRow, ParseReport, Trip};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Per-trip figures used by the summary and the JSON output
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TripSummary {
    pub index: usize,
    pub samples: usize,
    pub duration_ms: u64,
    pub max_speed: f64,
}

impl TripSummary {
    pub fn from_trip(index: usize, trip: &Trip) -> Self {
        Self {
            index,
            samples: trip.len(),
            duration_ms: trip.duration_ms(),
            max_speed: trip.iter().map(|s| s.speed).fold(0.0, f64::max),
        }
    }
}

/// Write each trip's rows to `<dir>/<prefix><index>.csv`, no header row
///
/// Every trip gets a file, empty trips included, so file indices line up
/// with trip indices.
pub fn write_trip_csvs(dir: &Path, prefix: &str, trips: &[Vec<CsvRow>]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {:?}", dir))?;

    let mut written = Vec::with_capacity(trips.len());
    for (index, rows) in trips.iter().enumerate() {
        let path = dir.join(format!("{}{}.csv", prefix, index));
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .with_context(|| format!("Failed to create {:?}", path))?;

        for row in rows {
            writer.write_record(row.to_record())?;
        }
        writer.flush()?;

        log::debug!("Wrote {} rows to {:?}", rows.len(), path);
        written.push(path);
    }

    Ok(written)
}

/// Print a per-trip table for one log file
pub fn print_trip_summary(path: &Path, trips: &[Trip], report: &ParseReport) {
    println!("\n📄 {:?}", path);
    println!("───────────────────────────────────────────────");
    println!(
        "  Lines: {}  Frames: {}  Dispatched: {}  Skipped: {}",
        report.lines_read,
        report.frames_decoded,
        report.frames_dispatched,
        report.errors.len()
    );

    for (index, trip) in trips.iter().enumerate() {
        let summary = TripSummary::from_trip(index, trip);
        println!(
            "  Trip {:>3}: {:>6} samples  {:>10.3} s  max {:>7.2}",
            summary.index,
            summary.samples,
            summary.duration_ms as f64 / 1000.0,
            summary.max_speed
        );
    }
}

/// Print a replayed acceleration series, one line per poll
pub fn print_acceleration(mph: &[f64], kph: &[f64]) {
    println!("  {:>5}  {:>10}  {:>10}", "poll", "Δ mph", "Δ kph");
    for (i, (m, k)) in mph.iter().zip(kph).enumerate() {
        println!("  {:>5}  {:>10.3}  {:>10.3}", i + 1, m, k);
    }
}
