//! Discretization of predicted shift series into fixed-width histograms.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::io::column;

/// Number of bins in every histogram.
pub const BIN_COUNT: usize = 250;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to prepare histogram directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] crate::io::Error),
}

/// Closed chemical-shift range (ppm) scanned for one nucleus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralWindow {
    pub low: f64,
    pub high: f64,
}

impl SpectralWindow {
    pub const PROTON: SpectralWindow = SpectralWindow {
        low: -1.0,
        high: 14.0,
    };
    pub const CARBON: SpectralWindow = SpectralWindow {
        low: -10.0,
        high: 230.0,
    };

    /// `BIN_COUNT + 1` evenly spaced edges from `low` to `high`.
    pub fn edges(&self) -> Vec<f64> {
        let step = (self.high - self.low) / BIN_COUNT as f64;
        let mut edges: Vec<f64> = (0..BIN_COUNT).map(|i| self.low + step * i as f64).collect();
        edges.push(self.high);
        edges
    }

    /// Bin holding `value`: bins are half-open except the last, which also holds `high`.
    pub fn bin_index(&self, edges: &[f64], value: f64) -> Option<usize> {
        if value.is_nan() || value < self.low || value > self.high {
            return None;
        }
        let upper = edges.partition_point(|&edge| edge <= value);
        Some(upper.saturating_sub(1).min(BIN_COUNT - 1))
    }
}

/// A shift value that was not counted.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectedValue {
    OutOfRange(f64),
    Unparseable(String),
}

impl fmt::Display for RejectedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectedValue::OutOfRange(v) => write!(f, "{v}"),
            RejectedValue::Unparseable(raw) => write!(f, "'{raw}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub counts: Vec<u32>,
    pub rejected: Vec<RejectedValue>,
}

impl Histogram {
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| u64::from(c)).sum()
    }
}

/// Buckets raw tokens; anything unparseable or outside the window is rejected.
pub fn bucket<S: AsRef<str>>(values: &[S], window: SpectralWindow) -> Histogram {
    let edges = window.edges();
    let mut counts = vec![0u32; BIN_COUNT];
    let mut rejected = Vec::new();
    for raw in values {
        let raw = raw.as_ref().trim();
        match raw.parse::<f64>() {
            Ok(value) => match window.bin_index(&edges, value) {
                Some(idx) => counts[idx] += 1,
                None => rejected.push(RejectedValue::OutOfRange(value)),
            },
            Err(_) => rejected.push(RejectedValue::Unparseable(raw.to_string())),
        }
    }
    Histogram { counts, rejected }
}

#[derive(Debug, Clone, Default)]
pub struct BucketReport {
    pub output_dir: PathBuf,
    pub clean: usize,
    /// Files that had at least one rejected value, with those values.
    pub with_errors: Vec<(String, Vec<RejectedValue>)>,
}

impl BucketReport {
    pub fn written(&self) -> usize {
        self.clean + self.with_errors.len()
    }
}

/// Buckets every `*.csv` in `input_dir` into a same-named histogram file in `out_dir`.
pub fn bucket_dir(input_dir: &Path, window: SpectralWindow, out_dir: &Path) -> Result<BucketReport, Error> {
    fs::create_dir_all(out_dir).map_err(|source| Error::OutputDir {
        path: out_dir.to_path_buf(),
        source,
    })?;
    let files = column::list_csv(input_dir)?;
    info!(count = files.len(), low = window.low, high = window.high, "bucketing shift series");

    let mut report = BucketReport {
        output_dir: out_dir.to_path_buf(),
        ..Default::default()
    };
    for path in files {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let values = column::read_first_field(&path)?;
        let histogram = bucket(&values, window);
        column::write_lines(&out_dir.join(&name), &histogram.counts)?;
        debug!(file = %name, counted = histogram.total(), rejected = histogram.rejected.len(), "histogram written");
        if histogram.rejected.is_empty() {
            report.clean += 1;
        } else {
            let listed: Vec<String> = histogram.rejected.iter().map(ToString::to_string).collect();
            warn!(file = %name, "values outside the window: {}", listed.join(", "));
            report.with_errors.push((name, histogram.rejected));
        }
    }
    info!(clean = report.clean, with_errors = report.with_errors.len(), "bucketing finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn window_has_evenly_spaced_edges() {
        let edges = SpectralWindow::PROTON.edges();
        assert_eq!(edges.len(), BIN_COUNT + 1);
        assert_eq!(edges[0], -1.0);
        assert_eq!(edges[BIN_COUNT], 14.0);
        assert!((edges[1] - edges[0] - 0.06).abs() < 1e-12);
    }

    #[test]
    fn upper_bound_lands_in_last_bin() {
        let h = bucket(&["14"], SpectralWindow::PROTON);
        assert_eq!(h.counts[BIN_COUNT - 1], 1);
        assert!(h.rejected.is_empty());
        let h = bucket(&["230.0"], SpectralWindow::CARBON);
        assert_eq!(h.counts[BIN_COUNT - 1], 1);
    }

    #[test]
    fn lower_bound_lands_in_first_bin_and_edges_are_half_open() {
        let window = SpectralWindow::PROTON;
        let edges = window.edges();
        assert_eq!(window.bin_index(&edges, -1.0), Some(0));
        assert_eq!(window.bin_index(&edges, edges[1]), Some(1));
        assert_eq!(window.bin_index(&edges, edges[1] - 1e-9), Some(0));
    }

    #[test]
    fn every_in_window_value_gets_exactly_one_bin() {
        let window = SpectralWindow::CARBON;
        let edges = window.edges();
        let mut v = window.low;
        while v <= window.high {
            let idx = window.bin_index(&edges, v).unwrap();
            assert!(edges[idx] <= v);
            assert!(v < edges[idx + 1] || idx == BIN_COUNT - 1);
            v += 0.37;
        }
        assert_eq!(window.bin_index(&edges, -10.0001), None);
        assert_eq!(window.bin_index(&edges, 230.0001), None);
        assert_eq!(window.bin_index(&edges, f64::NAN), None);
    }

    #[test]
    fn counts_sum_to_values_minus_rejections() {
        let values = ["1.2", "3.4", "-5", "7.0", "abc", "15", "13.99", "0"];
        let h = bucket(&values, SpectralWindow::PROTON);
        assert_eq!(h.total(), 5);
        assert_eq!(
            h.rejected,
            vec![
                RejectedValue::OutOfRange(-5.0),
                RejectedValue::Unparseable("abc".into()),
                RejectedValue::OutOfRange(15.0),
            ]
        );
    }

    #[test]
    fn bucket_dir_isolates_bad_structures() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("shifts");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("a.csv"), "1.0\n2.0\n2.01\n").unwrap();
        fs::write(input.join("b.csv"), "1.0\n99\nNaN?\n").unwrap();
        fs::write(input.join("notes.txt"), "ignored").unwrap();

        let out = dir.path().join("bucketed");
        let report = bucket_dir(&input, SpectralWindow::PROTON, &out).unwrap();
        assert_eq!(report.clean, 1);
        assert_eq!(report.with_errors.len(), 1);
        assert_eq!(report.with_errors[0].0, "b.csv");
        assert_eq!(report.written(), 2);

        for name in ["a.csv", "b.csv"] {
            let lines: Vec<u32> = fs::read_to_string(out.join(name))
                .unwrap()
                .lines()
                .map(|l| l.parse().unwrap())
                .collect();
            assert_eq!(lines.len(), BIN_COUNT);
        }
        let a: u32 = fs::read_to_string(out.join("a.csv"))
            .unwrap()
            .lines()
            .map(|l| l.parse::<u32>().unwrap())
            .sum();
        assert_eq!(a, 3);
        assert!(!out.join("notes.txt").exists());
    }

    #[test]
    fn missing_input_dir_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = bucket_dir(&dir.path().join("absent"), SpectralWindow::PROTON, &dir.path().join("out"));
        assert!(err.unwrap_err().to_string().contains("absent"));
    }
}
