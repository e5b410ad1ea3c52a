use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{Anomaly, Error, FeatureMatrix};

#[derive(Debug, Clone)]
pub struct HeaderReport {
    pub path: PathBuf,
    pub rows: usize,
    pub feature_count: usize,
    pub anomalies: Vec<Anomaly>,
}

/// Rewrites the matrix at `input` to `output` with `FEATURE_1..FEATURE_k`
/// feature columns, where `k` is taken from the observed header width.
///
/// A width other than `expected` and rows whose width differs from the
/// header are reported as anomalies; the rows are still written.
pub fn attach_header(input: &Path, expected: Option<usize>, output: &Path) -> Result<HeaderReport, Error> {
    let mut matrix = FeatureMatrix::read(input)?;
    matrix.renumber();
    let observed = matrix.feature_count();

    let mut anomalies = Vec::new();
    if let Some(expected) = expected.filter(|&e| e != observed) {
        anomalies.push(Anomaly::FeatureCount { expected, observed });
    }
    for row in matrix.rows.iter().filter(|r| r.values.len() != observed) {
        anomalies.push(Anomaly::RowWidth {
            id: row.id.clone(),
            expected: observed,
            found: row.values.len(),
        });
    }
    for anomaly in &anomalies {
        warn!(path = %input.display(), "{anomaly}");
    }

    matrix.write(output)?;
    info!(features = observed, path = %output.display(), "header attached");
    Ok(HeaderReport {
        path: output.to_path_buf(),
        rows: matrix.rows.len(),
        feature_count: observed,
        anomalies,
    })
}

/// `<stem>_<tag>_ML_input.csv`, dropping the last `_` suffix of the normalized input's stem.
pub fn ml_input_name(verified_stem: &str, tag: &str) -> String {
    let base = verified_stem
        .rsplit_once('_')
        .map_or(verified_stem, |(head, _)| head);
    format!("{base}_{tag}_ML_input.csv")
}
