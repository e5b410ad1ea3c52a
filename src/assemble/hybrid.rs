use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{Anomaly, Error, FeatureMatrix, MatrixRow};

/// One side of a hybrid join: a headered matrix and the prefix its columns get.
#[derive(Debug, Clone, Copy)]
pub struct HybridInput<'a> {
    pub path: &'a Path,
    pub prefix: &'a str,
}

#[derive(Debug, Clone)]
pub struct HybridReport {
    pub path: PathBuf,
    pub rows: usize,
    pub feature_count: usize,
    pub anomalies: Vec<Anomaly>,
}

/// Joins two matrices column-wise on structure id.
///
/// Only ids present in both inputs are kept, in the order of `left`; ids
/// found on one side only are reported as [`Anomaly::UnmatchedIds`]. Feature
/// columns are prefixed per side and then renumbered `FEATURE_1..`.
pub fn concatenate(left: HybridInput<'_>, right: HybridInput<'_>, output: &Path) -> Result<HybridReport, Error> {
    let lhs = prefixed(left)?;
    let rhs = prefixed(right)?;

    let right_rows: HashMap<&str, &MatrixRow> = rhs.rows.iter().map(|r| (r.id.as_str(), r)).collect();
    let mut joined = FeatureMatrix {
        columns: lhs.columns.iter().chain(&rhs.columns).cloned().collect(),
        rows: Vec::new(),
    };
    let mut left_only = Vec::new();
    for row in &lhs.rows {
        match right_rows.get(row.id.as_str()) {
            Some(other) => joined.rows.push(MatrixRow {
                id: row.id.clone(),
                values: row.values.iter().chain(&other.values).cloned().collect(),
            }),
            None => left_only.push(row.id.clone()),
        }
    }
    let right_only: Vec<String> = rhs
        .ids()
        .filter(|id| lhs.row(id).is_none())
        .map(str::to_string)
        .collect();

    if joined.rows.is_empty() {
        return Err(Error::NoCommonIds {
            left: left.path.to_path_buf(),
            right: right.path.to_path_buf(),
        });
    }

    let mut anomalies = Vec::new();
    for (side, ids) in [(left.prefix, left_only), (right.prefix, right_only)] {
        if !ids.is_empty() {
            anomalies.push(Anomaly::UnmatchedIds {
                side: side.trim_end_matches('_').to_string(),
                ids,
            });
        }
    }
    for anomaly in &anomalies {
        warn!("{anomaly}");
    }

    joined.renumber();
    joined.write(output)?;
    info!(rows = joined.rows.len(), features = joined.feature_count(), path = %output.display(), "hybrid matrix written");
    Ok(HybridReport {
        path: output.to_path_buf(),
        rows: joined.rows.len(),
        feature_count: joined.feature_count(),
        anomalies,
    })
}

fn prefixed(input: HybridInput<'_>) -> Result<FeatureMatrix, Error> {
    let mut matrix = FeatureMatrix::read(input.path)?;
    for column in &mut matrix.columns {
        *column = format!("{}{column}", input.prefix);
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn joins_on_id_and_renumbers() {
        let dir = TempDir::new().unwrap();
        let h = write(dir.path(), "h.csv", "MOLECULE_NAME,FEATURE_1,FEATURE_2\na,1,2\nb,3,4\n");
        let c = write(dir.path(), "c.csv", "MOLECULE_NAME,FEATURE_1\nb,9\na,8\n");
        let out = dir.path().join("hybrid").join("hybrid_1H13C.csv");
        let report = concatenate(
            HybridInput { path: &h, prefix: "H_" },
            HybridInput { path: &c, prefix: "C_" },
            &out,
        )
        .unwrap();
        assert!(report.anomalies.is_empty());
        assert_eq!(report.feature_count, 3);
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "MOLECULE_NAME,FEATURE_1,FEATURE_2,FEATURE_3\na,1,2,8\nb,3,4,9\n"
        );
    }

    #[test]
    fn unmatched_ids_are_dropped_and_reported() {
        let dir = TempDir::new().unwrap();
        let h = write(dir.path(), "h.csv", "MOLECULE_NAME,FEATURE_1\na,1\nb,2\n");
        let c = write(dir.path(), "c.csv", "MOLECULE_NAME,FEATURE_1\nb,5\nz,6\n");
        let out = dir.path().join("out.csv");
        let report = concatenate(
            HybridInput { path: &h, prefix: "H_" },
            HybridInput { path: &c, prefix: "C_" },
            &out,
        )
        .unwrap();
        assert_eq!(report.rows, 1);
        assert_eq!(
            report.anomalies,
            vec![
                Anomaly::UnmatchedIds {
                    side: "H".into(),
                    ids: vec!["a".into()]
                },
                Anomaly::UnmatchedIds {
                    side: "C".into(),
                    ids: vec!["z".into()]
                },
            ]
        );
    }

    #[test]
    fn disjoint_inputs_fail() {
        let dir = TempDir::new().unwrap();
        let h = write(dir.path(), "h.csv", "MOLECULE_NAME,FEATURE_1\na,1\n");
        let c = write(dir.path(), "c.csv", "MOLECULE_NAME,FEATURE_1\nb,5\n");
        let err = concatenate(
            HybridInput { path: &h, prefix: "H_" },
            HybridInput { path: &c, prefix: "C_" },
            &dir.path().join("out.csv"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::NoCommonIds { .. }));
    }
}
