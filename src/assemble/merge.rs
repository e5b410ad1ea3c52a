use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Error, FeatureMatrix, MatrixRow};
use crate::io::column;

#[derive(Debug, Clone)]
pub struct MergeReport {
    pub path: PathBuf,
    pub rows: usize,
    pub feature_count: usize,
}

/// Transposes every `*.csv` vector in `dir` (sorted by name) into one row keyed
/// by the file stem and writes the table to `output`. Feature columns are
/// labelled `0..k`; every file must hold the same number of values.
pub fn merge(dir: &Path, output: &Path) -> Result<MergeReport, Error> {
    let files = column::list_csv(dir)?;
    if files.is_empty() {
        return Err(Error::Empty {
            dir: dir.to_path_buf(),
        });
    }

    let mut rows = Vec::with_capacity(files.len());
    let mut expected = None;
    for path in files {
        let values = column::read_first_field(&path)?;
        let width = *expected.get_or_insert(values.len());
        if values.len() != width {
            return Err(Error::Ragged {
                file: path,
                expected: width,
                found: values.len(),
            });
        }
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!(id = %id, width, "merged row");
        rows.push(MatrixRow { id, values });
    }

    let feature_count = expected.unwrap_or(0);
    let matrix = FeatureMatrix {
        columns: (0..feature_count).map(|i| i.to_string()).collect(),
        rows,
    };
    matrix.write(output)?;
    info!(rows = matrix.rows.len(), features = feature_count, path = %output.display(), "matrix merged");
    Ok(MergeReport {
        path: output.to_path_buf(),
        rows: matrix.rows.len(),
        feature_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn merges_sorted_files_into_rows() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("bucketed");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("mol_2.csv"), "0\n1\n2\n").unwrap();
        fs::write(input.join("mol_1.csv"), "3\n0\n0\n").unwrap();
        fs::write(input.join("mol_3_error.txt"), "Error").unwrap();

        let out = dir.path().join("merged").join("in_merged.csv");
        let report = merge(&input, &out).unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.feature_count, 3);
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "MOLECULE_NAME,0,1,2\nmol_1,3,0,0\nmol_2,0,1,2\n"
        );
    }

    #[test]
    fn ragged_inputs_fail() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.csv"), "0\n1\n").unwrap();
        fs::write(dir.path().join("b.csv"), "0\n").unwrap();
        let err = merge(dir.path(), &dir.path().join("out").join("m.csv")).unwrap_err();
        assert!(matches!(err, Error::Ragged { expected: 2, found: 1, .. }));
    }

    #[test]
    fn empty_directory_fails() {
        let dir = TempDir::new().unwrap();
        let err = merge(dir.path(), &dir.path().join("m.csv")).unwrap_err();
        assert!(matches!(err, Error::Empty { .. }));
    }
}
