use std::fs;
use std::path::Path;

use super::Error;
use crate::normalize::ID_COLUMN;

/// One structure's feature values, kept as the text they were read as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixRow {
    pub id: String,
    pub values: Vec<String>,
}

/// A table keyed by structure id. `columns` names the feature columns only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<MatrixRow>,
}

/// `FEATURE_1..=FEATURE_k`.
pub fn feature_header(k: usize) -> Vec<String> {
    (1..=k).map(|i| format!("FEATURE_{i}")).collect()
}

impl FeatureMatrix {
    pub fn feature_count(&self) -> usize {
        self.columns.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.id.as_str())
    }

    pub fn row(&self, id: &str) -> Option<&MatrixRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn renumber(&mut self) {
        self.columns = feature_header(self.columns.len());
    }

    /// Reads a headered matrix; rows may be ragged.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| crate::io::Error::csv(path, e))?;
        let header = reader
            .headers()
            .map_err(|e| crate::io::Error::csv(path, e))?
            .clone();
        if header.is_empty() {
            return Err(Error::MissingHeader {
                path: path.to_path_buf(),
            });
        }
        let columns = header.iter().skip(1).map(str::to_string).collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| crate::io::Error::csv(path, e))?;
            let mut fields = record.iter();
            let Some(id) = fields.next() else {
                continue;
            };
            rows.push(MatrixRow {
                id: id.to_string(),
                values: fields.map(str::to_string).collect(),
            });
        }
        Ok(Self { columns, rows })
    }

    /// Writes the matrix with an `MOLECULE_NAME` id column, creating parent directories.
    pub fn write(&self, path: &Path) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| crate::io::Error::file(parent, e))?;
        }
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .map_err(|e| crate::io::Error::csv(path, e))?;
        let header = std::iter::once(ID_COLUMN).chain(self.columns.iter().map(String::as_str));
        writer
            .write_record(header)
            .map_err(|e| crate::io::Error::csv(path, e))?;
        for row in &self.rows {
            let record = std::iter::once(row.id.as_str()).chain(row.values.iter().map(String::as_str));
            writer
                .write_record(record)
                .map_err(|e| crate::io::Error::csv(path, e))?;
        }
        writer
            .flush()
            .map_err(|e| crate::io::Error::file(path, e))?;
        Ok(())
    }

    /// Parses every row's values as numbers.
    pub fn numeric_rows(&self) -> Result<Vec<(String, Vec<f64>)>, Error> {
        self.rows
            .iter()
            .map(|row| {
                let values = row
                    .values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        v.trim().parse::<f64>().map_err(|_| Error::NonNumeric {
                            id: row.id.clone(),
                            column: self.columns.get(i).cloned().unwrap_or_else(|| i.to_string()),
                            value: v.clone(),
                        })
                    })
                    .collect::<Result<Vec<f64>, Error>>()?;
                Ok((row.id.clone(), values))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> FeatureMatrix {
        FeatureMatrix {
            columns: vec!["0".into(), "1".into()],
            rows: vec![
                MatrixRow {
                    id: "a".into(),
                    values: vec!["1".into(), "0".into()],
                },
                MatrixRow {
                    id: "b".into(),
                    values: vec!["2".into(), "5".into()],
                },
            ],
        }
    }

    #[test]
    fn write_then_read_preserves_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("m.csv");
        sample().write(&path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "MOLECULE_NAME,0,1\na,1,0\nb,2,5\n"
        );
        assert_eq!(FeatureMatrix::read(&path).unwrap(), sample());
    }

    #[test]
    fn renumber_uses_one_based_feature_names() {
        let mut m = sample();
        m.renumber();
        assert_eq!(m.columns, vec!["FEATURE_1", "FEATURE_2"]);
    }

    #[test]
    fn numeric_rows_reject_text() {
        let mut m = sample();
        m.rows[1].values[1] = "x".into();
        let err = m.numeric_rows().unwrap_err();
        assert!(matches!(err, Error::NonNumeric { ref id, ref column, .. } if id == "b" && column == "1"));
        assert_eq!(sample().numeric_rows().unwrap()[1].1, vec![2.0, 5.0]);
    }
}
