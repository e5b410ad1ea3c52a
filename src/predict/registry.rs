//! Model registry: a `;`-delimited table describing every trained model.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::Error;
use super::backend::BackendKind;

pub const REQUIRED_COLUMNS: [&str; 4] = ["model_path", "model_name", "ML_algorithm", "property"];
/// Metric columns rounded for display when numeric.
pub const METRIC_COLUMNS: [&str; 4] = ["RMSE", "MAE", "R2", "PEARSON"];

/// `<tag>_models_info.csv`.
pub fn registry_file_name(tag: &str) -> String {
    format!("{tag}_models_info.csv")
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    /// Artifact path, resolved against the registry's directory.
    pub model_path: PathBuf,
    pub model_name: String,
    pub algorithm: String,
    pub property: String,
    /// Every other column as `(name, raw value)`, in file order.
    pub extra: Vec<(String, String)>,
}

impl RegistryEntry {
    pub fn kind(&self) -> Option<BackendKind> {
        self.algorithm.parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    pub path: PathBuf,
    pub entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let csv_err = |e| crate::io::Error::csv(path, e);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(csv_err)?;
        let header = reader.headers().map_err(csv_err)?.clone();

        let mut positions = [0usize; 4];
        for (slot, column) in positions.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = header
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| Error::MissingColumn {
                    path: path.to_path_buf(),
                    column: column.to_string(),
                })?;
        }
        let base = path.parent().unwrap_or_else(|| Path::new(""));

        let mut entries = Vec::new();
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            let field = |i: usize| record.get(positions[i]).unwrap_or_default().to_string();
            let extra = header
                .iter()
                .enumerate()
                .filter(|(i, _)| !positions.contains(i))
                .map(|(i, name)| (name.to_string(), record.get(i).unwrap_or_default().to_string()))
                .collect();
            entries.push(RegistryEntry {
                model_path: base.join(field(0)),
                model_name: field(1),
                algorithm: field(2),
                property: field(3),
                extra,
            });
        }
        debug!(path = %path.display(), models = entries.len(), "model registry loaded");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Distinct properties in order of first appearance.
    pub fn properties(&self) -> Vec<String> {
        let mut seen: Vec<String> = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.property) {
                seen.push(entry.property.clone());
            }
        }
        seen
    }

    pub fn for_property<'a>(&'a self, property: &'a str) -> impl Iterator<Item = &'a RegistryEntry> + 'a {
        self.entries.iter().filter(move |e| e.property == property)
    }

    /// The registry as a display table without `model_path`, metrics rounded to 4 decimals.
    pub fn display_table(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let mut header: Vec<String> = REQUIRED_COLUMNS[1..].iter().map(|c| c.to_string()).collect();
        if let Some(first) = self.entries.first() {
            header.extend(first.extra.iter().map(|(name, _)| name.clone()));
        }
        let rows = self
            .entries
            .iter()
            .map(|e| {
                let mut row = vec![e.model_name.clone(), e.algorithm.clone(), e.property.clone()];
                row.extend(e.extra.iter().map(|(name, value)| display_metric(name, value)));
                row
            })
            .collect();
        (header, rows)
    }
}

fn display_metric(name: &str, value: &str) -> String {
    if METRIC_COLUMNS.contains(&name) {
        if let Ok(v) = value.parse::<f64>() {
            return format!("{:.4}", v);
        }
    }
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TABLE: &str = "\
model_path;model_name;ML_algorithm;property;RMSE;R2;dataset
svr_a.json;SVR_logD_2.6;SVR;logD_pH_2.6;0.512345;0.9;train_a
xgb_a.json;XGB_logD_2.6;xgb;logD_pH_2.6;0.4;n/a;train_a
svr_b.json;SVR_logD_7.4;SVR;logD_pH_7.4;0.3;0.8;train_b
";

    #[test]
    fn loads_entries_with_resolved_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(registry_file_name("1H"));
        fs::write(&path, TABLE).unwrap();
        let registry = Registry::load(&path).unwrap();
        assert_eq!(registry.entries.len(), 3);
        assert_eq!(registry.entries[0].model_path, dir.path().join("svr_a.json"));
        assert_eq!(registry.entries[1].kind(), Some(BackendKind::Xgb));
        assert_eq!(registry.properties(), vec!["logD_pH_2.6", "logD_pH_7.4"]);
        assert_eq!(registry.for_property("logD_pH_2.6").count(), 2);
    }

    #[test]
    fn display_table_drops_paths_and_rounds_metrics() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.csv");
        fs::write(&path, TABLE).unwrap();
        let (header, rows) = Registry::load(&path).unwrap().display_table();
        assert_eq!(header, vec!["model_name", "ML_algorithm", "property", "RMSE", "R2", "dataset"]);
        assert_eq!(rows[0][3], "0.5123");
        assert_eq!(rows[1][4], "n/a");
        assert_eq!(rows[2][5], "train_b");
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.csv");
        fs::write(&path, "model_path;model_name;property\na;b;c\n").unwrap();
        let err = Registry::load(&path).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { ref column, .. } if column == "ML_algorithm"));
    }
}
