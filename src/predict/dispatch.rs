//! Fan-out of feature rows to every enabled model and aggregation of the
//! predictions into per-structure statistics.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::Error;
use super::backend::{BackendKind, Model, PredictorSet};
use super::registry::{Registry, RegistryEntry};
use crate::assemble::FeatureMatrix;
use crate::normalize::ID_COLUMN;

/// A backend/property combination (or a single prediction) that produced no value.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedBackend {
    pub property: Option<String>,
    pub backend: Option<BackendKind>,
    pub model_name: Option<String>,
    pub structure: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyPrediction {
    pub property: String,
    /// `(model_name, prediction)` rounded to 2 decimals, in registry order.
    pub models: Vec<(String, f64)>,
    pub average: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructurePrediction {
    pub id: String,
    pub properties: Vec<PropertyPrediction>,
}

impl StructurePrediction {
    pub fn property(&self, name: &str) -> Option<&PropertyPrediction> {
        self.properties.iter().find(|p| p.property == name)
    }
}

#[derive(Debug, Default)]
pub struct DispatchReport {
    pub results_dir: PathBuf,
    pub properties: Vec<String>,
    pub structures: Vec<StructurePrediction>,
    pub skipped: Vec<SkippedBackend>,
    pub result_files: Vec<PathBuf>,
    pub summary: Option<PathBuf>,
}

/// `<id>_<property>.csv`.
pub fn result_file_name(id: &str, property: &str) -> String {
    format!("{id}_{property}.csv")
}

struct LoadedModel<'a> {
    entry: &'a RegistryEntry,
    kind: BackendKind,
    model: Box<dyn Model>,
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Mean and sample standard deviation; the deviation of a single value is 0.
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

/// Predicts every property in `registry` for every row of `matrix` with the
/// models whose backend is in `predictors`, writing one result file per
/// structure and property plus a timestamped summary into `results_dir`.
///
/// Missing registries, unknown or unloadable models, and failed predictions
/// are reported in [`DispatchReport::skipped`]; the run continues.
pub fn dispatch(
    matrix: &FeatureMatrix,
    registry: Option<&Registry>,
    predictors: &PredictorSet,
    results_dir: &Path,
) -> Result<DispatchReport, Error> {
    fs::create_dir_all(results_dir).map_err(|source| Error::OutputDir {
        path: results_dir.to_path_buf(),
        source,
    })?;
    let mut report = DispatchReport {
        results_dir: results_dir.to_path_buf(),
        ..Default::default()
    };

    let Some(registry) = registry else {
        for kind in predictors.kinds() {
            warn!(backend = %kind, "no model registry, backend unavailable");
            report.skipped.push(SkippedBackend {
                property: None,
                backend: Some(kind),
                model_name: None,
                structure: None,
                reason: "no model registry".into(),
            });
        }
        return Ok(report);
    };

    report.properties = registry.properties();
    let models = load_models(registry, predictors, &report.properties, &mut report.skipped);
    let rows = matrix.numeric_rows()?;
    info!(
        structures = rows.len(),
        properties = report.properties.len(),
        models = models.len(),
        "querying models"
    );

    for (id, features) in &rows {
        let mut structure = StructurePrediction {
            id: id.clone(),
            properties: Vec::new(),
        };
        for property in &report.properties {
            let mut predictions = Vec::new();
            for loaded in models.iter().filter(|m| &m.entry.property == property) {
                match loaded.model.predict(features) {
                    Ok(value) => predictions.push((loaded.entry.model_name.clone(), round2(value))),
                    Err(err) => {
                        warn!(id = %id, model = %loaded.entry.model_name, "prediction failed: {err}");
                        report.skipped.push(SkippedBackend {
                            property: Some(property.clone()),
                            backend: Some(loaded.kind),
                            model_name: Some(loaded.entry.model_name.clone()),
                            structure: Some(id.clone()),
                            reason: err.to_string(),
                        });
                    }
                }
            }
            if predictions.is_empty() {
                continue;
            }
            let values: Vec<f64> = predictions.iter().map(|(_, v)| *v).collect();
            let (average, std_dev) = mean_and_std(&values);
            let prediction = PropertyPrediction {
                property: property.clone(),
                models: predictions,
                average: round2(average),
                std_dev: round2(std_dev),
            };
            let path = results_dir.join(result_file_name(id, property));
            write_result_file(&path, id, &prediction)?;
            debug!(id = %id, property = %property, average = prediction.average, "result written");
            report.result_files.push(path);
            structure.properties.push(prediction);
        }
        report.structures.push(structure);
    }

    if !report.properties.is_empty() && !report.structures.is_empty() {
        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        let path = results_dir.join(format!("summary_results_{stamp}.csv"));
        write_summary(&path, &report.properties, &report.structures)?;
        info!(path = %path.display(), "summary written");
        report.summary = Some(path);
    }
    Ok(report)
}

fn load_models<'a>(
    registry: &'a Registry,
    predictors: &PredictorSet,
    properties: &[String],
    skipped: &mut Vec<SkippedBackend>,
) -> Vec<LoadedModel<'a>> {
    let mut loaded = Vec::new();
    for entry in &registry.entries {
        let Some(kind) = entry.kind() else {
            warn!(model = %entry.model_name, "unknown backend '{}'", entry.algorithm);
            skipped.push(SkippedBackend {
                property: Some(entry.property.clone()),
                backend: None,
                model_name: Some(entry.model_name.clone()),
                structure: None,
                reason: format!("unknown backend '{}'", entry.algorithm),
            });
            continue;
        };
        let Some(predictor) = predictors.get(kind) else {
            debug!(model = %entry.model_name, backend = %kind, "backend disabled");
            continue;
        };
        match predictor.load(&entry.model_path) {
            Ok(model) => loaded.push(LoadedModel { entry, kind, model }),
            Err(err) => {
                warn!(model = %entry.model_name, "model unavailable: {err}");
                skipped.push(SkippedBackend {
                    property: Some(entry.property.clone()),
                    backend: Some(kind),
                    model_name: Some(entry.model_name.clone()),
                    structure: None,
                    reason: err.to_string(),
                });
            }
        }
    }

    for property in properties {
        for kind in predictors.kinds() {
            let listed = registry
                .for_property(property)
                .any(|e| e.kind() == Some(kind));
            if !listed {
                warn!(property = %property, backend = %kind, "no registered model");
                skipped.push(SkippedBackend {
                    property: Some(property.clone()),
                    backend: Some(kind),
                    model_name: None,
                    structure: None,
                    reason: "no registered model".into(),
                });
            }
        }
    }
    loaded
}

fn semicolon_writer(path: &Path) -> Result<csv::Writer<fs::File>, Error> {
    csv::WriterBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_path(path)
        .map_err(|e| crate::io::Error::csv(path, e).into())
}

fn write_result_file(path: &Path, id: &str, prediction: &PropertyPrediction) -> Result<(), Error> {
    let csv_err = |e| Error::from(crate::io::Error::csv(path, e));
    let mut writer = semicolon_writer(path)?;
    let mut header = vec![ID_COLUMN.to_string()];
    header.extend(prediction.models.iter().map(|(name, _)| name.clone()));
    header.extend(["Average".to_string(), "StdDev".to_string()]);
    writer.write_record(&header).map_err(csv_err)?;

    let mut row = vec![id.to_string()];
    row.extend(prediction.models.iter().map(|(_, v)| format!("{v:.2}")));
    row.push(format!("{:.2}", prediction.average));
    row.push(format!("{:.2}", prediction.std_dev));
    writer.write_record(&row).map_err(csv_err)?;
    writer
        .flush()
        .map_err(|e| Error::from(crate::io::Error::file(path, e)))
}

fn write_summary(path: &Path, properties: &[String], structures: &[StructurePrediction]) -> Result<(), Error> {
    let csv_err = |e| Error::from(crate::io::Error::csv(path, e));
    let mut writer = semicolon_writer(path)?;

    let mut groups = vec![ID_COLUMN.to_string()];
    let mut stats = vec![String::new()];
    for property in properties {
        groups.extend([property.clone(), property.clone()]);
        stats.extend(["Average".to_string(), "StdDev".to_string()]);
    }
    writer.write_record(&groups).map_err(csv_err)?;
    writer.write_record(&stats).map_err(csv_err)?;

    for structure in structures {
        let mut row = vec![structure.id.clone()];
        for property in properties {
            match structure.property(property) {
                Some(p) => row.extend([format!("{:.2}", p.average), format!("{:.2}", p.std_dev)]),
                None => row.extend([String::new(), String::new()]),
            }
        }
        writer.write_record(&row).map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|e| Error::from(crate::io::Error::file(path, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::MatrixRow;
    use crate::predict::backend::{BackendError, Predictor};
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Returns `scale * sum(features)`, with the scale read from the artifact file.
    struct SumPredictor(BackendKind);

    struct SumModel(f64);

    impl Model for SumModel {
        fn predict(&self, features: &[f64]) -> Result<f64, BackendError> {
            if features.is_empty() {
                return Err(BackendError::FeatureLength { expected: 1, found: 0 });
            }
            Ok(self.0 * features.iter().sum::<f64>())
        }
    }

    impl Predictor for SumPredictor {
        fn kind(&self) -> BackendKind {
            self.0
        }

        fn load(&self, artifact: &Path) -> Result<Box<dyn Model>, BackendError> {
            let text = fs::read_to_string(artifact).map_err(|source| BackendError::Open {
                path: artifact.to_path_buf(),
                source,
            })?;
            let scale = text.trim().parse().map_err(|_| BackendError::Invalid(text.clone()))?;
            Ok(Box::new(SumModel(scale)))
        }
    }

    fn matrix(rows: Vec<(&str, Vec<f64>)>) -> FeatureMatrix {
        FeatureMatrix {
            columns: vec!["FEATURE_1".into(), "FEATURE_2".into()],
            rows: rows
                .into_iter()
                .map(|(id, values)| MatrixRow {
                    id: id.to_string(),
                    values: values.iter().map(|v| v.to_string()).collect(),
                })
                .collect(),
        }
    }

    fn registry(dir: &Path, models: &[(&str, &str, &str, &str)]) -> Registry {
        let mut table = String::from("model_path;model_name;ML_algorithm;property;RMSE\n");
        for (file, name, algo, property) in models {
            table.push_str(&format!("{file};{name};{algo};{property};0.1\n"));
        }
        let path = dir.join("1H_models_info.csv");
        fs::write(&path, table).unwrap();
        Registry::load(&path).unwrap()
    }

    fn predictors(kinds: &[BackendKind]) -> PredictorSet {
        let mut set = PredictorSet::default();
        for kind in kinds {
            set.insert(Box::new(SumPredictor(*kind)));
        }
        set
    }

    #[test]
    fn sample_std_and_single_value() {
        let (mean, std) = mean_and_std(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(mean, 2.5);
        assert!((std - 1.2909944).abs() < 1e-6);
        assert_eq!(mean_and_std(&[7.0]), (7.0, 0.0));
    }

    #[test]
    fn aggregates_predictions_per_property() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();
        fs::write(dir.path().join("b.txt"), "2").unwrap();
        fs::write(dir.path().join("c.txt"), "-1").unwrap();
        let reg = registry(
            dir.path(),
            &[
                ("a.txt", "SVR_A", "SVR", "logD_7.4"),
                ("b.txt", "XGB_A", "XGB", "logD_7.4"),
                ("c.txt", "SVR_B", "SVR", "logD_2.6"),
            ],
        );
        let out = dir.path().join("1H_results");
        let report = dispatch(
            &matrix(vec![("mol_1", vec![1.0, 2.0])]),
            Some(&reg),
            &predictors(&[BackendKind::Svr, BackendKind::Xgb]),
            &out,
        )
        .unwrap();

        assert_eq!(report.properties, vec!["logD_7.4", "logD_2.6"]);
        let mol = &report.structures[0];
        let first = mol.property("logD_7.4").unwrap();
        assert_eq!(first.models, vec![("SVR_A".to_string(), 3.0), ("XGB_A".to_string(), 6.0)]);
        assert_eq!(first.average, 4.5);
        assert_eq!(first.std_dev, 2.12);
        assert_eq!(mol.property("logD_2.6").unwrap().std_dev, 0.0);

        // XGB has no model for logD_2.6
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].backend, Some(BackendKind::Xgb));

        assert_eq!(
            fs::read_to_string(out.join("mol_1_logD_7.4.csv")).unwrap(),
            "MOLECULE_NAME;SVR_A;XGB_A;Average;StdDev\nmol_1;3.00;6.00;4.50;2.12\n"
        );
        let summary = fs::read_to_string(report.summary.unwrap()).unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines[0], "MOLECULE_NAME;logD_7.4;logD_7.4;logD_2.6;logD_2.6");
        assert_eq!(lines[1], ";Average;StdDev;Average;StdDev");
        assert_eq!(lines[2], "mol_1;4.50;2.12;-3.00;0.00");
    }

    #[test]
    fn disabled_backends_are_filtered_out() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();
        fs::write(dir.path().join("b.txt"), "2").unwrap();
        let reg = registry(
            dir.path(),
            &[("a.txt", "SVR_A", "SVR", "p"), ("b.txt", "XGB_A", "XGB", "p")],
        );
        let report = dispatch(
            &matrix(vec![("m", vec![1.0, 1.0])]),
            Some(&reg),
            &predictors(&[BackendKind::Svr]),
            &dir.path().join("out"),
        )
        .unwrap();
        let p = report.structures[0].property("p").unwrap();
        assert_eq!(p.models.len(), 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn unknown_and_broken_models_are_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();
        let reg = registry(
            dir.path(),
            &[
                ("a.txt", "SVR_A", "SVR", "p"),
                ("missing.txt", "DNN_A", "DNN", "p"),
                ("a.txt", "RF_A", "RandomForest", "p"),
            ],
        );
        let report = dispatch(
            &matrix(vec![("m", vec![1.0, 1.0])]),
            Some(&reg),
            &predictors(&[BackendKind::Svr, BackendKind::Dnn]),
            &dir.path().join("out"),
        )
        .unwrap();
        let reasons: HashMap<Option<String>, String> = report
            .skipped
            .iter()
            .map(|s| (s.model_name.clone(), s.reason.clone()))
            .collect();
        assert!(reasons[&Some("RF_A".to_string())].contains("unknown backend"));
        assert!(reasons[&Some("DNN_A".to_string())].contains("missing.txt"));
        assert_eq!(report.structures[0].property("p").unwrap().average, 2.0);
    }

    #[test]
    fn missing_registry_reports_every_backend() {
        let dir = TempDir::new().unwrap();
        let report = dispatch(
            &matrix(vec![("m", vec![1.0, 1.0])]),
            None,
            &predictors(&[BackendKind::Svr, BackendKind::Cnn]),
            &dir.path().join("out"),
        )
        .unwrap();
        assert_eq!(report.skipped.len(), 2);
        assert!(report.structures.is_empty());
        assert!(report.summary.is_none());
    }

    #[test]
    fn per_structure_failures_do_not_stop_other_structures() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "1").unwrap();
        let reg = registry(dir.path(), &[("a.txt", "SVR_A", "SVR", "p")]);
        let mut m = matrix(vec![("ok", vec![1.0, 1.0])]);
        m.rows.push(MatrixRow {
            id: "empty".into(),
            values: Vec::new(),
        });
        let report = dispatch(&m, Some(&reg), &predictors(&[BackendKind::Svr]), &dir.path().join("out")).unwrap();
        assert_eq!(report.structures.len(), 2);
        assert!(report.structures[1].properties.is_empty());
        assert_eq!(report.skipped[0].structure.as_deref(), Some("empty"));
        let summary = fs::read_to_string(report.summary.unwrap()).unwrap();
        assert!(summary.lines().any(|l| l == "empty;;"));
    }
}
