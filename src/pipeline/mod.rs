//! Staged orchestration of one feature-generation run.
//!
//! A run normalizes the input table, produces per-structure features for the
//! selected [`Representation`], assembles them into a headed matrix, and
//! dispatches that matrix to the registered models. Every directory and file
//! the run creates under the work directory is tracked in an
//! [`ArtifactSet`] and removed when the run ends, whether it succeeded or
//! not, unless intermediates are kept.

mod artifacts;
mod config;
mod error;

pub use artifacts::{ArtifactGuard, ArtifactSet, Removal};
pub use config::{LayoutToolConfig, PipelineConfig};
pub use error::Error;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};

use crate::assemble::{
    self, FeatureMatrix, HeaderReport, HybridInput, HybridReport, MergeReport, attach_header, ml_input_name,
};
use crate::bucket::{self, BIN_COUNT, BucketReport};
use crate::embed::{self, EmbedReport, EmbeddingEngine, LayoutTool, OpenBabelTool};
use crate::fingerprint::{self, FingerprintReport};
use crate::model::record::StructureRecord;
use crate::model::representation::{Nucleus, Representation};
use crate::normalize::{self, NormalizeReport};
use crate::predict::{
    self, DispatchReport, JavaShiftPredictor, PredictorSet, Registry, ShiftPredictor,
};
use crate::progress::Progress;

const GEOMETRY_DIR: &str = "mols";
const FINGERPRINT_DIR: &str = "fp";
const MERGED_DIR: &str = "merged";
const ML_INPUT_DIR: &str = "generated_ML_inputs";
const HYBRID_DIR: &str = "hybrid_generated_ML_querries";
const HYBRID_FILE: &str = "hybrid_1H13C.csv";

/// One step of a run, used to attribute progress and failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Embed,
    Fingerprint,
    PredictShifts(Nucleus),
    Bucket(Nucleus),
    Merge(Representation),
    Header(Representation),
    Hybrid,
    Dispatch,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Normalize => f.write_str("Normalizing input"),
            Stage::Embed => f.write_str("Generating geometries"),
            Stage::Fingerprint => f.write_str("Generating fingerprints"),
            Stage::PredictShifts(nucleus) => write!(f, "Predicting {nucleus} shifts"),
            Stage::Bucket(nucleus) => write!(f, "Bucketing {nucleus} spectra"),
            Stage::Merge(rep) => write!(f, "Merging {rep} features"),
            Stage::Header(rep) => write!(f, "Attaching {rep} header"),
            Stage::Hybrid => f.write_str("Concatenating hybrid matrix"),
            Stage::Dispatch => f.write_str("Running models"),
            Stage::Cleanup => f.write_str("Cleaning up"),
        }
    }
}

/// Receives stage transitions in addition to per-item progress.
pub trait Observer: Progress {
    fn stage_started(&mut self, _stage: &Stage) {}

    /// `details` are short human-readable result lines for the stage.
    fn stage_completed(&mut self, _stage: &Stage, _details: &[String]) {}
}

/// Observer that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoObserver;

impl Progress for NoObserver {}
impl Observer for NoObserver {}

/// Assembly results for one matrix (a spectrum or the fingerprints).
#[derive(Debug, Clone)]
pub struct MatrixSummary {
    pub representation: Representation,
    pub bucketed: Option<BucketReport>,
    pub merged: MergeReport,
    pub headed: HeaderReport,
}

/// Everything a completed run produced and reported.
#[derive(Debug)]
pub struct RunSummary {
    pub representation: Representation,
    pub normalized: NormalizeReport,
    /// Ids dropped because an earlier row used them.
    pub duplicates: Vec<String>,
    pub embedding: Option<EmbedReport>,
    pub fingerprints: Option<FingerprintReport>,
    pub matrices: Vec<MatrixSummary>,
    pub hybrid: Option<HybridReport>,
    /// The matrix that was dispatched to the models.
    pub feature_matrix: PathBuf,
    pub registry: Option<Registry>,
    pub dispatch: DispatchReport,
    pub cleanup: Vec<Removal>,
}

impl RunSummary {
    pub fn matrix(&self, representation: Representation) -> Option<&MatrixSummary> {
        self.matrices.iter().find(|m| m.representation == representation)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    engine: EmbeddingEngine,
    shift_predictor: Box<dyn ShiftPredictor>,
    predictors: PredictorSet,
}

impl Pipeline {
    /// Builds a pipeline with the configured external tools and the built-in
    /// predictors for every enabled backend.
    pub fn new(config: PipelineConfig) -> Self {
        let layout_tool = OpenBabelTool::new(
            config.layout_tool.program.clone(),
            Duration::from_secs(config.layout_tool.timeout_secs),
        );
        Self {
            engine: EmbeddingEngine::new(config.embedding.clone(), Box::new(layout_tool)),
            shift_predictor: Box::new(JavaShiftPredictor::new(config.shift_predictor.clone())),
            predictors: PredictorSet::builtin(&config.backends),
            config,
        }
    }

    pub fn with_layout_tool(mut self, tool: Box<dyn LayoutTool>) -> Self {
        self.engine = EmbeddingEngine::new(self.config.embedding.clone(), tool);
        self
    }

    pub fn with_engine(mut self, engine: EmbeddingEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_shift_predictor(mut self, predictor: Box<dyn ShiftPredictor>) -> Self {
        self.shift_predictor = predictor;
        self
    }

    pub fn with_predictors(mut self, predictors: PredictorSet) -> Self {
        self.predictors = predictors;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Stages a run of `representation` passes through, in order.
    pub fn planned_stages(&self, representation: Representation) -> Vec<Stage> {
        let mut stages = vec![Stage::Normalize];
        if representation.needs_geometry() {
            stages.push(Stage::Embed);
            for &nucleus in representation.spectra() {
                stages.extend([
                    Stage::PredictShifts(nucleus),
                    Stage::Bucket(nucleus),
                    Stage::Merge(nucleus.into()),
                    Stage::Header(nucleus.into()),
                ]);
            }
        } else {
            stages.extend([
                Stage::Fingerprint,
                Stage::Merge(representation),
                Stage::Header(representation),
            ]);
        }
        if representation == Representation::Hybrid {
            stages.push(Stage::Hybrid);
        }
        stages.push(Stage::Dispatch);
        if !self.config.keep_intermediates {
            stages.push(Stage::Cleanup);
        }
        stages
    }

    /// Runs every stage for `input`. Tracked artifacts are removed afterwards
    /// on both the success and the failure path.
    pub fn run<O: Observer>(
        &self,
        input: &Path,
        representation: Representation,
        observer: &mut O,
    ) -> Result<RunSummary, Error> {
        info!(input = %input.display(), representation = %representation, "starting run");
        let mut guard = ArtifactGuard::new(self.config.keep_intermediates);
        let result = self.run_stages(input, representation, observer, guard.set_mut());

        let cleanup = if guard.keeps() {
            guard.finish()
        } else {
            started(observer, &Stage::Cleanup);
            let removals = guard.finish();
            let details: Vec<String> = removals.iter().map(ToString::to_string).collect();
            completed(observer, &Stage::Cleanup, &details);
            removals
        };

        let mut summary = result?;
        summary.cleanup = cleanup;
        info!(structures = summary.dispatch.structures.len(), "run finished");
        Ok(summary)
    }

    fn run_stages<O: Observer>(
        &self,
        input: &Path,
        representation: Representation,
        observer: &mut O,
        artifacts: &mut ArtifactSet,
    ) -> Result<RunSummary, Error> {
        let work_dir = &self.config.work_dir;
        fs::create_dir_all(work_dir).map_err(|e| Error::stage(Stage::Normalize, e))?;

        started(observer, &Stage::Normalize);
        let normalized = normalize::normalize(input, work_dir).map_err(Error::Input)?;
        artifacts.track(&normalized.output);
        let loaded = normalize::load_records(&normalized.output).map_err(Error::Input)?;
        completed(observer, &Stage::Normalize, &normalize_details(&normalized, &loaded.duplicates));

        let names = OutputNames::new(input, &normalized.output);
        let mut records = loaded.records;
        let mut summary = RunSummary {
            representation,
            normalized,
            duplicates: loaded.duplicates,
            embedding: None,
            fingerprints: None,
            matrices: Vec::new(),
            hybrid: None,
            feature_matrix: PathBuf::new(),
            registry: None,
            dispatch: DispatchReport::default(),
            cleanup: Vec::new(),
        };

        let feature_matrix = if representation.needs_geometry() {
            let geometry_dir = self.embed(&mut records, observer, artifacts, &mut summary)?;
            self.spectral_features(representation, &geometry_dir, &names, observer, artifacts, &mut summary)?
        } else {
            self.fingerprint_features(&records, &names, observer, artifacts, &mut summary)?
        };

        self.dispatch(representation, &feature_matrix, observer, &mut summary)?;
        summary.feature_matrix = feature_matrix;
        Ok(summary)
    }

    fn embed<O: Observer>(
        &self,
        records: &mut [StructureRecord],
        observer: &mut O,
        artifacts: &mut ArtifactSet,
        summary: &mut RunSummary,
    ) -> Result<PathBuf, Error> {
        let stage = Stage::Embed;
        started(observer, &stage);
        let dir = self.stage_dir(GEOMETRY_DIR, stage, artifacts)?;
        let report = self
            .engine
            .embed_all(records, &dir, &self.config.work_dir, observer)
            .map_err(|err| match err {
                embed::Error::Layout { .. } => Error::external_tool(stage, err),
                other => Error::stage(stage, other),
            })?;
        completed(observer, &stage, &embed_details(&report));
        summary.embedding = Some(report);
        Ok(dir)
    }

    fn spectral_features<O: Observer>(
        &self,
        representation: Representation,
        geometry_dir: &Path,
        names: &OutputNames,
        observer: &mut O,
        artifacts: &mut ArtifactSet,
        summary: &mut RunSummary,
    ) -> Result<PathBuf, Error> {
        if let Some(nucleus) = representation.nucleus() {
            let matrix = self.spectrum(nucleus, geometry_dir, names, observer, artifacts)?;
            let path = matrix.headed.path.clone();
            summary.matrices.push(matrix);
            return Ok(path);
        }

        let mut failures = Vec::new();
        for &nucleus in representation.spectra() {
            match self.spectrum(nucleus, geometry_dir, names, observer, artifacts) {
                Ok(matrix) => summary.matrices.push(matrix),
                Err(err) => {
                    warn!(nucleus = %nucleus, "hybrid sub-run failed: {err}");
                    failures.push((nucleus, err));
                }
            }
        }
        if !failures.is_empty() {
            return Err(Error::HybridIncomplete { failures });
        }

        let stage = Stage::Hybrid;
        started(observer, &stage);
        let (Some(proton), Some(carbon)) = (
            summary.matrix(Representation::Proton),
            summary.matrix(Representation::Carbon),
        ) else {
            return Err(Error::stage(stage, "a spectral matrix is missing"));
        };
        let proton_prefix = format!("{}_", Nucleus::Proton.hybrid_prefix());
        let carbon_prefix = format!("{}_", Nucleus::Carbon.hybrid_prefix());
        let output = self.stage_dir(HYBRID_DIR, stage, artifacts)?.join(HYBRID_FILE);
        let report = assemble::concatenate(
            HybridInput {
                path: &proton.headed.path,
                prefix: &proton_prefix,
            },
            HybridInput {
                path: &carbon.headed.path,
                prefix: &carbon_prefix,
            },
            &output,
        )
        .map_err(|e| Error::stage(stage, e))?;

        let mut details = vec![format!("{} rows, {} features", report.rows, report.feature_count)];
        details.extend(report.anomalies.iter().map(ToString::to_string));
        completed(observer, &stage, &details);
        summary.hybrid = Some(report);
        Ok(output)
    }

    fn spectrum<O: Observer>(
        &self,
        nucleus: Nucleus,
        geometry_dir: &Path,
        names: &OutputNames,
        observer: &mut O,
        artifacts: &mut ArtifactSet,
    ) -> Result<MatrixSummary, Error> {
        let tag = nucleus.tag();

        let stage = Stage::PredictShifts(nucleus);
        started(observer, &stage);
        let predicted_dir = self.stage_dir(&format!("predicted_spectra_{tag}"), stage, artifacts)?;
        self.shift_predictor
            .predict(geometry_dir, nucleus, &predicted_dir)
            .map_err(|err| match err {
                predict::Error::Tool { .. } | predict::Error::ClassPath(_) => Error::external_tool(stage, err),
                other => Error::stage(stage, other),
            })?;
        completed(observer, &stage, &[]);

        let stage = Stage::Bucket(nucleus);
        started(observer, &stage);
        let bucket_dir = self.stage_dir(&format!("bucketed_{tag}_spectra"), stage, artifacts)?;
        let bucketed = bucket::bucket_dir(&predicted_dir, nucleus.window(), &bucket_dir)
            .map_err(|e| Error::stage(stage, e))?;
        completed(observer, &stage, &bucket_details(&bucketed));

        let (merged, headed) = self.assemble(nucleus.into(), &bucket_dir, BIN_COUNT, names, observer, artifacts)?;
        Ok(MatrixSummary {
            representation: nucleus.into(),
            bucketed: Some(bucketed),
            merged,
            headed,
        })
    }

    fn fingerprint_features<O: Observer>(
        &self,
        records: &[StructureRecord],
        names: &OutputNames,
        observer: &mut O,
        artifacts: &mut ArtifactSet,
        summary: &mut RunSummary,
    ) -> Result<PathBuf, Error> {
        let stage = Stage::Fingerprint;
        started(observer, &stage);
        let dir = self.stage_dir(FINGERPRINT_DIR, stage, artifacts)?;
        let report = fingerprint::write_all(records, &dir, &self.config.fingerprint, observer)
            .map_err(|e| Error::stage(stage, e))?;
        let mut details = vec![format!("{} fingerprints written", report.written.len())];
        details.extend(
            report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.id, f.error)),
        );
        completed(observer, &stage, &details);
        summary.fingerprints = Some(report);

        let representation = Representation::Fingerprint;
        let bits = self.config.fingerprint.bits;
        let (merged, headed) = self.assemble(representation, &dir, bits, names, observer, artifacts)?;
        let path = headed.path.clone();
        summary.matrices.push(MatrixSummary {
            representation,
            bucketed: None,
            merged,
            headed,
        });
        Ok(path)
    }

    /// Merges the per-structure files in `dir` and attaches the header.
    fn assemble<O: Observer>(
        &self,
        representation: Representation,
        dir: &Path,
        expected: usize,
        names: &OutputNames,
        observer: &mut O,
        artifacts: &mut ArtifactSet,
    ) -> Result<(MergeReport, HeaderReport), Error> {
        let tag = representation.tag();

        let stage = Stage::Merge(representation);
        started(observer, &stage);
        let merged_path = self.stage_dir(MERGED_DIR, stage, artifacts)?.join(names.merged(tag));
        let merged = assemble::merge(dir, &merged_path).map_err(|e| Error::stage(stage, e))?;
        completed(observer, &stage, &[format!("{} rows merged", merged.rows)]);

        let stage = Stage::Header(representation);
        started(observer, &stage);
        let headed_path = self.stage_dir(ML_INPUT_DIR, stage, artifacts)?.join(names.ml_input(tag));
        let headed = attach_header(&merged_path, Some(expected), &headed_path).map_err(|e| Error::stage(stage, e))?;
        let mut details = vec![format!("{} features", headed.feature_count)];
        details.extend(headed.anomalies.iter().map(ToString::to_string));
        completed(observer, &stage, &details);
        Ok((merged, headed))
    }

    fn dispatch<O: Observer>(
        &self,
        representation: Representation,
        feature_matrix: &Path,
        observer: &mut O,
        summary: &mut RunSummary,
    ) -> Result<(), Error> {
        let stage = Stage::Dispatch;
        started(observer, &stage);
        let tag = representation.tag();
        let matrix = FeatureMatrix::read(feature_matrix).map_err(|e| Error::stage(stage, e))?;

        let registry_path = self.config.registry_path(tag);
        let registry = if registry_path.is_file() {
            Some(Registry::load(&registry_path).map_err(|e| Error::stage(stage, e))?)
        } else {
            warn!(path = %registry_path.display(), "model registry not found; no models will run");
            None
        };

        let report = predict::dispatch(
            &matrix,
            registry.as_ref(),
            &self.predictors,
            &self.config.results_path(tag),
        )
        .map_err(|e| Error::stage(stage, e))?;

        let mut details = vec![format!(
            "{} structures, {} properties",
            report.structures.len(),
            report.properties.len()
        )];
        details.extend(report.skipped.iter().map(|s| s.reason.clone()));
        completed(observer, &stage, &details);

        summary.registry = registry;
        summary.dispatch = report;
        Ok(())
    }

    /// Creates `<work_dir>/<name>` empty and tracks it. A directory left over
    /// from an earlier run is cleared first; one already tracked by this run
    /// is reused as is.
    fn stage_dir(&self, name: &str, stage: Stage, artifacts: &mut ArtifactSet) -> Result<PathBuf, Error> {
        let path = self.config.work_path(name);
        if artifacts.contains(&path) {
            return Ok(path);
        }
        if path.exists() {
            warn!(path = %path.display(), "clearing stale output from an earlier run");
            fs::remove_dir_all(&path).map_err(|e| Error::stage(stage, e))?;
        }
        fs::create_dir_all(&path).map_err(|e| Error::stage(stage, e))?;
        artifacts.track(&path);
        Ok(path)
    }
}

fn started<O: Observer>(observer: &mut O, stage: &Stage) {
    info!("{stage}");
    observer.stage_started(stage);
}

fn completed<O: Observer>(observer: &mut O, stage: &Stage, details: &[String]) {
    for detail in details {
        info!("{stage}: {detail}");
    }
    observer.stage_completed(stage, details);
}

/// File names derived from the input and the normalized table.
struct OutputNames {
    input_stem: String,
    verified_stem: String,
}

impl OutputNames {
    fn new(input: &Path, verified: &Path) -> Self {
        Self {
            input_stem: normalize::file_stem(input),
            verified_stem: normalize::file_stem(verified),
        }
    }

    fn merged(&self, tag: &str) -> String {
        format!("{}_{tag}_merged.csv", self.input_stem)
    }

    fn ml_input(&self, tag: &str) -> String {
        ml_input_name(&self.verified_stem, tag)
    }
}

fn normalize_details(report: &NormalizeReport, duplicates: &[String]) -> Vec<String> {
    let mut details = vec![format!(
        "{} rows kept ({}-delimited)",
        report.rows_written,
        report.delimiter_name()
    )];
    for row in &report.malformed {
        details.push(format!(
            "row {} skipped: {} fields, expected {}",
            row.line, row.found, row.expected
        ));
    }
    if report.decimal_commas > 0 {
        details.push(format!("{} decimal commas replaced", report.decimal_commas));
    }
    if report.dropped_columns > 0 {
        details.push(format!("{} surplus columns dropped", report.dropped_columns));
    }
    if report.missing_value_rows > 0 {
        details.push(format!("{} rows with missing values dropped", report.missing_value_rows));
    }
    for id in duplicates {
        details.push(format!("duplicate id '{id}' skipped"));
    }
    details
}

fn embed_details(report: &EmbedReport) -> Vec<String> {
    let mut details = vec![format!(
        "{} written, {} degraded, {} failed, {} via layout tool",
        report.written(),
        report.degraded(),
        report.failed(),
        report.routed_external()
    )];
    for entry in report.entries.iter().filter(|e| e.status == embed::Status::Failed) {
        let message = entry.message.as_deref().unwrap_or("unknown error");
        details.push(format!("{}: {message}", entry.id));
    }
    details
}

fn bucket_details(report: &BucketReport) -> Vec<String> {
    let mut details = vec![format!("{} histograms written", report.written())];
    for (file, rejected) in &report.with_errors {
        details.push(format!("{file}: {} values outside the window", rejected.len()));
    }
    details
}
