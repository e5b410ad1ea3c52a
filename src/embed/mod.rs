//! Structure embedding engine.
//!
//! Each [`StructureRecord`] passes through a fixed sequence of states:
//! canonicalize the identifier, attempt 3D embedding within a retry budget,
//! fall back to a 2D layout when the budget is exhausted, run hazard
//! detection, reject geometries collapsed onto the origin, flatten to a
//! stereo-free 2D copy, and write one molfile per structure. Structures that
//! carry a hazard or needed the fallback are written by an external
//! [`LayoutTool`] instead of the built-in writer.
//!
//! Failures are per structure and never stop the batch; only a failing
//! external layout tool aborts the stage.

mod conformer;
mod external;
mod hazard;
mod layout;

pub use conformer::{ConformerEmbedder, DistanceEmbedder};
pub use external::{LayoutError, LayoutTool, OpenBabelTool};
pub use hazard::{Hazard, detect as detect_hazards};
pub use layout::LayoutEngine;

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::io::molfile;
use crate::model::geometry::{Dimensionality, Geometry};
use crate::model::record::StructureRecord;
use crate::progress::{PercentThrottle, Progress};
use crate::smiles::{self, ParseError};

pub const ERROR_LOG: &str = "mol_creation_error.log";
pub const WARNING_LOG: &str = "mol_creation_warning.log";

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to prepare geometry directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write geometry for '{id}': {source}")]
    Write { id: String, source: crate::io::Error },

    #[error("external layout failed for '{id}': {source}")]
    Layout { id: String, source: LayoutError },

    #[error("failed to write log '{path}': {source}")]
    Log {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Tunables for the embedding state machine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbedConfig {
    /// Primary 3D attempts before the 2D fallback.
    pub max_attempts: u32,
    /// Seed of the first attempt; attempt `n` uses `seed + n`.
    pub seed: u64,
    /// Geometries with every atom closer than this to the origin are rejected (Å).
    pub origin_tolerance: f64,
    pub heavy_atom_ceiling: usize,
    pub relax_iterations: usize,
    pub layout_bond_length: f64,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            seed: 42,
            origin_tolerance: 0.1,
            heavy_atom_ceiling: 150,
            relax_iterations: 1000,
            layout_bond_length: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DegradeReason {
    PrimaryEmbeddingExhausted { attempts: u32 },
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradeReason::PrimaryEmbeddingExhausted { attempts } => write!(
                f,
                "primary embedding exhausted ({attempts}x), used 2D layout"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    InvalidIdentifier(ParseError),
    CollapsedGeometry { tolerance: f64 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::InvalidIdentifier(err) => write!(f, "invalid identifier: {err}"),
            FailureReason::CollapsedGeometry { tolerance } => {
                write!(f, "all atoms within {tolerance} Å of the origin")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingOutcome {
    Success(Geometry),
    Degraded(Geometry, DegradeReason),
    Failed(FailureReason),
}

impl EmbeddingOutcome {
    pub fn geometry(&self) -> Option<&Geometry> {
        match self {
            EmbeddingOutcome::Success(g) | EmbeddingOutcome::Degraded(g, _) => Some(g),
            EmbeddingOutcome::Failed(_) => None,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            EmbeddingOutcome::Success(_) => Status::Success,
            EmbeddingOutcome::Degraded(..) => Status::Degraded,
            EmbeddingOutcome::Failed(_) => Status::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Degraded,
    Failed,
}

/// Which writer persisted a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Primary,
    External,
}

/// Result of running the state machine on one structure, before anything is written.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub outcome: EmbeddingOutcome,
    pub canonical: Option<String>,
    pub attempts: u32,
    pub hazards: Vec<Hazard>,
    /// Stereo-free 2D copy that gets persisted.
    pub flattened: Option<Geometry>,
}

impl Embedding {
    pub fn route(&self) -> Option<Route> {
        self.flattened.as_ref()?;
        if self.hazards.is_empty() && !matches!(self.outcome, EmbeddingOutcome::Degraded(..)) {
            Some(Route::Primary)
        } else {
            Some(Route::External)
        }
    }

    /// Every reason the structure was sent to the external tool.
    pub fn routing_reasons(&self) -> Vec<String> {
        let mut reasons: Vec<String> = self.hazards.iter().map(ToString::to_string).collect();
        if let EmbeddingOutcome::Degraded(_, reason) = &self.outcome {
            reasons.push(reason.to_string());
        }
        reasons
    }
}

/// Per-structure line of an [`EmbedReport`].
#[derive(Debug, Clone)]
pub struct EmbedEntry {
    pub id: String,
    pub status: Status,
    pub route: Option<Route>,
    pub attempts: u32,
    pub hazards: Vec<Hazard>,
    pub message: Option<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct EmbedReport {
    pub output_dir: PathBuf,
    pub entries: Vec<EmbedEntry>,
    pub error_log: Option<PathBuf>,
    pub warning_log: Option<PathBuf>,
}

impl EmbedReport {
    fn count(&self, status: Status) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(Status::Success)
    }

    pub fn degraded(&self) -> usize {
        self.count(Status::Degraded)
    }

    pub fn failed(&self) -> usize {
        self.count(Status::Failed)
    }

    pub fn written(&self) -> usize {
        self.entries.iter().filter(|e| e.file.is_some()).count()
    }

    pub fn routed_external(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.route == Some(Route::External))
            .count()
    }
}

pub struct EmbeddingEngine {
    config: EmbedConfig,
    embedder: Box<dyn ConformerEmbedder>,
    layout: LayoutEngine,
    layout_tool: Box<dyn LayoutTool>,
}

impl EmbeddingEngine {
    pub fn new(config: EmbedConfig, layout_tool: Box<dyn LayoutTool>) -> Self {
        Self {
            embedder: Box::new(DistanceEmbedder::new(config.relax_iterations)),
            layout: LayoutEngine::new(config.layout_bond_length),
            config,
            layout_tool,
        }
    }

    pub fn with_embedder(mut self, embedder: Box<dyn ConformerEmbedder>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn config(&self) -> &EmbedConfig {
        &self.config
    }

    /// Runs the state machine for one identifier without touching the filesystem.
    pub fn embed_record(&self, raw_identifier: &str) -> Embedding {
        let mol = match smiles::parse(raw_identifier) {
            Ok(mol) => mol,
            Err(err) => {
                return Embedding {
                    outcome: EmbeddingOutcome::Failed(FailureReason::InvalidIdentifier(err)),
                    canonical: None,
                    attempts: 0,
                    hazards: Vec::new(),
                    flattened: None,
                };
            }
        };
        let canonical = smiles::canonical_smiles(&mol);
        let hazards = detect_hazards(&mol, self.config.heavy_atom_ceiling);
        let full = mol.with_explicit_hydrogens();

        let mut attempts = 0;
        let mut accepted = None;
        for attempt in 0..self.config.max_attempts {
            attempts += 1;
            let seed = self.config.seed.wrapping_add(u64::from(attempt));
            if let Some(coords) = self.embedder.embed(&full, seed) {
                accepted = Some(Geometry::new(full.clone(), coords, Dimensionality::Three));
                break;
            }
        }

        let (geometry, degraded) = match accepted {
            Some(geometry) => (geometry, None),
            None => {
                let coords = self.layout.depict(&full);
                (
                    Geometry::new(full.clone(), coords, Dimensionality::Two),
                    Some(DegradeReason::PrimaryEmbeddingExhausted { attempts }),
                )
            }
        };

        if geometry.is_collapsed(self.config.origin_tolerance) {
            return Embedding {
                outcome: EmbeddingOutcome::Failed(FailureReason::CollapsedGeometry {
                    tolerance: self.config.origin_tolerance,
                }),
                canonical: Some(canonical),
                attempts,
                hazards,
                flattened: None,
            };
        }

        let flat_mol = geometry.molecule().without_stereo();
        let flat_coords = self.layout.depict(&flat_mol);
        let flattened = Geometry::new(flat_mol, flat_coords, Dimensionality::Two);

        let outcome = match degraded {
            Some(reason) => EmbeddingOutcome::Degraded(geometry, reason),
            None => EmbeddingOutcome::Success(geometry),
        };
        Embedding {
            outcome,
            canonical: Some(canonical),
            attempts,
            hazards,
            flattened: Some(flattened),
        }
    }

    /// Embeds every record, writing `<out_dir>/<id>.mol` for each accepted
    /// structure and appending diagnostics to the two logs in `log_dir`.
    pub fn embed_all(
        &self,
        records: &mut [StructureRecord],
        out_dir: &Path,
        log_dir: &Path,
        progress: &mut dyn Progress,
    ) -> Result<EmbedReport, Error> {
        fs::create_dir_all(out_dir).map_err(|source| Error::OutputDir {
            path: out_dir.to_path_buf(),
            source,
        })?;
        info!(count = records.len(), dir = %out_dir.display(), "embedding structures");

        let mut report = EmbedReport {
            output_dir: out_dir.to_path_buf(),
            ..Default::default()
        };
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut throttle = PercentThrottle::new(progress, records.len());

        let mut result = Ok(());
        for (idx, record) in records.iter_mut().enumerate() {
            let embedding = self.embed_record(&record.raw_identifier);
            let entry = match self.persist(record, embedding, out_dir, &mut errors, &mut warnings) {
                Ok(entry) => entry,
                Err(err) => {
                    result = Err(err);
                    break;
                }
            };
            report.entries.push(entry);
            throttle.tick(idx + 1);
        }
        throttle.finish();

        report.error_log = append_log(log_dir, ERROR_LOG, "MOL CREATION ERRORS", &errors)?;
        report.warning_log = append_log(log_dir, WARNING_LOG, "MOL CREATION WARNINGS", &warnings)?;
        result?;

        info!(
            written = report.written(),
            degraded = report.degraded(),
            failed = report.failed(),
            external = report.routed_external(),
            "embedding finished"
        );
        Ok(report)
    }

    fn persist(
        &self,
        record: &mut StructureRecord,
        embedding: Embedding,
        out_dir: &Path,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) -> Result<EmbedEntry, Error> {
        let id = record.id.clone();
        let route = embedding.route();
        let mut entry = EmbedEntry {
            id: id.clone(),
            status: embedding.outcome.status(),
            route,
            attempts: embedding.attempts,
            hazards: embedding.hazards.clone(),
            message: None,
            file: None,
        };

        if let EmbeddingOutcome::Failed(reason) = &embedding.outcome {
            warn!(id = %id, identifier = %record.raw_identifier, "embedding failed: {reason}");
            errors.push(log_entry(&id, &record.raw_identifier, "Error", &reason.to_string()));
            entry.message = Some(reason.to_string());
            return Ok(entry);
        }

        if let EmbeddingOutcome::Degraded(_, reason) = &embedding.outcome {
            warn!(id = %id, "{reason}");
            warnings.push(log_entry(&id, &record.raw_identifier, "Warning", &reason.to_string()));
        }

        let Some(flattened) = embedding.flattened.as_ref() else {
            return Ok(entry);
        };
        let path = out_dir.join(format!("{id}.mol"));
        match route {
            Some(Route::External) => {
                let reasons = embedding.routing_reasons().join("; ");
                warn!(id = %id, "routing to external layout tool: {reasons}");
                warnings.push(log_entry(
                    &id,
                    &record.raw_identifier,
                    "Warning",
                    &format!("external layout fallback: {reasons}"),
                ));
                entry.message = Some(reasons);
                self.layout_tool
                    .layout(&id, flattened, &path)
                    .map_err(|source| Error::Layout {
                        id: id.clone(),
                        source,
                    })?;
            }
            _ => write_molfile(&path, &id, flattened)?,
        }
        debug!(id = %id, path = %path.display(), canonical = ?embedding.canonical, "geometry written");

        entry.file = Some(path);
        record.geometry = embedding.outcome.geometry().cloned();
        Ok(entry)
    }
}

fn write_molfile(path: &Path, id: &str, geometry: &Geometry) -> Result<(), Error> {
    let write_err = |source| Error::Write {
        id: id.to_string(),
        source,
    };
    let file = File::create(path).map_err(|e| write_err(crate::io::Error::file(path, e)))?;
    let mut writer = BufWriter::new(file);
    molfile::write(&mut writer, id, geometry).map_err(write_err)?;
    writer.flush().map_err(|e| write_err(e.into()))
}

fn log_entry(id: &str, identifier: &str, kind: &str, message: &str) -> String {
    format!("Molecule: {id}\nSMILES: {identifier}\n{kind}: {message}\n")
}

/// Appends `entries` under a timestamped run header. Nothing is written when empty.
fn append_log(
    dir: &Path,
    name: &str,
    title: &str,
    entries: &[String],
) -> Result<Option<PathBuf>, Error> {
    if entries.is_empty() {
        return Ok(None);
    }
    let path = dir.join(name);
    let log_err = |source| Error::Log {
        path: path.clone(),
        source,
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(log_err)?;
    let mut out = BufWriter::new(file);
    let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    writeln!(out, "==== {title} ({stamp}) ====\n").map_err(log_err)?;
    for entry in entries {
        writeln!(out, "{entry}").map_err(log_err)?;
    }
    out.flush().map_err(log_err)?;
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Embedder that always fails and counts its calls.
    struct FailingEmbedder {
        calls: Rc<Cell<u32>>,
    }

    impl ConformerEmbedder for FailingEmbedder {
        fn embed(&self, _mol: &crate::model::molecule::Molecule, _seed: u64) -> Option<Vec<[f64; 3]>> {
            self.calls.set(self.calls.get() + 1);
            None
        }
    }

    /// Layout tool that writes with the built-in writer and records who it saw.
    #[derive(Default)]
    struct RecordingTool {
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl LayoutTool for RecordingTool {
        fn layout(&self, name: &str, geometry: &Geometry, output: &Path) -> Result<(), LayoutError> {
            self.seen.borrow_mut().push(name.to_string());
            let file = File::create(output).map_err(|e| LayoutError::Stage(e.into()))?;
            molfile::write(file, name, geometry).map_err(LayoutError::Stage)
        }
    }

    struct BrokenTool;

    impl LayoutTool for BrokenTool {
        fn layout(&self, _: &str, _: &Geometry, _: &Path) -> Result<(), LayoutError> {
            Err(LayoutError::Tool(crate::process::ToolError::Spawn {
                program: "obabel".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }))
        }
    }

    fn engine_with(tool: Box<dyn LayoutTool>) -> EmbeddingEngine {
        EmbeddingEngine::new(EmbedConfig::default(), tool)
    }

    #[test]
    fn clean_molecule_succeeds_on_primary_route() {
        let engine = engine_with(Box::new(RecordingTool::default()));
        let result = engine.embed_record("CCO");
        assert_eq!(result.outcome.status(), Status::Success);
        assert_eq!(result.attempts, 1);
        assert!(result.hazards.is_empty());
        assert_eq!(result.route(), Some(Route::Primary));
        let geometry = result.outcome.geometry().unwrap();
        assert_eq!(geometry.dimensionality(), Dimensionality::Three);
        assert_eq!(geometry.atom_count(), 9);
        let flat = result.flattened.unwrap();
        assert_eq!(flat.dimensionality(), Dimensionality::Two);
        assert!(flat.coordinates().iter().all(|c| c[2] == 0.0));
    }

    #[test]
    fn aromatic_and_chiral_identifiers_keep_their_hydrogens() {
        let engine = engine_with(Box::new(RecordingTool::default()));
        for (smiles, atoms) in [("c1ccccc1O", 13), ("Cc1ccncc1", 14), ("N[C@H](C)C(=O)O", 13)] {
            let result = engine.embed_record(smiles);
            assert_ne!(result.outcome.status(), Status::Failed, "{smiles}");
            assert!(result.hazards.is_empty(), "{smiles}: {:?}", result.hazards);
            assert_eq!(result.outcome.geometry().unwrap().atom_count(), atoms, "{smiles}");
        }
    }

    #[test]
    fn exhausted_retries_degrade_to_fallback_without_exceeding_budget() {
        let calls = Rc::new(Cell::new(0));
        let engine = engine_with(Box::new(RecordingTool::default())).with_embedder(Box::new(
            FailingEmbedder {
                calls: Rc::clone(&calls),
            },
        ));
        let result = engine.embed_record("CCO");
        assert_eq!(calls.get(), 3);
        assert_eq!(result.attempts, 3);
        assert!(matches!(
            result.outcome,
            EmbeddingOutcome::Degraded(_, DegradeReason::PrimaryEmbeddingExhausted { attempts: 3 })
        ));
        assert_eq!(result.route(), Some(Route::External));
    }

    #[test]
    fn invalid_identifier_fails_without_attempts() {
        let engine = engine_with(Box::new(RecordingTool::default()));
        let result = engine.embed_record("C1CC(");
        assert!(matches!(
            result.outcome,
            EmbeddingOutcome::Failed(FailureReason::InvalidIdentifier(_))
        ));
        assert_eq!(result.attempts, 0);
        assert!(result.route().is_none());
    }

    #[test]
    fn collapsed_geometry_is_rejected() {
        let engine = engine_with(Box::new(RecordingTool::default()));
        let result = engine.embed_record("[Na+]");
        assert!(matches!(
            result.outcome,
            EmbeddingOutcome::Failed(FailureReason::CollapsedGeometry { .. })
        ));
        assert!(result.flattened.is_none());
    }

    #[test]
    fn empty_identifier_is_a_hazard_then_fails_sanity_check() {
        let engine = engine_with(Box::new(RecordingTool::default()));
        let result = engine.embed_record("");
        assert_eq!(result.hazards, vec![Hazard::Empty]);
        assert_eq!(result.outcome.status(), Status::Failed);
    }

    #[test]
    fn hazards_and_fallback_are_all_listed_as_routing_reasons() {
        let engine = engine_with(Box::new(RecordingTool::default())).with_embedder(Box::new(
            FailingEmbedder {
                calls: Rc::new(Cell::new(0)),
            },
        ));
        let result = engine.embed_record("CS(=O)(=O)C.[Na+]");
        let reasons = result.routing_reasons();
        assert_eq!(reasons.len(), 3);
        assert!(reasons[0].contains("hyper-valent S"));
        assert!(reasons[1].contains("disconnected fragments"));
        assert!(reasons[2].contains("primary embedding exhausted"));
    }

    #[test]
    fn embed_all_writes_files_and_logs() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("mols");
        let tool = RecordingTool::default();
        let seen = Rc::clone(&tool.seen);
        let engine = engine_with(Box::new(tool));

        let mut records = vec![
            StructureRecord::new("ethanol", "CCO"),
            StructureRecord::new("salt", "CC(=O)[O-].[Na+]"),
            StructureRecord::new("broken", "C(("),
        ];
        let report = engine
            .embed_all(&mut records, &out, dir.path(), &mut NoProgress)
            .unwrap();

        assert_eq!(report.written(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.routed_external(), 1);
        assert!(out.join("ethanol.mol").exists());
        assert!(out.join("salt.mol").exists());
        assert!(!out.join("broken.mol").exists());
        assert_eq!(*seen.borrow(), vec!["salt".to_string()]);

        assert!(records[0].geometry.is_some());
        assert!(records[2].geometry.is_none());

        let errors = fs::read_to_string(dir.path().join(ERROR_LOG)).unwrap();
        assert!(errors.contains("Molecule: broken"));
        assert!(errors.contains("SMILES: C(("));
        let warnings = fs::read_to_string(dir.path().join(WARNING_LOG)).unwrap();
        assert!(warnings.contains("Molecule: salt"));
        assert!(warnings.contains("disconnected fragments (2 components)"));

        let written = fs::read_to_string(out.join("ethanol.mol")).unwrap();
        let parsed = molfile::read(written.as_bytes()).unwrap();
        assert_eq!(parsed.atom_count(), 9);
        assert_eq!(parsed.dimensionality(), Dimensionality::Two);
    }

    #[test]
    fn logs_are_appended_across_runs() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(Box::new(RecordingTool::default()));
        for _ in 0..2 {
            let mut records = vec![StructureRecord::new("bad", "C1")];
            engine
                .embed_all(&mut records, &dir.path().join("mols"), dir.path(), &mut NoProgress)
                .unwrap();
        }
        let log = fs::read_to_string(dir.path().join(ERROR_LOG)).unwrap();
        assert_eq!(log.matches("Molecule: bad").count(), 2);
        assert_eq!(log.matches("==== MOL CREATION ERRORS").count(), 2);
        assert!(!dir.path().join(WARNING_LOG).exists());
    }

    #[test]
    fn layout_tool_failure_aborts_the_stage() {
        let dir = TempDir::new().unwrap();
        let engine = engine_with(Box::new(BrokenTool));
        let mut records = vec![StructureRecord::new("salt", "[Na+].[Cl-]")];
        let err = engine
            .embed_all(&mut records, &dir.path().join("mols"), dir.path(), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, Error::Layout { ref id, .. } if id == "salt"));
        assert!(dir.path().join(WARNING_LOG).exists());
    }
}
