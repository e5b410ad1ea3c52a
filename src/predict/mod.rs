//! Spectral shift prediction and model inference.

pub mod backend;
mod dispatch;
mod registry;
mod shift;

pub use backend::{BackendError, BackendKind, Model, Predictor, PredictorSet};
pub use dispatch::{
    DispatchReport, PropertyPrediction, SkippedBackend, StructurePrediction, dispatch, result_file_name,
};
pub use registry::{Registry, RegistryEntry, registry_file_name};
pub use shift::{JavaShiftPredictor, PredictorClass, ShiftPredictor, ShiftPredictorConfig};

use std::path::PathBuf;

use thiserror::Error;

use crate::model::representation::Nucleus;
use crate::process::ToolError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] crate::io::Error),

    #[error("registry '{path}' is missing the required column '{column}'")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{nucleus} shift predictor failed: {source}")]
    Tool { nucleus: Nucleus, source: ToolError },

    #[error("invalid classpath entry: {0}")]
    ClassPath(#[source] std::env::JoinPathsError),

    #[error("failed to prepare output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Matrix(#[from] crate::assemble::Error),
}
