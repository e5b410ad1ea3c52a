//! Feature-matrix assembly: merging per-structure vectors into one table,
//! attaching the stable `FEATURE_n` header, and joining two spectral
//! matrices into a hybrid one.

mod header;
mod hybrid;
mod matrix;
mod merge;

pub use header::{HeaderReport, attach_header, ml_input_name};
pub use hybrid::{HybridInput, HybridReport, concatenate};
pub use matrix::{FeatureMatrix, MatrixRow, feature_header};
pub use merge::{MergeReport, merge};

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] crate::io::Error),

    #[error("no feature files found in '{dir}'")]
    Empty { dir: PathBuf },

    #[error("'{file}' has {found} values but earlier files have {expected}")]
    Ragged {
        file: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("matrix '{path}' has no header row")]
    MissingHeader { path: PathBuf },

    #[error("matrices '{left}' and '{right}' share no structure ids")]
    NoCommonIds { left: PathBuf, right: PathBuf },

    #[error("non-numeric value '{value}' for '{id}' in column '{column}'")]
    NonNumeric {
        id: String,
        column: String,
        value: String,
    },
}

/// A reported, non-fatal inconsistency found while assembling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    FeatureCount { expected: usize, observed: usize },
    RowWidth { id: String, expected: usize, found: usize },
    UnmatchedIds { side: String, ids: Vec<String> },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::FeatureCount { expected, observed } => write!(
                f,
                "expected {expected} feature columns but the matrix has {observed}"
            ),
            Anomaly::RowWidth { id, expected, found } => {
                write!(f, "row '{id}' has {found} features, header has {expected}")
            }
            Anomaly::UnmatchedIds { side, ids } => write!(
                f,
                "{} structure(s) only present in the {side} matrix: {}",
                ids.len(),
                ids.join(", ")
            ),
        }
    }
}
