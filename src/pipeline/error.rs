//! Error types for pipeline runs.
//!
//! Per-row and per-structure problems never surface here; they are recovered
//! and carried in the stage reports. This type covers only failures that end
//! a run or one representation of it.

use std::fmt;

use thiserror::Error;

use super::Stage;
use crate::model::representation::Nucleus;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The input table is unreadable or contains no usable rows.
    ///
    /// Raised before any stage runs.
    #[error("invalid input: {0}")]
    Input(#[source] crate::normalize::Error),

    /// An external tool exited unsuccessfully, could not be launched, or timed out.
    #[error("{stage} failed: external tool error")]
    ExternalTool {
        /// The stage that invoked the tool.
        stage: Stage,
        /// The underlying tool failure.
        #[source]
        source: BoxError,
    },

    /// A stage failed for a reason other than an external tool.
    #[error("{stage} failed")]
    Stage {
        /// The stage that failed.
        stage: Stage,
        /// The underlying failure.
        #[source]
        source: BoxError,
    },

    /// At least one spectral sub-run of a hybrid run failed.
    ///
    /// Both sub-runs are always attempted before this is returned.
    #[error("hybrid run incomplete: {}", SubRunFailures(.failures))]
    HybridIncomplete {
        /// Each failed sub-run with its error.
        failures: Vec<(Nucleus, Error)>,
    },
}

impl Error {
    /// Creates an [`ExternalTool`](Error::ExternalTool) error.
    ///
    /// # Arguments
    ///
    /// * `stage` — The stage that invoked the tool
    /// * `source` — The tool failure
    pub fn external_tool(stage: Stage, source: impl Into<BoxError>) -> Self {
        Self::ExternalTool {
            stage,
            source: source.into(),
        }
    }

    /// Creates a [`Stage`](Error::Stage) error.
    ///
    /// # Arguments
    ///
    /// * `stage` — The stage that failed
    /// * `source` — The underlying failure
    pub fn stage(stage: Stage, source: impl Into<BoxError>) -> Self {
        Self::Stage {
            stage,
            source: source.into(),
        }
    }

    /// The stage this error is attributed to, if any.
    pub fn failed_stage(&self) -> Option<&Stage> {
        match self {
            Error::ExternalTool { stage, .. } | Error::Stage { stage, .. } => Some(stage),
            Error::Input(_) => Some(&Stage::Normalize),
            Error::Config(_) | Error::HybridIncomplete { .. } => None,
        }
    }
}

struct SubRunFailures<'a>(&'a [(Nucleus, Error)]);

impl fmt::Display for SubRunFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (nucleus, err)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{nucleus}: {err}")?;
            let mut source = std::error::Error::source(err);
            while let Some(cause) = source {
                write!(f, ": {cause}")?;
                source = cause.source();
            }
        }
        Ok(())
    }
}
