use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::Error;
use crate::embed::EmbedConfig;
use crate::fingerprint::FingerprintConfig;
use crate::predict::{BackendKind, ShiftPredictorConfig};

/// External 2D layout tool settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutToolConfig {
    pub program: PathBuf,
    pub timeout_secs: u64,
}

impl Default for LayoutToolConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("obabel"),
            timeout_secs: 120,
        }
    }
}

/// Settings for one pipeline run. Every field has a default, so an empty
/// TOML document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Root of every intermediate directory and of the embedding logs.
    pub work_dir: PathBuf,
    /// Root of the `<TAG>_results` directories.
    pub results_dir: PathBuf,
    /// Holds `<TAG>_models_info.csv` registries and the artifacts they reference.
    pub models_dir: PathBuf,
    pub keep_intermediates: bool,
    pub embedding: EmbedConfig,
    pub layout_tool: LayoutToolConfig,
    pub shift_predictor: ShiftPredictorConfig,
    pub fingerprint: FingerprintConfig,
    pub backends: BTreeSet<BackendKind>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            results_dir: PathBuf::from("."),
            models_dir: PathBuf::from("models"),
            keep_intermediates: false,
            embedding: EmbedConfig::default(),
            layout_tool: LayoutToolConfig::default(),
            shift_predictor: ShiftPredictorConfig::default(),
            fingerprint: FingerprintConfig::default(),
            backends: BackendKind::ALL.into_iter().collect(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    pub fn registry_path(&self, tag: &str) -> PathBuf {
        self.models_dir.join(crate::predict::registry_file_name(tag))
    }

    pub fn results_path(&self, tag: &str) -> PathBuf {
        self.results_dir.join(format!("{tag}_results"))
    }

    pub fn work_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.work_dir.join(name)
    }
}
