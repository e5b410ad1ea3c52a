//! Inference-only model backends.
//!
//! Model artifacts are JSON documents; each [`BackendKind`] has one
//! [`Predictor`] that loads its artifact format into a [`Model`].

mod cnn;
mod dnn;
mod svr;
mod xgb;

pub use cnn::{CnnModel, CnnPredictor, ConvLayer};
pub use dnn::{DnnModel, DnnPredictor};
pub use svr::{Kernel, SvrModel, SvrPredictor};
pub use xgb::{TreeNode, XgbModel, XgbPredictor};

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to open model '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed model '{path}': {source}")]
    Format {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("model expects {expected} features, got {found}")]
    FeatureLength { expected: usize, found: usize },

    #[error("invalid model: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Svr,
    Xgb,
    Dnn,
    Cnn,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Svr,
        BackendKind::Xgb,
        BackendKind::Dnn,
        BackendKind::Cnn,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Svr => "SVR",
            BackendKind::Xgb => "XGB",
            BackendKind::Dnn => "DNN",
            BackendKind::Cnn => "CNN",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown model backend '{0}'")]
pub struct ParseBackendError(String);

impl FromStr for BackendKind {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        BackendKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseBackendError(trimmed.to_string()))
    }
}

/// A loaded model ready for inference.
pub trait Model {
    fn predict(&self, features: &[f64]) -> Result<f64, BackendError>;
}

/// Loads artifacts of one backend kind.
pub trait Predictor {
    fn kind(&self) -> BackendKind;

    fn load(&self, artifact: &Path) -> Result<Box<dyn Model>, BackendError>;

    fn predict(&self, artifact: &Path, features: &[f64]) -> Result<f64, BackendError> {
        self.load(artifact)?.predict(features)
    }
}

/// The predictors available to a run, keyed by kind.
#[derive(Default)]
pub struct PredictorSet {
    predictors: BTreeMap<BackendKind, Box<dyn Predictor>>,
}

impl PredictorSet {
    /// Built-in JSON predictors for the given kinds.
    pub fn builtin<'a>(kinds: impl IntoIterator<Item = &'a BackendKind>) -> Self {
        let mut set = Self::default();
        for kind in kinds {
            let predictor: Box<dyn Predictor> = match kind {
                BackendKind::Svr => Box::new(SvrPredictor),
                BackendKind::Xgb => Box::new(XgbPredictor),
                BackendKind::Dnn => Box::new(DnnPredictor),
                BackendKind::Cnn => Box::new(CnnPredictor),
            };
            set.insert(predictor);
        }
        set
    }

    pub fn insert(&mut self, predictor: Box<dyn Predictor>) {
        self.predictors.insert(predictor.kind(), predictor);
    }

    pub fn get(&self, kind: BackendKind) -> Option<&dyn Predictor> {
        self.predictors.get(&kind).map(|p| p.as_ref())
    }

    pub fn kinds(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.predictors.keys().copied()
    }

    pub fn contains(&self, kind: BackendKind) -> bool {
        self.predictors.contains_key(&kind)
    }
}

pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, BackendError> {
    let file = File::open(path).map_err(|source| BackendError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| BackendError::Format {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn check_len(expected: usize, features: &[f64]) -> Result<(), BackendError> {
    if expected == features.len() {
        Ok(())
    } else {
        Err(BackendError::FeatureLength {
            expected,
            found: features.len(),
        })
    }
}

/// Per-feature standardization `(x - mean) / scale`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl Scaler {
    pub fn apply(&self, features: &[f64]) -> Result<Vec<f64>, BackendError> {
        check_len(self.mean.len(), features)?;
        if self.scale.len() != self.mean.len() {
            return Err(BackendError::Invalid("scaler mean and scale differ in length".into()));
        }
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| if *s == 0.0 { x - m } else { (x - m) / s })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
        }
    }
}

/// Fully connected layer; `weights` is `[out][in]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

impl DenseLayer {
    pub fn forward(&self, input: &[f64]) -> Result<Vec<f64>, BackendError> {
        if self.weights.len() != self.bias.len() {
            return Err(BackendError::Invalid(format!(
                "dense layer has {} weight rows but {} biases",
                self.weights.len(),
                self.bias.len()
            )));
        }
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                check_len(row.len(), input)?;
                let z: f64 = row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b;
                Ok(self.activation.apply(z))
            })
            .collect()
    }
}

/// Runs `layers` in order and requires a single output.
pub(crate) fn dense_head(layers: &[DenseLayer], input: Vec<f64>) -> Result<f64, BackendError> {
    let mut x = input;
    for layer in layers {
        x = layer.forward(&x)?;
    }
    match x.as_slice() {
        [y] => Ok(*y),
        other => Err(BackendError::Invalid(format!(
            "network produced {} outputs, expected 1",
            other.len()
        ))),
    }
}
