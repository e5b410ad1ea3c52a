use std::path::Path;

use serde::Deserialize;

use super::{Activation, BackendError, BackendKind, DenseLayer, Model, Predictor, Scaler, dense_head, load_json};

/// 1D convolution; `filters` is `[out_channel][in_channel][kernel]`, valid padding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConvLayer {
    pub filters: Vec<Vec<Vec<f64>>>,
    pub bias: Vec<f64>,
    #[serde(default = "default_stride")]
    pub stride: usize,
    #[serde(default)]
    pub activation: Activation,
    /// Non-overlapping max-pool window applied after the activation.
    #[serde(default)]
    pub pool: Option<usize>,
}

fn default_stride() -> usize {
    1
}

impl ConvLayer {
    fn forward(&self, input: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, BackendError> {
        if self.filters.len() != self.bias.len() {
            return Err(BackendError::Invalid("convolution filters and biases differ in count".into()));
        }
        if self.stride == 0 {
            return Err(BackendError::Invalid("convolution stride must be positive".into()));
        }
        let len = input.first().map_or(0, Vec::len);
        let mut output = Vec::with_capacity(self.filters.len());
        for (filter, bias) in self.filters.iter().zip(&self.bias) {
            if filter.len() != input.len() {
                return Err(BackendError::Invalid(format!(
                    "filter spans {} channels, input has {}",
                    filter.len(),
                    input.len()
                )));
            }
            let kernel = filter.first().map_or(0, Vec::len);
            if kernel == 0 || kernel > len {
                return Err(BackendError::Invalid(format!(
                    "kernel of width {kernel} does not fit a sequence of {len}"
                )));
            }
            let steps = (len - kernel) / self.stride + 1;
            let mut channel = Vec::with_capacity(steps);
            for step in 0..steps {
                let start = step * self.stride;
                let mut z = *bias;
                for (weights, signal) in filter.iter().zip(input) {
                    z += weights
                        .iter()
                        .zip(&signal[start..start + kernel])
                        .map(|(w, x)| w * x)
                        .sum::<f64>();
                }
                channel.push(self.activation.apply(z));
            }
            output.push(match self.pool {
                Some(width) if width > 1 => channel
                    .chunks_exact(width)
                    .map(|c| c.iter().copied().fold(f64::NEG_INFINITY, f64::max))
                    .collect(),
                _ => channel,
            });
        }
        Ok(output)
    }
}

/// Convolutional regressor over a `(1 channel, n features)` input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CnnModel {
    pub conv: Vec<ConvLayer>,
    pub dense: Vec<DenseLayer>,
    #[serde(default)]
    pub scaler: Option<Scaler>,
}

impl Model for CnnModel {
    fn predict(&self, features: &[f64]) -> Result<f64, BackendError> {
        let x = match &self.scaler {
            Some(scaler) => scaler.apply(features)?,
            None => features.to_vec(),
        };
        let mut maps = vec![x];
        for layer in &self.conv {
            maps = layer.forward(&maps)?;
        }
        dense_head(&self.dense, maps.concat())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CnnPredictor;

impl Predictor for CnnPredictor {
    fn kind(&self) -> BackendKind {
        BackendKind::Cnn
    }

    fn load(&self, artifact: &Path) -> Result<Box<dyn Model>, BackendError> {
        Ok(Box::new(load_json::<CnnModel>(artifact)?))
    }
}
