use std::path::Path;

use serde::Deserialize;

use super::{BackendError, BackendKind, DenseLayer, Model, Predictor, Scaler, dense_head, load_json};

/// Multilayer perceptron with a single output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DnnModel {
    pub layers: Vec<DenseLayer>,
    #[serde(default)]
    pub scaler: Option<Scaler>,
}

impl Model for DnnModel {
    fn predict(&self, features: &[f64]) -> Result<f64, BackendError> {
        let x = match &self.scaler {
            Some(scaler) => scaler.apply(features)?,
            None => features.to_vec(),
        };
        dense_head(&self.layers, x)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DnnPredictor;

impl Predictor for DnnPredictor {
    fn kind(&self) -> BackendKind {
        BackendKind::Dnn
    }

    fn load(&self, artifact: &Path) -> Result<Box<dyn Model>, BackendError> {
        Ok(Box::new(load_json::<DnnModel>(artifact)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn runs_layers_from_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dnn.json");
        fs::write(
            &path,
            r#"{"layers":[
                {"weights":[[1.0,1.0],[1.0,-1.0]],"bias":[0.0,0.0],"activation":"relu"},
                {"weights":[[1.0,10.0]],"bias":[-1.0]}]}"#,
        )
        .unwrap();
        // hidden = relu([5, -1]) = [5, 0]; out = 5 - 1
        assert_eq!(DnnPredictor.predict(&path, &[2.0, 3.0]).unwrap(), 4.0);
    }

    #[test]
    fn wrong_width_is_an_error() {
        let model = DnnModel {
            layers: vec![DenseLayer {
                weights: vec![vec![1.0, 1.0]],
                bias: vec![0.0],
                activation: Default::default(),
            }],
            scaler: None,
        };
        assert!(matches!(
            model.predict(&[1.0, 2.0, 3.0]),
            Err(BackendError::FeatureLength { expected: 2, found: 3 })
        ));
    }
}
