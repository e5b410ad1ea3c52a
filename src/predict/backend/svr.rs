use std::path::Path;

use serde::Deserialize;

use super::{BackendError, BackendKind, Model, Predictor, Scaler, check_len, load_json};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Kernel {
    Linear,
    Rbf { gamma: f64 },
    Poly { gamma: f64, coef0: f64, degree: i32 },
    Sigmoid { gamma: f64, coef0: f64 },
}

impl Kernel {
    fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        let dot = || a.iter().zip(b).map(|(x, y)| x * y).sum::<f64>();
        match *self {
            Kernel::Linear => dot(),
            Kernel::Rbf { gamma } => {
                let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
                (-gamma * d2).exp()
            }
            Kernel::Poly { gamma, coef0, degree } => (gamma * dot() + coef0).powi(degree),
            Kernel::Sigmoid { gamma, coef0 } => (gamma * dot() + coef0).tanh(),
        }
    }
}

/// Epsilon-SVR decision function `sum(alpha_i * K(sv_i, x)) + b`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SvrModel {
    pub kernel: Kernel,
    pub support_vectors: Vec<Vec<f64>>,
    pub dual_coef: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub scaler: Option<Scaler>,
}

impl Model for SvrModel {
    fn predict(&self, features: &[f64]) -> Result<f64, BackendError> {
        if self.support_vectors.len() != self.dual_coef.len() {
            return Err(BackendError::Invalid(format!(
                "{} support vectors but {} dual coefficients",
                self.support_vectors.len(),
                self.dual_coef.len()
            )));
        }
        let x = match &self.scaler {
            Some(scaler) => scaler.apply(features)?,
            None => features.to_vec(),
        };
        let mut y = self.intercept;
        for (sv, alpha) in self.support_vectors.iter().zip(&self.dual_coef) {
            check_len(sv.len(), &x)?;
            y += alpha * self.kernel.eval(sv, &x);
        }
        Ok(y)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SvrPredictor;

impl Predictor for SvrPredictor {
    fn kind(&self) -> BackendKind {
        BackendKind::Svr
    }

    fn load(&self, artifact: &Path) -> Result<Box<dyn Model>, BackendError> {
        Ok(Box::new(load_json::<SvrModel>(artifact)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn linear_kernel_matches_hand_computation() {
        let model = SvrModel {
            kernel: Kernel::Linear,
            support_vectors: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            dual_coef: vec![2.0, -1.0],
            intercept: 0.5,
            scaler: None,
        };
        assert_eq!(model.predict(&[3.0, 4.0]).unwrap(), 0.5 + 6.0 - 4.0);
    }

    #[test]
    fn rbf_kernel_is_one_at_the_support_vector() {
        let model = SvrModel {
            kernel: Kernel::Rbf { gamma: 0.5 },
            support_vectors: vec![vec![1.0, 2.0]],
            dual_coef: vec![3.0],
            intercept: 0.0,
            scaler: None,
        };
        assert!((model.predict(&[1.0, 2.0]).unwrap() - 3.0).abs() < 1e-12);
        assert!(model.predict(&[1.0]).is_err());
    }

    #[test]
    fn loads_from_json_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("svr.json");
        fs::write(
            &path,
            r#"{"kernel":{"type":"poly","gamma":1.0,"coef0":1.0,"degree":2},
                "support_vectors":[[1.0]],"dual_coef":[1.0],"intercept":0.0,
                "scaler":{"mean":[1.0],"scale":[1.0]}}"#,
        )
        .unwrap();
        let y = SvrPredictor.predict(&path, &[3.0]).unwrap();
        assert_eq!(y, 9.0);
    }
}
