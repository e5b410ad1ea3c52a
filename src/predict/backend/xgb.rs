use std::path::Path;

use serde::Deserialize;

use super::{BackendError, BackendKind, Model, Predictor, load_json};

/// One node of a boosted tree, indexed by position in [`Tree::nodes`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        yes: usize,
        no: usize,
        missing: usize,
    },
    Leaf {
        leaf: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn eval(&self, features: &[f64]) -> Result<f64, BackendError> {
        let mut idx = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..=self.nodes.len() {
            let node = self
                .nodes
                .get(idx)
                .ok_or_else(|| BackendError::Invalid(format!("tree node {idx} does not exist")))?;
            match *node {
                TreeNode::Leaf { leaf } => return Ok(leaf),
                TreeNode::Split {
                    feature,
                    threshold,
                    yes,
                    no,
                    missing,
                } => {
                    let value = features.get(feature).copied().ok_or(BackendError::FeatureLength {
                        expected: feature + 1,
                        found: features.len(),
                    })?;
                    idx = if value.is_nan() {
                        missing
                    } else if value < threshold {
                        yes
                    } else {
                        no
                    };
                }
            }
        }
        Err(BackendError::Invalid("tree contains a cycle".into()))
    }
}

/// Gradient-boosted regression trees: `base_score + sum(tree leaves)`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct XgbModel {
    #[serde(default = "default_base_score")]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

fn default_base_score() -> f64 {
    0.5
}

impl Model for XgbModel {
    fn predict(&self, features: &[f64]) -> Result<f64, BackendError> {
        self.trees
            .iter()
            .try_fold(self.base_score, |acc, tree| Ok(acc + tree.eval(features)?))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XgbPredictor;

impl Predictor for XgbPredictor {
    fn kind(&self) -> BackendKind {
        BackendKind::Xgb
    }

    fn load(&self, artifact: &Path) -> Result<Box<dyn Model>, BackendError> {
        Ok(Box::new(load_json::<XgbModel>(artifact)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn stump(feature: usize, threshold: f64, low: f64, high: f64) -> Tree {
        Tree {
            nodes: vec![
                TreeNode::Split {
                    feature,
                    threshold,
                    yes: 1,
                    no: 2,
                    missing: 2,
                },
                TreeNode::Leaf { leaf: low },
                TreeNode::Leaf { leaf: high },
            ],
        }
    }

    #[test]
    fn sums_leaves_over_trees() {
        let model = XgbModel {
            base_score: 0.5,
            trees: vec![stump(0, 1.0, -1.0, 1.0), stump(1, 0.0, 0.25, 0.75)],
        };
        assert_eq!(model.predict(&[0.0, 5.0]).unwrap(), 0.5 - 1.0 + 0.75);
        assert_eq!(model.predict(&[f64::NAN, -1.0]).unwrap(), 0.5 + 1.0 + 0.25);
    }

    #[test]
    fn short_feature_vectors_are_rejected() {
        let model = XgbModel {
            base_score: 0.0,
            trees: vec![stump(3, 1.0, 0.0, 1.0)],
        };
        assert!(matches!(
            model.predict(&[1.0]),
            Err(BackendError::FeatureLength { expected: 4, found: 1 })
        ));
    }

    #[test]
    fn cyclic_trees_are_rejected() {
        let tree = Tree {
            nodes: vec![TreeNode::Split {
                feature: 0,
                threshold: 1.0,
                yes: 0,
                no: 0,
                missing: 0,
            }],
        };
        assert!(matches!(tree.eval(&[0.0]), Err(BackendError::Invalid(_))));
    }

    #[test]
    fn parses_json_nodes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("xgb.json");
        fs::write(
            &path,
            r#"{"trees":[{"nodes":[
                {"feature":0,"threshold":2.0,"yes":1,"no":2,"missing":1},
                {"leaf":0.1},{"leaf":0.9}]}]}"#,
        )
        .unwrap();
        let y = XgbPredictor.predict(&path, &[3.0]).unwrap();
        assert!((y - 1.4).abs() < 1e-12);
    }
}
