//! PET regressor and the prediction service around it.
//!
//! The trained random forest is exported to JSON:
//!
//! ```json
//! { "feature_names": ["SVF", "GVI", "BVI", "AirTemperature", "Humidity", "WindSpeed"],
//!   "trees": [ { "nodes": [ { "feature": 3, "threshold": 24.5, "left": 1, "right": 2 },
//!                           { "value": 28.1 },
//!                           { "value": 33.4 } ] } ] }
//! ```
//!
//! A split sends `x[feature] <= threshold` left. The forest predicts the mean
//! of its trees. Node 0 is the root and children always come after their parent.

use std::{path::Path, sync::Arc};

use log::info;
use serde::Deserialize;

use crate::{FeatureVector, FEATURE_NAMES};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to read model file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("model file is not a valid forest export: {0}")]
    Format(#[from] serde_json::Error),
    #[error("model was trained on {found:?}, estimator provides {expected:?}")]
    FeatureMismatch {
        found: Vec<String>,
        expected: Vec<String>,
    },
    #[error("model contains no trees")]
    NoTrees,
    #[error("tree {tree} is malformed: {reason}")]
    MalformedTree { tree: usize, reason: String },
    #[error("feature {name} is not finite: {value}")]
    NonFiniteInput { name: &'static str, value: f64 },
    #[error("model produced a non-finite prediction")]
    NonFiniteOutput,
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Opaque `features -> PET` function, shared read-only across requests
pub trait Regressor: Send + Sync {
    fn predict(&self, features: &FeatureVector) -> Result<f64, Error>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn validate(&self, tree: usize) -> Result<(), Error> {
        let malformed = |reason: String| Error::MalformedTree { tree, reason };
        if self.nodes.is_empty() {
            return Err(malformed("no nodes".to_string()));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            match *node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= FEATURE_NAMES.len() {
                        return Err(malformed(format!("node {} splits on feature {}", i, feature)));
                    }
                    if !threshold.is_finite() {
                        return Err(malformed(format!("node {} has a non-finite threshold", i)));
                    }
                    for child in [left, right] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(malformed(format!(
                                "node {} points to invalid child {}",
                                i, child
                            )));
                        }
                    }
                }
                Node::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(malformed(format!("leaf {} has a non-finite value", i)));
                    }
                }
            }
        }
        Ok(())
    }

    fn evaluate(&self, x: &[f64; 6]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[feature] <= threshold { left } else { right };
                }
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForestModel {
    feature_names: Vec<String>,
    trees: Vec<Tree>,
}

impl ForestModel {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        let model = Self::from_json(&content)?;
        info!(
            "loaded forest model from {} ({} trees)",
            path.display(),
            model.trees.len()
        );
        Ok(model)
    }

    /// Parse and validate; a structurally unsound export never loads.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let model: ForestModel = serde_json::from_str(json)?;

        if model.feature_names != FEATURE_NAMES {
            return Err(Error::FeatureMismatch {
                found: model.feature_names,
                expected: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
            });
        }
        if model.trees.is_empty() {
            return Err(Error::NoTrees);
        }
        for (i, tree) in model.trees.iter().enumerate() {
            tree.validate(i)?;
        }
        Ok(model)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for ForestModel {
    fn predict(&self, features: &FeatureVector) -> Result<f64, Error> {
        let x = features.as_array();
        let total: f64 = self.trees.iter().map(|tree| tree.evaluate(&x)).sum();
        Ok(total / self.trees.len() as f64)
    }
}

/// Guards the regressor: inputs and output must be finite, failures are final.
#[derive(Clone)]
pub struct PredictionService {
    model: Arc<dyn Regressor>,
}

impl PredictionService {
    pub fn new(model: Arc<dyn Regressor>) -> Self {
        Self { model }
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<f64, Error> {
        if let Some((name, value)) = features.named().find(|(_, v)| !v.is_finite()) {
            return Err(Error::NonFiniteInput { name, value });
        }

        let pet = self.model.predict(features)?;
        if !pet.is_finite() {
            return Err(Error::NonFiniteOutput);
        }
        Ok(pet)
    }
}
