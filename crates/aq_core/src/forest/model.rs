//! Random forest regressor (inference side)
//!
//! The prediction is the arithmetic mean of all tree outputs, accumulated in tree
//! order so a given forest and input always produce the same bits.

use super::tree::Tree;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Forest errors
#[derive(Error, Debug, PartialEq)]
pub enum ForestError {
    #[error("Forest validation failed: {0}")]
    ValidationFailed(String),

    #[error("Expected {expected} encoded features, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("Tree {0} could not be evaluated")]
    BrokenTree(usize),
}

/// Forest format version written into every bundle
pub const FOREST_FORMAT_VERSION: u32 = 1;

/// An ensemble of regression trees averaged for prediction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Forest {
    pub version: u32,
    /// Width of the encoded feature vector the trees were fitted on
    pub n_features: usize,
    pub trees: Vec<Tree>,
}

impl Forest {
    pub fn new(n_features: usize, trees: Vec<Tree>) -> Self {
        Self {
            version: FOREST_FORMAT_VERSION,
            n_features,
            trees,
        }
    }

    pub fn validate(&self) -> Result<(), ForestError> {
        if self.version != FOREST_FORMAT_VERSION {
            return Err(ForestError::ValidationFailed(format!(
                "Unsupported forest version: {}",
                self.version
            )));
        }
        if self.trees.is_empty() {
            return Err(ForestError::ValidationFailed(
                "Forest has no trees".to_string(),
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(self.n_features).map_err(|e| {
                ForestError::ValidationFailed(format!("Tree {i} validation failed: {e}"))
            })?;
        }
        Ok(())
    }

    /// Mean of tree outputs for one encoded feature vector.
    pub fn predict(&self, features: &[f64]) -> Result<f64, ForestError> {
        if features.len() != self.n_features {
            return Err(ForestError::WidthMismatch {
                expected: self.n_features,
                actual: features.len(),
            });
        }
        if self.trees.is_empty() {
            return Err(ForestError::ValidationFailed(
                "Forest has no trees".to_string(),
            ));
        }

        let mut sum = 0.0;
        for (i, tree) in self.trees.iter().enumerate() {
            sum += tree.evaluate(features).ok_or(ForestError::BrokenTree(i))?;
        }
        Ok(sum / self.trees.len() as f64)
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(Tree::depth).max().unwrap_or(0)
    }
}
