//! Random forest fitting
//!
//! Each tree is grown on a bootstrap sample (n draws with replacement) from its
//! own seeded stream, so trees can be built on any rayon thread in any order
//! and the forest is still identical run to run.

use aircast_core::{Forest, Tree};
use rand::Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::cart::{CartBuilder, TreeConfig};
use crate::dataset::Dataset;
use crate::deterministic::seeded_rng;
use crate::errors::TrainerError;

#[derive(Clone, Debug, PartialEq)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub tree: TreeConfig,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            tree: TreeConfig::default(),
            bootstrap: true,
            seed: 42,
        }
    }
}

pub struct ForestTrainer {
    config: ForestConfig,
}

impl ForestTrainer {
    pub fn new(config: ForestConfig) -> Self {
        Self { config }
    }

    pub fn fit(&self, dataset: &Dataset) -> Result<Forest, TrainerError> {
        if dataset.is_empty() {
            return Err(TrainerError::Training(
                "cannot fit a forest on zero rows".to_string(),
            ));
        }
        if self.config.n_estimators == 0 {
            return Err(TrainerError::InvalidParams(
                "n_estimators must be at least 1".to_string(),
            ));
        }

        let n = dataset.len();
        let trees: Vec<Tree> = (0..self.config.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let sample: Vec<usize> = if self.config.bootstrap {
                    let mut rng = seeded_rng(self.config.seed, tree_idx as u64);
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                CartBuilder::new(&dataset.features, &dataset.targets, &self.config.tree)
                    .build(&sample)
            })
            .collect();

        let forest = Forest::new(dataset.feature_count(), trees);
        debug!(
            trees = forest.num_trees(),
            max_depth = forest.max_depth(),
            rows = n,
            "forest fitted"
        );
        Ok(forest)
    }
}
