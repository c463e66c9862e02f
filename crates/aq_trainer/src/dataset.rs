//! Encoded training matrices and row splits

use aircast_core::{ColumnTransformer, FeatureRecord, FeatureRow};

use crate::deterministic::{permutation, KFOLD_STREAM, SPLIT_STREAM};
use crate::errors::TrainerError;

/// Feature rows and targets before encoding
#[derive(Debug, Clone, Default)]
pub struct Samples {
    pub rows: Vec<FeatureRow>,
    pub targets: Vec<f64>,
}

impl Samples {
    pub fn from_records(records: &[FeatureRecord]) -> Self {
        Self {
            rows: records.iter().map(FeatureRecord::to_row).collect(),
            targets: records.iter().map(|r| r.pm25).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn select(&self, indices: &[usize]) -> Samples {
        Samples {
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
        }
    }
}

/// Numeric training matrix produced by a fitted preprocessor
#[derive(Debug, Clone)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
    pub feature_names: Vec<String>,
}

/// Per-column range used for logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl Dataset {
    pub fn encode(samples: &Samples, transformer: &ColumnTransformer) -> Result<Self, TrainerError> {
        let features = samples
            .rows
            .iter()
            .map(|row| transformer.transform(row))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(i) = samples.targets.iter().position(|t| !t.is_finite()) {
            return Err(TrainerError::Dataset(format!(
                "row {i} has a non-finite target"
            )));
        }

        Ok(Self {
            features,
            targets: samples.targets.clone(),
            feature_names: transformer.output_names(),
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_stats(&self) -> Vec<FeatureStats> {
        (0..self.feature_count())
            .map(|j| {
                let mut stats = FeatureStats {
                    min: f64::INFINITY,
                    max: f64::NEG_INFINITY,
                    mean: 0.0,
                };
                for row in &self.features {
                    stats.min = stats.min.min(row[j]);
                    stats.max = stats.max.max(row[j]);
                    stats.mean += row[j];
                }
                if !self.is_empty() {
                    stats.mean /= self.len() as f64;
                }
                stats
            })
            .collect()
    }
}

/// Seeded train/test split of `0..n`: `ceil(n * test_fraction)` rows go to test.
///
/// Returns `(train, test)`.
pub fn train_test_split(
    n: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), TrainerError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(TrainerError::InvalidParams(format!(
            "test_fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(TrainerError::Dataset(format!(
            "{n} rows cannot be split with test_fraction {test_fraction}"
        )));
    }

    let mut order = permutation(n, seed, SPLIT_STREAM);
    let train = order.split_off(n_test);
    Ok((train, order))
}

/// Seeded k-fold partition of `0..n` into contiguous folds of the shuffled order.
///
/// The first `n % k` folds hold one extra row. Returns `(train, validation)` per fold.
pub fn kfold(n: usize, k: usize, seed: u64) -> Result<Vec<(Vec<usize>, Vec<usize>)>, TrainerError> {
    if k < 2 {
        return Err(TrainerError::InvalidParams(format!(
            "k-fold needs at least 2 folds, got {k}"
        )));
    }
    if k > n {
        return Err(TrainerError::InvalidParams(format!(
            "cannot make {k} folds from {n} rows"
        )));
    }

    let order = permutation(n, seed, KFOLD_STREAM);
    let base = n / k;
    let extra = n % k;

    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < extra);
        let end = start + size;
        let validation = order[start..end].to_vec();
        let train = order[..start]
            .iter()
            .chain(&order[end..])
            .copied()
            .collect();
        folds.push((train, validation));
        start = end;
    }
    Ok(folds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_split_sizes() {
        let (train, test) = train_test_split(1000, 0.2, 42).unwrap();
        assert_eq!(test.len(), 200);
        assert_eq!(train.len(), 800);

        // ceil(11 * 0.2) = 3
        let (train, test) = train_test_split(11, 0.2, 42).unwrap();
        assert_eq!((train.len(), test.len()), (8, 3));
    }

    #[test]
    fn test_split_is_a_partition() {
        let (train, test) = train_test_split(50, 0.3, 7).unwrap();
        let all: BTreeSet<usize> = train.iter().chain(&test).copied().collect();
        assert_eq!(all.len(), 50);
        assert_eq!(train_test_split(50, 0.3, 7).unwrap(), (train, test));
    }

    #[test]
    fn test_degenerate_split() {
        assert!(train_test_split(1, 0.2, 42).is_err());
        assert!(train_test_split(10, 0.0, 42).is_err());
        assert!(train_test_split(10, 1.0, 42).is_err());
    }

    #[test]
    fn test_kfold_covers_every_row_once() {
        let folds = kfold(23, 5, 42).unwrap();
        assert_eq!(folds.len(), 5);

        let sizes: Vec<usize> = folds.iter().map(|(_, v)| v.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 4, 4]);

        let mut seen = vec![0usize; 23];
        for (train, validation) in &folds {
            assert_eq!(train.len() + validation.len(), 23);
            for &i in validation {
                seen[i] += 1;
                assert!(!train.contains(&i));
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn test_kfold_bounds() {
        assert!(kfold(3, 5, 42).is_err());
        assert!(kfold(10, 1, 42).is_err());
        assert_eq!(kfold(5, 5, 42).unwrap().len(), 5);
    }
}
