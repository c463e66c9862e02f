//! Regression scores

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionScores {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
}

impl RegressionScores {
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        Self {
            mae: mae(y_true, y_pred),
            rmse: rmse(y_true, y_pred),
            r2: r2(y_true, y_pred),
        }
    }

    /// Element-wise mean over several score sets (e.g. cross-validation folds).
    pub fn mean(scores: &[RegressionScores]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        let n = scores.len() as f64;
        Some(Self {
            mae: scores.iter().map(|s| s.mae).sum::<f64>() / n,
            rmse: scores.iter().map(|s| s.rmse).sum::<f64>() / n,
            r2: scores.iter().map(|s| s.r2).sum::<f64>() / n,
        })
    }
}

pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    debug_assert_eq!(y_true.len(), y_pred.len());
    if y_true.is_empty() {
        return 0.0;
    }
    let total: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum();
    total / y_true.len() as f64
}

pub fn mse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    debug_assert_eq!(y_true.len(), y_pred.len());
    if y_true.is_empty() {
        return 0.0;
    }
    let total: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    total / y_true.len() as f64
}

/// Square root of the mean squared error.
pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mse(y_true, y_pred).sqrt()
}

/// Coefficient of determination. With a constant `y_true` it is 1.0 for a
/// perfect prediction and 0.0 otherwise.
pub fn r2(y_true: &[f64], y_pred: &[f64]) -> f64 {
    debug_assert_eq!(y_true.len(), y_pred.len());
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean) * (t - mean)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        let y_true = [3.0, -0.5, 2.0, 7.0];
        let y_pred = [2.5, 0.0, 2.0, 8.0];
        assert_eq!(mae(&y_true, &y_pred), 0.5);
        assert_eq!(mse(&y_true, &y_pred), 0.375);
        assert!((rmse(&y_true, &y_pred) - 0.375f64.sqrt()).abs() < 1e-15);
        assert!((r2(&y_true, &y_pred) - 0.948_608_137_044_967_9).abs() < 1e-12);
    }

    #[test]
    fn test_perfect_prediction() {
        let y = [1.0, 2.0, 3.0];
        let scores = RegressionScores::compute(&y, &y);
        assert_eq!(scores, RegressionScores { mae: 0.0, rmse: 0.0, r2: 1.0 });
    }

    #[test]
    fn test_constant_target_r2() {
        assert_eq!(r2(&[4.0, 4.0], &[4.0, 4.0]), 1.0);
        assert_eq!(r2(&[4.0, 4.0], &[4.0, 5.0]), 0.0);
    }

    #[test]
    fn test_mean_of_scores() {
        let a = RegressionScores { mae: 1.0, rmse: 2.0, r2: 0.5 };
        let b = RegressionScores { mae: 3.0, rmse: 4.0, r2: 0.7 };
        let mean = RegressionScores::mean(&[a, b]).unwrap();
        assert_eq!(mean.mae, 2.0);
        assert_eq!(mean.rmse, 3.0);
        assert!((mean.r2 - 0.6).abs() < 1e-12);
        assert!(RegressionScores::mean(&[]).is_none());
    }
}
