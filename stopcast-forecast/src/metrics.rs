//! Regression accuracy metrics

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub r2_score: f64,
    pub mae: f64,
    pub rmse: f64,
}

impl RegressionMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        Self {
            r2_score: r2_score(actual, predicted),
            mae: mean_absolute_error(actual, predicted),
            rmse: root_mean_squared_error(actual, predicted),
        }
    }
}

/// Coefficient of determination
///
/// A constant target scores 1.0 when predicted exactly, 0.0 otherwise.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let mean = actual[..n].iter().sum::<f64>() / n as f64;
    let ss_tot: f64 = actual[..n].iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual[..n]
        .iter()
        .zip(&predicted[..n])
        .map(|(y, p)| (y - p).powi(2))
        .sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).abs())
        .sum::<f64>()
        / n as f64
}

pub fn root_mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len().min(predicted.len());
    if n == 0 {
        return 0.0;
    }
    let mse = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum::<f64>()
        / n as f64;
    mse.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_prediction() {
        let y = [1.0, 2.0, 3.0, 4.0];
        let m = RegressionMetrics::compute(&y, &y);
        assert_eq!(m.r2_score, 1.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
    }

    #[test]
    fn test_known_values() {
        let y = [3.0, -0.5, 2.0, 7.0];
        let p = [2.5, 0.0, 2.0, 8.0];
        assert!((mean_absolute_error(&y, &p) - 0.5).abs() < 1e-12);
        assert!((root_mean_squared_error(&y, &p) - 0.375f64.sqrt()).abs() < 1e-12);
        assert!((r2_score(&y, &p) - 0.948_608_137_044_967_9).abs() < 1e-9);
    }

    #[test]
    fn test_mean_predictor_scores_zero() {
        let y = [1.0, 2.0, 3.0];
        let p = [2.0, 2.0, 2.0];
        assert!(r2_score(&y, &p).abs() < 1e-12);
    }

    #[test]
    fn test_empty_inputs() {
        let m = RegressionMetrics::compute(&[], &[]);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
    }
}
