//! Gradient-boosted regression trees
//!
//! Wraps the `gbdt` crate's squared-error booster behind the `f64` row
//! interface the rest of the crate uses. Row and column sampling happen
//! inside `gbdt` and are not seeded; a fit is reproducible only when
//! `subsample` and `colsample_bytree` are both 1.0.

use gbdt::config::Config as BoosterConfig;
use gbdt::decision_tree::{Data, DataVec, ValueType};
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::{ForecastError, Result};

/// Boosting hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows drawn per tree
    pub subsample: f64,
    /// Fraction of features considered per tree
    pub colsample_bytree: f64,
    pub min_samples_leaf: usize,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 6,
            learning_rate: 0.1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            min_samples_leaf: 5,
        }
    }
}

impl BoostParams {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ForecastError::InvalidParams(msg.to_string()));

        if self.n_estimators == 0 {
            return invalid("n_estimators must be at least 1");
        }
        if self.max_depth == 0 {
            return invalid("max_depth must be at least 1");
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return invalid("learning_rate must be in (0, 1]");
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return invalid("subsample must be in (0, 1]");
        }
        if !(self.colsample_bytree > 0.0 && self.colsample_bytree <= 1.0) {
            return invalid("colsample_bytree must be in (0, 1]");
        }
        if self.min_samples_leaf == 0 {
            return invalid("min_samples_leaf must be at least 1");
        }
        Ok(())
    }

    fn booster_config(&self, n_features: usize) -> Result<BoosterConfig> {
        let mut config = BoosterConfig::new();
        config.set_feature_size(n_features);
        config.set_max_depth(self.max_depth.try_into().map_err(|_| {
            ForecastError::InvalidParams(format!("max_depth {} is too large", self.max_depth))
        })?);
        config.set_iterations(self.n_estimators);
        config.set_shrinkage(self.learning_rate as ValueType);
        config.set_data_sample_ratio(self.subsample);
        config.set_feature_sample_ratio(self.colsample_bytree);
        config.set_min_leaf_size(self.min_samples_leaf);
        config.set_loss("SquaredError");
        Ok(config)
    }
}

/// Trained booster plus the input width it was fitted on
#[derive(Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    n_features: usize,
    n_estimators: usize,
    booster: GBDT,
}

impl fmt::Debug for GradientBoostedRegressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradientBoostedRegressor")
            .field("n_features", &self.n_features)
            .field("n_estimators", &self.n_estimators)
            .finish_non_exhaustive()
    }
}

impl GradientBoostedRegressor {
    /// Fit on row-major `x` against targets `y`
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &BoostParams) -> Result<Self> {
        params.validate()?;

        let n_features = match x.first() {
            Some(row) if !row.is_empty() => row.len(),
            Some(_) => return Err(ForecastError::InvalidDataset("rows have no features".into())),
            None => return Err(ForecastError::InvalidDataset("no training rows".into())),
        };
        if x.len() != y.len() {
            return Err(ForecastError::InvalidDataset(format!(
                "{} rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        if x.iter().any(|row| row.len() != n_features) {
            return Err(ForecastError::InvalidDataset("rows have differing feature counts".into()));
        }
        if y.iter().chain(x.iter().flatten()).any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidDataset(
                "training data contains non-finite values".into(),
            ));
        }

        let mut data: DataVec = x
            .iter()
            .zip(y)
            .map(|(row, &target)| {
                Data::new_training_data(to_values(row), 1.0, target as ValueType, None)
            })
            .collect();

        let mut booster = GBDT::new(&params.booster_config(n_features)?);
        booster.fit(&mut data);

        debug!(
            rows = x.len(),
            trees = params.n_estimators,
            depth = params.max_depth,
            "Boosted regressor fitted"
        );

        Ok(Self {
            n_features,
            n_estimators: params.n_estimators,
            booster,
        })
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let data: DataVec = vec![Data::new_test_data(to_values(row), None)];
        self.booster
            .predict(&data)
            .first()
            .map_or(f64::NAN, |&v| f64::from(v))
    }

    pub fn predict_batch(&self, x: &[Vec<f64>]) -> Vec<f64> {
        if x.is_empty() {
            return Vec::new();
        }
        let data: DataVec = x
            .iter()
            .map(|row| Data::new_test_data(to_values(row), None))
            .collect();
        self.booster.predict(&data).into_iter().map(f64::from).collect()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }
}

fn to_values(row: &[f64]) -> Vec<ValueType> {
    row.iter().map(|&v| v as ValueType).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_sampling(n_estimators: usize) -> BoostParams {
        BoostParams {
            n_estimators,
            max_depth: 3,
            learning_rate: 0.3,
            subsample: 1.0,
            colsample_bytree: 1.0,
            min_samples_leaf: 1,
        }
    }

    /// y = 3 * x0 on a grid, x1 is irrelevant
    fn linear_grid() -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..60)
            .map(|i| vec![i as f64, ((i * 7) % 11) as f64])
            .collect();
        let y = x.iter().map(|r| 3.0 * r[0]).collect();
        (x, y)
    }

    fn mse(model: &GradientBoostedRegressor, x: &[Vec<f64>], y: &[f64]) -> f64 {
        let predicted = model.predict_batch(x);
        predicted
            .iter()
            .zip(y)
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / y.len() as f64
    }

    #[test]
    fn test_more_rounds_reduce_training_error() {
        let (x, y) = linear_grid();
        let short = GradientBoostedRegressor::fit(&x, &y, &full_sampling(2)).unwrap();
        let long = GradientBoostedRegressor::fit(&x, &y, &full_sampling(60)).unwrap();

        let variance = {
            let mean = y.iter().sum::<f64>() / y.len() as f64;
            y.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / y.len() as f64
        };
        assert!(mse(&long, &x, &y) < mse(&short, &x, &y));
        assert!(mse(&long, &x, &y) < 0.05 * variance);
    }

    #[test]
    fn test_full_sampling_fit_is_reproducible() {
        let (x, y) = linear_grid();
        let a = GradientBoostedRegressor::fit(&x, &y, &full_sampling(20)).unwrap();
        let b = GradientBoostedRegressor::fit(&x, &y, &full_sampling(20)).unwrap();

        for (pa, pb) in a.predict_batch(&x).iter().zip(b.predict_batch(&x)) {
            assert!((pa - pb).abs() < 1e-6);
        }
    }

    #[test]
    fn test_serialized_model_predicts_identically() {
        let (x, y) = linear_grid();
        let model = GradientBoostedRegressor::fit(&x, &y, &full_sampling(10)).unwrap();

        let json = serde_json::to_string(&model).unwrap();
        let restored: GradientBoostedRegressor = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.n_features(), 2);
        assert_eq!(restored.n_estimators(), 10);
        assert_eq!(model.predict(&x[17]), restored.predict(&x[17]));
    }

    #[test]
    fn test_rejects_bad_input() {
        let params = BoostParams::default();
        assert!(GradientBoostedRegressor::fit(&[], &[], &params).is_err());
        assert!(GradientBoostedRegressor::fit(&[vec![1.0]], &[1.0, 2.0], &params).is_err());
        assert!(
            GradientBoostedRegressor::fit(&[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0], &params)
                .is_err()
        );
        assert!(GradientBoostedRegressor::fit(&[vec![f64::NAN]], &[1.0], &params).is_err());

        let bad = BoostParams {
            learning_rate: 0.0,
            ..BoostParams::default()
        };
        assert!(matches!(
            GradientBoostedRegressor::fit(&[vec![1.0]], &[1.0], &bad),
            Err(ForecastError::InvalidParams(_))
        ));
    }
}
