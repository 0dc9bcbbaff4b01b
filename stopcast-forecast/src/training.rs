//! Model training
//!
//! Loads (or first generates) the demand dataset, holds out a seeded test
//! split, fits the boosted regressor and saves the artifact. Recording the
//! resulting metrics is left to the caller, which owns the database.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::Path;
use tracing::info;

use stopcast_common::config::ForecastConfig;
use stopcast_common::time::parse_date;

use crate::dataset::{load_dataset, save_dataset, DemandRecord};
use crate::gbm::{BoostParams, GradientBoostedRegressor};
use crate::generator::{DataGenerator, GeneratorConfig};
use crate::metrics::RegressionMetrics;
use crate::model::ForecastModel;
use crate::{ForecastError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    pub model_version: String,
    pub params: BoostParams,
    pub test_fraction: f64,
    pub split_seed: u64,
    /// Used when the dataset file does not exist yet
    pub generator: GeneratorConfig,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            model_version: "v1.0".to_string(),
            params: BoostParams::default(),
            test_fraction: 0.2,
            split_seed: 42,
            generator: GeneratorConfig::default(),
        }
    }
}

impl TrainingOptions {
    pub fn from_config(config: &ForecastConfig) -> Result<Self> {
        Ok(Self {
            model_version: config.model_version.clone(),
            params: BoostParams {
                n_estimators: config.n_estimators,
                max_depth: config.max_depth,
                learning_rate: config.learning_rate,
                subsample: config.subsample,
                colsample_bytree: config.colsample_bytree,
                min_samples_leaf: config.min_samples_leaf,
            },
            test_fraction: config.test_fraction,
            split_seed: config.seed,
            generator: GeneratorConfig {
                start: parse_date(&config.dataset_start)?,
                end: parse_date(&config.dataset_end)?,
                max_records: config.max_records,
                seed: config.seed,
            },
        })
    }
}

/// Result of one training run
#[derive(Debug)]
pub struct TrainingOutcome {
    pub model: ForecastModel,
    pub train_metrics: RegressionMetrics,
    pub test_metrics: RegressionMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
    /// The dataset file was created by this run
    pub dataset_generated: bool,
}

/// Shuffle row indices and split off `test_fraction` of them
///
/// Returns `(train, test)`; the test side always has at least one row when
/// there are two or more rows.
pub fn train_test_split(n_rows: usize, test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..n_rows).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));

    let mut n_test = (n_rows as f64 * test_fraction).ceil() as usize;
    if n_rows >= 2 {
        n_test = n_test.clamp(1, n_rows - 1);
    } else {
        n_test = 0;
    }

    let train = indices.split_off(n_test);
    (train, indices)
}

fn matrix(records: &[DemandRecord], rows: &[usize]) -> (Vec<Vec<f64>>, Vec<f64>) {
    rows.iter()
        .map(|&i| {
            let r = &records[i];
            (r.features.to_array().to_vec(), r.passenger_count)
        })
        .unzip()
}

/// Fit and evaluate on in-memory records
pub fn train_on_records(
    records: &[DemandRecord],
    options: &TrainingOptions,
) -> Result<TrainingOutcome> {
    if records.len() < 2 {
        return Err(ForecastError::InvalidDataset(format!(
            "need at least 2 records to train, got {}",
            records.len()
        )));
    }
    if !(options.test_fraction > 0.0 && options.test_fraction < 1.0) {
        return Err(ForecastError::InvalidParams(
            "test_fraction must be in (0, 1)".to_string(),
        ));
    }

    let (train_idx, test_idx) =
        train_test_split(records.len(), options.test_fraction, options.split_seed);
    let (x_train, y_train) = matrix(records, &train_idx);
    let (x_test, y_test) = matrix(records, &test_idx);

    info!(
        train_rows = x_train.len(),
        test_rows = x_test.len(),
        n_estimators = options.params.n_estimators,
        "Training gradient-boosted model"
    );

    let regressor = GradientBoostedRegressor::fit(&x_train, &y_train, &options.params)?;

    let train_metrics = RegressionMetrics::compute(&y_train, &regressor.predict_batch(&x_train));
    let test_metrics = RegressionMetrics::compute(&y_test, &regressor.predict_batch(&x_test));

    info!(
        r2 = train_metrics.r2_score,
        mae = train_metrics.mae,
        rmse = train_metrics.rmse,
        "Training metrics"
    );
    info!(
        r2 = test_metrics.r2_score,
        mae = test_metrics.mae,
        rmse = test_metrics.rmse,
        "Test metrics"
    );

    Ok(TrainingOutcome {
        model: ForecastModel::new(options.model_version.clone(), regressor),
        train_metrics,
        test_metrics,
        train_rows: x_train.len(),
        test_rows: x_test.len(),
        dataset_generated: false,
    })
}

/// Train from the dataset file and save the artifact to `model_path`
///
/// Generates and saves the dataset first when `dataset_path` is missing.
/// Blocking; async callers should run it on a blocking thread.
pub fn train_forecasting_model(
    dataset_path: &Path,
    model_path: &Path,
    options: &TrainingOptions,
) -> Result<TrainingOutcome> {
    let (records, generated) = if dataset_path.exists() {
        info!("Loading existing dataset {}", dataset_path.display());
        (load_dataset(dataset_path)?, false)
    } else {
        info!("Generating new dataset {}", dataset_path.display());
        let records = DataGenerator::new(options.generator.seed).generate(&options.generator)?;
        save_dataset(dataset_path, &records)?;
        (records, true)
    };

    let mut outcome = train_on_records(&records, options)?;
    outcome.dataset_generated = generated;
    outcome.model.save(model_path)?;

    info!("Model training completed successfully");
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let (train, test) = train_test_split(100, 0.2, 42);
        assert_eq!(test.len(), 20);
        assert_eq!(train.len(), 80);

        let all: HashSet<_> = train.iter().chain(test.iter()).copied().collect();
        assert_eq!(all.len(), 100);
    }

    #[test]
    fn test_split_is_seeded() {
        assert_eq!(train_test_split(50, 0.2, 42), train_test_split(50, 0.2, 42));
        assert_ne!(train_test_split(50, 0.2, 42), train_test_split(50, 0.2, 43));
    }

    #[test]
    fn test_split_keeps_both_sides_non_empty() {
        let (train, test) = train_test_split(3, 0.01, 1);
        assert_eq!(test.len(), 1);
        assert_eq!(train.len(), 2);
    }

    #[test]
    fn test_options_from_config() {
        let config = ForecastConfig::default();
        let options = TrainingOptions::from_config(&config).unwrap();
        assert_eq!(options.params.n_estimators, 200);
        assert_eq!(options.generator.max_records, 60_000);
        assert_eq!(options.generator.start.to_string(), "2023-01-01");

        let bad = ForecastConfig {
            dataset_start: "01/01/2023".to_string(),
            ..ForecastConfig::default()
        };
        assert!(TrainingOptions::from_config(&bad).is_err());
    }

    #[test]
    fn test_train_rejects_tiny_dataset() {
        let err = train_on_records(&[], &TrainingOptions::default()).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidDataset(_)));
    }
}
