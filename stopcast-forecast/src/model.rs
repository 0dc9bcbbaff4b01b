//! Versioned model artifact

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::features::{FeatureVector, FEATURE_COLUMNS};
use crate::gbm::GradientBoostedRegressor;
use crate::{ForecastError, Result};

/// Anything that maps a feature vector to an hourly passenger estimate
pub trait DemandModel: Send + Sync {
    fn predict_demand(&self, features: &FeatureVector) -> Result<f64>;
}

/// Trained regressor plus the metadata needed to use it safely
#[derive(Debug, Serialize, Deserialize)]
pub struct ForecastModel {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub feature_columns: Vec<String>,
    regressor: GradientBoostedRegressor,
}

impl ForecastModel {
    pub fn new(version: impl Into<String>, regressor: GradientBoostedRegressor) -> Self {
        Self {
            version: version.into(),
            trained_at: Utc::now(),
            feature_columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            regressor,
        }
    }

    pub fn regressor(&self) -> &GradientBoostedRegressor {
        &self.regressor
    }

    /// Write the artifact as JSON, replacing any previous file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Readers only ever see a complete artifact
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;

        info!(version = %self.version, "Model saved to {}", path.display());
        Ok(())
    }

    /// Load an artifact; `Ok(None)` when the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let bytes = std::fs::read(path)?;
        let model: ForecastModel = serde_json::from_slice(&bytes)?;
        model.check_columns()?;

        info!(version = %model.version, "Model loaded from {}", path.display());
        Ok(Some(model))
    }

    fn check_columns(&self) -> Result<()> {
        let matches = self.feature_columns.len() == FEATURE_COLUMNS.len()
            && self
                .feature_columns
                .iter()
                .zip(FEATURE_COLUMNS.iter())
                .all(|(a, b)| a == b);
        if !matches || self.regressor.n_features() != FEATURE_COLUMNS.len() {
            return Err(ForecastError::FeatureMismatch {
                expected: FEATURE_COLUMNS.len(),
                found: self.regressor.n_features(),
            });
        }
        Ok(())
    }
}

impl DemandModel for ForecastModel {
    fn predict_demand(&self, features: &FeatureVector) -> Result<f64> {
        let values = features.to_array();
        if values.len() != self.regressor.n_features() {
            return Err(ForecastError::FeatureMismatch {
                expected: self.regressor.n_features(),
                found: values.len(),
            });
        }

        let prediction = self.regressor.predict(&values);
        if !prediction.is_finite() {
            return Err(ForecastError::NonFinitePrediction);
        }
        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{CalendarFeatures, DemandHistory};
    use crate::gbm::BoostParams;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn tiny_model() -> ForecastModel {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let mut x = Vec::new();
        let mut y = Vec::new();
        for hour in 0..24 {
            let v = FeatureVector::new(
                CalendarFeatures::for_hour(date, hour),
                DemandHistory::flat(hour as f64),
            );
            x.push(v.to_array().to_vec());
            y.push(if (7..=8).contains(&hour) { 40.0 } else { 10.0 });
        }
        let params = BoostParams {
            n_estimators: 20,
            max_depth: 3,
            learning_rate: 0.5,
            subsample: 1.0,
            colsample_bytree: 1.0,
            min_samples_leaf: 1,
        };
        ForecastModel::new("v1.0", GradientBoostedRegressor::fit(&x, &y, &params).unwrap())
    }

    #[test]
    fn test_save_and_load_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("models").join("model.json");
        let model = tiny_model();

        model.save(&path).unwrap();
        let loaded = ForecastModel::load(&path).unwrap().unwrap();

        assert_eq!(loaded.version, "v1.0");
        assert_eq!(loaded.feature_columns.len(), 14);
        assert_eq!(loaded.feature_columns[0], "hour_of_day");
        assert!(!dir.path().join("models").join("model.json.tmp").exists());
    }

    #[test]
    fn test_load_missing_artifact_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(ForecastModel::load(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn test_load_rejects_reordered_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let mut model = tiny_model();
        model.feature_columns.swap(0, 1);
        model.save(&path).unwrap();

        assert!(matches!(
            ForecastModel::load(&path),
            Err(ForecastError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(ForecastModel::load(&path), Err(ForecastError::Json(_))));
    }

    #[test]
    fn test_predicts_learned_peak() {
        let model = tiny_model();
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let at = |hour: u32| {
            model
                .predict_demand(&FeatureVector::new(
                    CalendarFeatures::for_hour(date, hour),
                    DemandHistory::flat(hour as f64),
                ))
                .unwrap()
        };
        assert!(at(7) > at(12) + 20.0);
        assert!((at(12) - 10.0).abs() < 1.0);
    }
}
