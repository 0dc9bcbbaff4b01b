//! Prediction regeneration and model training jobs
//!
//! Regeneration is idempotent per date: the date's rows are deleted and one
//! prediction per stop is inserted inside a single transaction. Rows that
//! made it into the database are then appended to the training dataset.

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{error, info, warn};

use stopcast_common::db::{metrics, predictions, stops};
use stopcast_common::models::{ModelMetrics, NewModelMetrics, Stop};
use stopcast_common::stops::find_seed;
use stopcast_common::time::format_date;
use stopcast_forecast::dataset::{append_record, DemandRecord};
use stopcast_forecast::generator::record_for_prediction;
use stopcast_forecast::metrics::RegressionMetrics;
use stopcast_forecast::training::{train_forecasting_model, TrainingOptions};
use stopcast_forecast::{forecast_stop, DemandModel, ForecastModel, ForecastSource, StopForecast};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Minimum R² before the deployed model counts as degraded
pub const MIN_R2_SCORE: f64 = 0.9;
/// Maximum RMSE before the deployed model counts as degraded
pub const MAX_RMSE: f64 = 2.0;

/// Outcome of one regeneration run
#[derive(Debug, Clone, Serialize)]
pub struct RegenerationSummary {
    pub date: NaiveDate,
    pub count: usize,
    pub from_model: usize,
    pub from_heuristic: usize,
    /// Rows deleted for the date before inserting
    pub replaced: u64,
}

/// Delete and regenerate all predictions for `date`
pub async fn regenerate_for_date(
    state: &AppState,
    date: NaiveDate,
) -> ApiResult<RegenerationSummary> {
    info!(date = %format_date(date), "Generating daily predictions");

    let stop_list = stops::list_stops(&state.db).await?;
    let model = state.current_model().await;
    if model.is_none() {
        warn!("No trained model loaded, using heuristic predictions");
    }

    let forecasts: Vec<(Stop, StopForecast)> = {
        let mut rng = StdRng::from_entropy();
        let model = model.as_deref().map(|m| m as &dyn DemandModel);
        stop_list
            .into_iter()
            .map(|stop| {
                let forecast = forecast_stop(model, &stop.name, date, &mut rng);
                (stop, forecast)
            })
            .collect()
    };

    let mut tx = state
        .db
        .begin()
        .await
        .map_err(stopcast_common::Error::from)?;

    let replaced = predictions::delete_for_date(&mut *tx, date).await?;
    for (stop, forecast) in &forecasts {
        let row = forecast.clone().into_new_prediction(stop.id, date);
        predictions::insert(&mut *tx, &row).await?;
    }

    tx.commit().await.map_err(stopcast_common::Error::from)?;

    let from_model = forecasts
        .iter()
        .filter(|(_, f)| f.source == ForecastSource::Model)
        .count();
    let summary = RegenerationSummary {
        date,
        count: forecasts.len(),
        from_model,
        from_heuristic: forecasts.len() - from_model,
        replaced,
    };

    info!(
        date = %format_date(date),
        count = summary.count,
        from_model = summary.from_model,
        replaced = summary.replaced,
        "Generated predictions"
    );

    append_to_dataset(state, date, &forecasts).await;
    check_model_performance(state).await;

    Ok(summary)
}

/// Append one dataset row per stored prediction at its peak hour
///
/// Failures are logged only; the predictions are already committed.
async fn append_to_dataset(state: &AppState, date: NaiveDate, forecasts: &[(Stop, StopForecast)]) {
    let records: Vec<DemandRecord> = forecasts
        .iter()
        .filter_map(|(stop, forecast)| {
            let seed = find_seed(&stop.name)?;
            let datetime = date.and_hms_opt(forecast.peak_hour, 0, 0)?;
            Some(record_for_prediction(
                seed,
                datetime,
                forecast.predicted_passengers as f64,
            ))
        })
        .collect();

    if records.len() < forecasts.len() {
        warn!(
            skipped = forecasts.len() - records.len(),
            "Some predictions have no reference stop and were not added to the dataset"
        );
    }

    let path = state.config.storage.dataset_path();
    let lock = state.dataset_lock.clone();
    let result = tokio::task::spawn_blocking(move || {
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        for record in &records {
            append_record(&path, record)?;
        }
        Ok::<usize, stopcast_forecast::ForecastError>(records.len())
    })
    .await;

    match result {
        Ok(Ok(appended)) => info!(appended, "Appended predictions to training dataset"),
        Ok(Err(e)) => error!(error = %e, "Failed to append predictions to dataset"),
        Err(e) => error!(error = %e, "Dataset append task failed"),
    }
}

/// How the deployed model's recorded accuracy looks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelHealth {
    /// No active metrics row
    Missing,
    Degraded,
    Healthy,
}

pub fn assess_model(metrics: Option<&ModelMetrics>) -> ModelHealth {
    match metrics {
        None => ModelHealth::Missing,
        Some(m) if m.r2_score < MIN_R2_SCORE || m.rmse > MAX_RMSE => ModelHealth::Degraded,
        Some(_) => ModelHealth::Healthy,
    }
}

/// Log a warning when the active model's metrics fall below thresholds
pub async fn check_model_performance(state: &AppState) -> ModelHealth {
    let active = match metrics::get_active(&state.db).await {
        Ok(active) => active,
        Err(e) => {
            error!(error = %e, "Failed to read model metrics");
            return ModelHealth::Missing;
        }
    };

    let health = assess_model(active.as_ref());
    match (health, active) {
        (ModelHealth::Missing, _) => warn!("No model metrics found"),
        (ModelHealth::Degraded, Some(m)) => warn!(
            version = %m.model_version,
            r2 = m.r2_score,
            rmse = m.rmse,
            "Model performance degraded"
        ),
        (_, Some(m)) => info!(
            version = %m.model_version,
            r2 = m.r2_score,
            rmse = m.rmse,
            "Model performance OK"
        ),
        (_, None) => {}
    }
    health
}

/// Result of a training run that was deployed
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub model_version: String,
    pub train: RegressionMetrics,
    pub test: RegressionMetrics,
    pub train_rows: usize,
    pub test_rows: usize,
    pub dataset_generated: bool,
    pub metrics: ModelMetrics,
}

/// Train on the dataset, record test metrics as active and deploy the model
///
/// Only one training run at a time; a concurrent request is a conflict.
pub async fn train_and_deploy(state: &AppState) -> ApiResult<TrainingReport> {
    let _running = state
        .training_lock
        .try_lock()
        .map_err(|_| ApiError::Conflict("Model training already in progress".to_string()))?;

    let options = TrainingOptions::from_config(&state.config.forecast)?;
    let dataset_path = state.config.storage.dataset_path();
    let model_path = state.config.storage.model_path();
    let dataset_lock = state.dataset_lock.clone();

    let outcome = tokio::task::spawn_blocking(move || {
        // Appends from a concurrent regeneration wait for the read to finish
        let _guard = dataset_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        train_forecasting_model(&dataset_path, &model_path, &options)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Training task failed: {}", e)))??;

    let recorded = metrics::record_active(
        &state.db,
        &NewModelMetrics {
            model_version: outcome.model.version.clone(),
            r2_score: outcome.test_metrics.r2_score,
            mae: outcome.test_metrics.mae,
            rmse: outcome.test_metrics.rmse,
        },
    )
    .await?;

    let report = TrainingReport {
        model_version: outcome.model.version.clone(),
        train: outcome.train_metrics,
        test: outcome.test_metrics,
        train_rows: outcome.train_rows,
        test_rows: outcome.test_rows,
        dataset_generated: outcome.dataset_generated,
        metrics: recorded,
    };

    state.set_model(outcome.model).await;
    info!(version = %report.model_version, "Deployed newly trained model");

    Ok(report)
}

/// Load the saved model, training one first when none exists and allowed
pub async fn ensure_model(state: &AppState) -> ApiResult<bool> {
    let model_path = state.config.storage.model_path();
    let loaded = tokio::task::spawn_blocking(move || ForecastModel::load(&model_path))
        .await
        .map_err(|e| ApiError::Internal(format!("Model load task failed: {}", e)))?;

    match loaded {
        Ok(Some(model)) => {
            state.set_model(model).await;
            return Ok(true);
        }
        Ok(None) => info!("No saved model found"),
        Err(e) => warn!(error = %e, "Saved model is unusable"),
    }

    if !state.config.forecast.train_on_startup {
        warn!("Training on startup disabled; predictions will use the heuristic");
        return Ok(false);
    }

    train_and_deploy(state).await?;
    Ok(true)
}

/// Generate today's predictions if none exist yet
pub async fn ensure_predictions_for(
    state: &AppState,
    date: NaiveDate,
) -> ApiResult<Option<RegenerationSummary>> {
    let existing = predictions::count_by_date(&state.db, date).await?;
    if existing > 0 {
        info!(date = %format_date(date), existing, "Predictions already present");
        return Ok(None);
    }
    regenerate_for_date(state, date).await.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn metrics(r2: f64, rmse: f64) -> ModelMetrics {
        ModelMetrics {
            id: 1,
            model_version: "v1.0".to_string(),
            r2_score: r2,
            mae: 1.0,
            rmse,
            training_date: Utc::now(),
            is_active: true,
        }
    }

    #[test]
    fn test_assess_model_thresholds() {
        assert_eq!(assess_model(None), ModelHealth::Missing);
        assert_eq!(assess_model(Some(&metrics(0.95, 1.5))), ModelHealth::Healthy);
        assert_eq!(assess_model(Some(&metrics(0.9, 2.0))), ModelHealth::Healthy);
        assert_eq!(assess_model(Some(&metrics(0.89, 1.0))), ModelHealth::Degraded);
        assert_eq!(assess_model(Some(&metrics(0.99, 2.1))), ModelHealth::Degraded);
    }
}
