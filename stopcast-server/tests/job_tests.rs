//! Integration tests for the regeneration and model-health jobs

use chrono::NaiveDate;
use tempfile::TempDir;

use stopcast_common::config::Config;
use stopcast_common::db::{init_memory_database, metrics, predictions};
use stopcast_common::models::NewModelMetrics;
use stopcast_common::stops::STOPS;
use stopcast_forecast::dataset::load_dataset;
use stopcast_server::jobs::{self, ModelHealth};
use stopcast_server::AppState;

async fn setup_state(dir: &TempDir) -> AppState {
    let mut config = Config::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.forecast.train_on_startup = false;

    let pool = init_memory_database().await.unwrap();
    AppState::new(pool, config).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test]
async fn test_regeneration_replaces_rows_and_grows_dataset() {
    let dir = TempDir::new().unwrap();
    let state = setup_state(&dir).await;
    let day = date(2024, 6, 12);

    let first = jobs::regenerate_for_date(&state, day).await.unwrap();
    assert_eq!(first.count, STOPS.len());
    assert_eq!(first.replaced, 0);
    assert_eq!(first.from_heuristic, STOPS.len());
    assert_eq!(predictions::count_by_date(&state.db, day).await.unwrap() as usize, STOPS.len());

    let second = jobs::regenerate_for_date(&state, day).await.unwrap();
    assert_eq!(second.replaced as usize, STOPS.len());
    assert_eq!(predictions::count_by_date(&state.db, day).await.unwrap() as usize, STOPS.len());

    // Every run appends its predictions at their peak hours
    let records = load_dataset(&state.config.storage.dataset_path()).unwrap();
    assert_eq!(records.len(), 2 * STOPS.len());
    for record in &records {
        assert_eq!(record.datetime.date(), day);
        assert_eq!(record.features.history.lag_1_hour_demand, record.passenger_count);
        // 2024-06-12 is in the holiday table
        assert!(record.features.calendar.is_public_holiday);
    }
}

#[tokio::test]
async fn test_failed_insert_rolls_back_whole_run() {
    let dir = TempDir::new().unwrap();
    let state = setup_state(&dir).await;
    let day = date(2024, 3, 4);

    jobs::regenerate_for_date(&state, day).await.unwrap();
    let before: Vec<i64> = predictions::list_by_date(&state.db, day)
        .await
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();

    sqlx::query(
        "CREATE TRIGGER fail_stop_20 BEFORE INSERT ON predictions
         WHEN NEW.stop_id = 20
         BEGIN SELECT RAISE(ABORT, 'insert rejected'); END",
    )
    .execute(&state.db)
    .await
    .unwrap();

    let err = jobs::regenerate_for_date(&state, day).await.unwrap_err();
    assert!(err.to_string().contains("insert rejected"), "{}", err);

    // The delete and the inserts before stop 20 were undone
    let after: Vec<i64> = predictions::list_by_date(&state.db, day)
        .await
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(after.len(), STOPS.len());
    assert_eq!(after, before);

    // Nothing from the failed run reached the dataset
    let records = load_dataset(&state.config.storage.dataset_path()).unwrap();
    assert_eq!(records.len(), STOPS.len());
}

#[tokio::test]
async fn test_regeneration_flags_follow_date() {
    let dir = TempDir::new().unwrap();
    let state = setup_state(&dir).await;
    let saturday = date(2024, 3, 9);

    jobs::regenerate_for_date(&state, saturday).await.unwrap();
    let rows = predictions::list_by_date(&state.db, saturday).await.unwrap();

    assert_eq!(rows.len(), STOPS.len());
    for row in rows {
        assert!(row.is_weekend);
        assert!(!row.is_public_holiday);
        assert_eq!(row.confidence_score, 0.7);
        assert!([15, 18].contains(&row.peak_hour));
        assert!(
            row.message.ends_with("Note: weekend.")
                || row.message.contains("school dismissal time")
        );
    }
}

#[tokio::test]
async fn test_dates_are_independent() {
    let dir = TempDir::new().unwrap();
    let state = setup_state(&dir).await;

    jobs::regenerate_for_date(&state, date(2024, 3, 4)).await.unwrap();
    jobs::regenerate_for_date(&state, date(2024, 3, 5)).await.unwrap();
    jobs::regenerate_for_date(&state, date(2024, 3, 4)).await.unwrap();

    assert_eq!(predictions::list_all(&state.db).await.unwrap().len(), 2 * STOPS.len());
}

#[tokio::test]
async fn test_ensure_predictions_skips_existing_date() {
    let dir = TempDir::new().unwrap();
    let state = setup_state(&dir).await;
    let day = date(2024, 3, 4);

    let created = jobs::ensure_predictions_for(&state, day).await.unwrap();
    assert_eq!(created.map(|s| s.count), Some(STOPS.len()));

    let skipped = jobs::ensure_predictions_for(&state, day).await.unwrap();
    assert!(skipped.is_none());
}

#[tokio::test]
async fn test_ensure_model_without_training_uses_heuristic() {
    let dir = TempDir::new().unwrap();
    let state = setup_state(&dir).await;

    assert!(!jobs::ensure_model(&state).await.unwrap());
    assert!(state.current_model().await.is_none());
}

#[tokio::test]
async fn test_ensure_model_ignores_corrupt_artifact() {
    let dir = TempDir::new().unwrap();
    let state = setup_state(&dir).await;
    std::fs::write(state.config.storage.model_path(), b"{ not a model").unwrap();

    assert!(!jobs::ensure_model(&state).await.unwrap());
    assert!(state.current_model().await.is_none());
}

#[tokio::test]
async fn test_model_performance_check() {
    let dir = TempDir::new().unwrap();
    let state = setup_state(&dir).await;

    assert_eq!(jobs::check_model_performance(&state).await, ModelHealth::Missing);

    metrics::record_active(
        &state.db,
        &NewModelMetrics {
            model_version: "v1.0".to_string(),
            r2_score: 0.95,
            mae: 0.8,
            rmse: 1.2,
        },
    )
    .await
    .unwrap();
    assert_eq!(jobs::check_model_performance(&state).await, ModelHealth::Healthy);

    metrics::record_active(
        &state.db,
        &NewModelMetrics {
            model_version: "v1.1".to_string(),
            r2_score: 0.7,
            mae: 2.5,
            rmse: 3.1,
        },
    )
    .await
    .unwrap();
    assert_eq!(jobs::check_model_performance(&state).await, ModelHealth::Degraded);
}
