//! Model metrics queries

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::models::{ModelMetrics, NewModelMetrics};
use crate::time::{now, parse_timestamp};
use crate::Result;

/// Currently deployed model's metrics, if any model has been trained
pub async fn get_active(pool: &SqlitePool) -> Result<Option<ModelMetrics>> {
    let row = sqlx::query(
        "SELECT id, model_version, r2_score, mae, rmse, training_date, is_active
         FROM model_metrics WHERE is_active = 1",
    )
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(metrics_from_row).transpose()
}

/// Record metrics for a newly trained model and make them the active row
///
/// The previous active row is deactivated in the same transaction.
pub async fn record_active(pool: &SqlitePool, metrics: &NewModelMetrics) -> Result<ModelMetrics> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE model_metrics SET is_active = 0 WHERE is_active = 1")
        .execute(&mut *tx)
        .await?;

    let training_date = now();
    let result = sqlx::query(
        r#"
        INSERT INTO model_metrics (model_version, r2_score, mae, rmse, training_date, is_active)
        VALUES (?, ?, ?, ?, ?, 1)
        "#,
    )
    .bind(&metrics.model_version)
    .bind(metrics.r2_score)
    .bind(metrics.mae)
    .bind(metrics.rmse)
    .bind(training_date.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(ModelMetrics {
        id: result.last_insert_rowid(),
        model_version: metrics.model_version.clone(),
        r2_score: metrics.r2_score,
        mae: metrics.mae,
        rmse: metrics.rmse,
        training_date,
        is_active: true,
    })
}

fn metrics_from_row(row: &SqliteRow) -> Result<ModelMetrics> {
    let training_date: String = row.get("training_date");
    Ok(ModelMetrics {
        id: row.get("id"),
        model_version: row.get("model_version"),
        r2_score: row.get("r2_score"),
        mae: row.get("mae"),
        rmse: row.get("rmse"),
        training_date: parse_timestamp(&training_date)?,
        is_active: row.get("is_active"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_database;

    fn metrics(version: &str, r2: f64) -> NewModelMetrics {
        NewModelMetrics {
            model_version: version.to_string(),
            r2_score: r2,
            mae: 1.2,
            rmse: 1.8,
        }
    }

    #[tokio::test]
    async fn test_no_active_metrics_initially() {
        let pool = init_memory_database().await.unwrap();
        assert!(get_active(&pool).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_active_keeps_single_active_row() {
        let pool = init_memory_database().await.unwrap();

        record_active(&pool, &metrics("v1.0", 0.91)).await.unwrap();
        record_active(&pool, &metrics("v1.0", 0.93)).await.unwrap();
        let latest = record_active(&pool, &metrics("v1.1", 0.95)).await.unwrap();

        let active_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM model_metrics WHERE is_active = 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(active_count, 1);

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM model_metrics")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(total, 3, "history is kept");

        let active = get_active(&pool).await.unwrap().unwrap();
        assert_eq!(active.id, latest.id);
        assert_eq!(active.model_version, "v1.1");
        assert!((active.r2_score - 0.95).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_store_rejects_second_active_row() {
        let pool = init_memory_database().await.unwrap();
        record_active(&pool, &metrics("v1.0", 0.9)).await.unwrap();

        let direct = sqlx::query(
            "INSERT INTO model_metrics (model_version, r2_score, mae, rmse, training_date, is_active)
             VALUES ('rogue', 0.1, 1, 1, '2024-01-01T00:00:00+00:00', 1)",
        )
        .execute(&pool)
        .await;
        assert!(direct.is_err(), "partial unique index must reject a second active row");
    }
}
