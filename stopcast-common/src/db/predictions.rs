//! Prediction queries
//!
//! Predictions are a daily snapshot table: the regeneration job deletes a
//! date's rows and inserts fresh ones inside one transaction, so the write
//! helpers accept any executor (pool or `&mut *tx`).

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Executor, Row, Sqlite, SqlitePool};

use crate::models::{NewPrediction, Prediction};
use crate::time::{format_date, now, parse_date, parse_timestamp};
use crate::Result;

const SELECT_PREDICTIONS: &str = r#"
    SELECT p.id, p.stop_id, s.name AS stop_name, p.prediction_date,
           p.predicted_passengers, p.peak_hour, p.confidence_score,
           p.is_school_dismissal, p.is_high_tide, p.is_public_holiday, p.is_weekend,
           p.message, p.is_sent, p.created_at, p.sent_at
    FROM predictions p
    JOIN stops s ON s.id = p.stop_id
"#;

/// All predictions, newest date first
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Prediction>> {
    let sql = format!("{} ORDER BY p.prediction_date DESC, p.stop_id ASC", SELECT_PREDICTIONS);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(prediction_from_row).collect()
}

/// Predictions for one date in stop order
pub async fn list_by_date(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<Prediction>> {
    let sql = format!(
        "{} WHERE p.prediction_date = ? ORDER BY p.stop_id ASC",
        SELECT_PREDICTIONS
    );
    let rows = sqlx::query(&sql)
        .bind(format_date(date))
        .fetch_all(pool)
        .await?;
    rows.iter().map(prediction_from_row).collect()
}

/// Predictions for one date that have not been pushed yet
pub async fn list_unsent_by_date(pool: &SqlitePool, date: NaiveDate) -> Result<Vec<Prediction>> {
    let sql = format!(
        "{} WHERE p.prediction_date = ? AND p.is_sent = 0 ORDER BY p.stop_id ASC",
        SELECT_PREDICTIONS
    );
    let rows = sqlx::query(&sql)
        .bind(format_date(date))
        .fetch_all(pool)
        .await?;
    rows.iter().map(prediction_from_row).collect()
}

/// Number of predictions stored for a date
pub async fn count_by_date<'e, E>(executor: E, date: NaiveDate) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM predictions WHERE prediction_date = ?")
            .bind(format_date(date))
            .fetch_one(executor)
            .await?;
    Ok(count)
}

/// Number of predictions for a date already marked sent
pub async fn count_sent_by_date(pool: &SqlitePool, date: NaiveDate) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM predictions WHERE prediction_date = ? AND is_sent = 1",
    )
    .bind(format_date(date))
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Delete every prediction for a date, returning the number removed
pub async fn delete_for_date<'e, E>(executor: E, date: NaiveDate) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM predictions WHERE prediction_date = ?")
        .bind(format_date(date))
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Insert one prediction, returning its id
pub async fn insert<'e, E>(executor: E, prediction: &NewPrediction) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO predictions (
            stop_id, prediction_date, predicted_passengers, peak_hour, confidence_score,
            is_school_dismissal, is_high_tide, is_public_holiday, is_weekend,
            message, is_sent, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(prediction.stop_id)
    .bind(format_date(prediction.prediction_date))
    .bind(prediction.predicted_passengers)
    .bind(prediction.peak_hour as i64)
    .bind(prediction.confidence_score)
    .bind(prediction.is_school_dismissal)
    .bind(prediction.is_high_tide)
    .bind(prediction.is_public_holiday)
    .bind(prediction.is_weekend)
    .bind(&prediction.message)
    .bind(now().to_rfc3339())
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Mark predictions as sent at `sent_at`
pub async fn mark_sent(pool: &SqlitePool, ids: &[i64], sent_at: DateTime<Utc>) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut updated = 0;
    let sent_at = sent_at.to_rfc3339();

    for id in ids {
        let result = sqlx::query("UPDATE predictions SET is_sent = 1, sent_at = ? WHERE id = ?")
            .bind(&sent_at)
            .bind(*id)
            .execute(&mut *tx)
            .await?;
        updated += result.rows_affected();
    }

    tx.commit().await?;
    Ok(updated)
}

fn prediction_from_row(row: &SqliteRow) -> Result<Prediction> {
    let prediction_date: String = row.get("prediction_date");
    let created_at: String = row.get("created_at");
    let sent_at: Option<String> = row.get("sent_at");
    let peak_hour: i64 = row.get("peak_hour");

    Ok(Prediction {
        id: row.get("id"),
        stop_id: row.get("stop_id"),
        stop_name: row.get("stop_name"),
        prediction_date: parse_date(&prediction_date)?,
        predicted_passengers: row.get("predicted_passengers"),
        peak_hour: peak_hour as u32,
        confidence_score: row.get("confidence_score"),
        is_school_dismissal: row.get("is_school_dismissal"),
        is_high_tide: row.get("is_high_tide"),
        is_public_holiday: row.get("is_public_holiday"),
        is_weekend: row.get("is_weekend"),
        message: row.get("message"),
        is_sent: row.get("is_sent"),
        created_at: parse_timestamp(&created_at)?,
        sent_at: sent_at.as_deref().map(parse_timestamp).transpose()?,
    })
}
