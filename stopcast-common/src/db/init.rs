//! Database initialization
//!
//! Creates the SQLite file on first run, applies the schema (idempotent) and
//! seeds the stop reference data.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets dashboard reads proceed while the daily job writes
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    prepare(&pool).await?;

    Ok(pool)
}

/// Open a private in-memory database with the full schema and seed data
///
/// Limited to a single connection: every pooled connection to
/// `sqlite::memory:` would otherwise see its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    prepare(&pool).await?;

    Ok(pool)
}

async fn prepare(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_stops_table(pool).await?;
    create_predictions_table(pool).await?;
    create_user_numbers_table(pool).await?;
    create_model_metrics_table(pool).await?;

    let seeded = crate::db::stops::seed_stops(pool).await?;
    info!(stops = seeded, "Stop reference data seeded");

    Ok(())
}

async fn create_stops_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stops (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            description TEXT,
            stop_type TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_predictions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS predictions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            stop_id INTEGER NOT NULL REFERENCES stops(id) ON DELETE CASCADE,
            prediction_date TEXT NOT NULL,
            predicted_passengers INTEGER NOT NULL CHECK (predicted_passengers >= 0),
            peak_hour INTEGER NOT NULL CHECK (peak_hour BETWEEN 0 AND 23),
            confidence_score REAL NOT NULL,
            is_school_dismissal INTEGER NOT NULL DEFAULT 0,
            is_high_tide INTEGER NOT NULL DEFAULT 0,
            is_public_holiday INTEGER NOT NULL DEFAULT 0,
            is_weekend INTEGER NOT NULL DEFAULT 0,
            message TEXT NOT NULL,
            is_sent INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            sent_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One snapshot row per stop per date
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_predictions_stop_date
         ON predictions(stop_id, prediction_date)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_predictions_date ON predictions(prediction_date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_user_numbers_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_numbers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            phone_number TEXT NOT NULL UNIQUE,
            push_token TEXT,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_model_metrics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_metrics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            model_version TEXT NOT NULL,
            r2_score REAL NOT NULL,
            mae REAL NOT NULL,
            rmse REAL NOT NULL,
            training_date TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one active model
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_model_metrics_single_active
         ON model_metrics(is_active) WHERE is_active = 1",
    )
    .execute(pool)
    .await?;

    Ok(())
}
