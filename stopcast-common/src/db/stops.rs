//! Stop queries

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::models::Stop;
use crate::stops::STOPS;
use crate::Result;

/// Upsert the fixed stop list by name
///
/// Coordinates, description and type of existing rows are refreshed so that
/// corrections to the reference data reach deployed databases.
/// Returns the number of stops in the list.
pub async fn seed_stops(pool: &SqlitePool) -> Result<usize> {
    let mut tx = pool.begin().await?;

    for stop in STOPS.iter() {
        sqlx::query(
            r#"
            INSERT INTO stops (name, latitude, longitude, description, stop_type)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                description = excluded.description,
                stop_type = excluded.stop_type
            "#,
        )
        .bind(stop.name)
        .bind(stop.latitude)
        .bind(stop.longitude)
        .bind(stop.description)
        .bind(stop.stop_type.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok(STOPS.len())
}

/// List all stops in seed order
pub async fn list_stops(pool: &SqlitePool) -> Result<Vec<Stop>> {
    let rows = sqlx::query(
        "SELECT id, name, latitude, longitude, description, stop_type FROM stops ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(stop_from_row).collect()
}

fn stop_from_row(row: &SqliteRow) -> Result<Stop> {
    let stop_type: String = row.get("stop_type");
    Ok(Stop {
        id: row.get("id"),
        name: row.get("name"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        description: row.get("description"),
        stop_type: stop_type.parse()?,
    })
}
