//! Registrant (user number) queries

use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::models::UserNumber;
use crate::time::{now, parse_timestamp};
use crate::{Error, Result};

/// Outcome of registering a phone number
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Created(UserNumber),
    /// The number existed but had been deactivated
    Reactivated(UserNumber),
}

impl Registration {
    pub fn user(&self) -> &UserNumber {
        match self {
            Registration::Created(u) | Registration::Reactivated(u) => u,
        }
    }
}

/// Active registrants in registration order
pub async fn list_active(pool: &SqlitePool) -> Result<Vec<UserNumber>> {
    let rows = sqlx::query(
        "SELECT id, phone_number, push_token, is_active, created_at
         FROM user_numbers WHERE is_active = 1 ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(user_from_row).collect()
}

/// Number of active registrants
pub async fn count_active(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM user_numbers WHERE is_active = 1")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Look up a registrant by phone number (active or not)
pub async fn find_by_phone(pool: &SqlitePool, phone_number: &str) -> Result<Option<UserNumber>> {
    let row = sqlx::query(
        "SELECT id, phone_number, push_token, is_active, created_at
         FROM user_numbers WHERE phone_number = ?",
    )
    .bind(phone_number)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<UserNumber>> {
    let row = sqlx::query(
        "SELECT id, phone_number, push_token, is_active, created_at
         FROM user_numbers WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

/// Register a phone number
///
/// An active duplicate is a [`Error::Conflict`]; an inactive one is
/// reactivated instead of inserted.
pub async fn register(pool: &SqlitePool, phone_number: &str) -> Result<Registration> {
    let phone_number = phone_number.trim();
    if phone_number.is_empty() {
        return Err(Error::InvalidInput("Phone number is required".to_string()));
    }

    if let Some(existing) = find_by_phone(pool, phone_number).await? {
        if existing.is_active {
            return Err(Error::Conflict("User already exists".to_string()));
        }

        sqlx::query("UPDATE user_numbers SET is_active = 1 WHERE id = ?")
            .bind(existing.id)
            .execute(pool)
            .await?;

        return Ok(Registration::Reactivated(UserNumber {
            is_active: true,
            ..existing
        }));
    }

    let created_at = now();
    let result = sqlx::query(
        "INSERT INTO user_numbers (phone_number, is_active, created_at) VALUES (?, 1, ?)",
    )
    .bind(phone_number)
    .bind(created_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(duplicate_as_conflict)?;

    Ok(Registration::Created(UserNumber {
        id: result.last_insert_rowid(),
        phone_number: phone_number.to_string(),
        push_token: None,
        is_active: true,
        created_at,
    }))
}

/// A concurrent insert of the same number loses on the UNIQUE constraint
fn duplicate_as_conflict(err: sqlx::Error) -> Error {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::Conflict("User already exists".to_string())
        }
        other => Error::Database(other),
    }
}

/// Deactivate a registrant; the row is kept so the number can be reactivated
pub async fn deactivate(pool: &SqlitePool, id: i64) -> Result<()> {
    let result = sqlx::query("UPDATE user_numbers SET is_active = 0 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("User {}", id)));
    }

    Ok(())
}

/// Store or replace the push token for a phone number, creating the
/// registrant when it does not exist yet
pub async fn set_push_token(
    pool: &SqlitePool,
    phone_number: &str,
    push_token: &str,
) -> Result<UserNumber> {
    let phone_number = phone_number.trim();
    let push_token = push_token.trim();
    if phone_number.is_empty() || push_token.is_empty() {
        return Err(Error::InvalidInput(
            "phone_number and push_token are required".to_string(),
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO user_numbers (phone_number, push_token, is_active, created_at)
        VALUES (?, ?, 1, ?)
        ON CONFLICT(phone_number) DO UPDATE SET push_token = excluded.push_token
        "#,
    )
    .bind(phone_number)
    .bind(push_token)
    .bind(now().to_rfc3339())
    .execute(pool)
    .await?;

    find_by_phone(pool, phone_number)
        .await?
        .ok_or_else(|| {
            Error::Internal(format!("Registrant {} vanished after upsert", phone_number))
        })
}

/// Fetch a registrant by id
pub async fn get(pool: &SqlitePool, id: i64) -> Result<UserNumber> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {}", id)))
}

fn user_from_row(row: &SqliteRow) -> Result<UserNumber> {
    let created_at: String = row.get("created_at");
    Ok(UserNumber {
        id: row.get("id"),
        phone_number: row.get("phone_number"),
        push_token: row.get("push_token"),
        is_active: row.get("is_active"),
        created_at: parse_timestamp(&created_at)?,
    })
}
