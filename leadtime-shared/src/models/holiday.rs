/// Holiday model: calendar dates excluded for all users
///
/// # Schema
///
/// ```sql
/// CREATE TABLE holidays (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     date DATE NOT NULL UNIQUE
/// );
/// ```

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

/// A company-wide excluded date
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Holiday {
    /// Unique holiday ID
    pub id: Uuid,

    /// The excluded date (natural key)
    pub date: NaiveDate,
}

impl Holiday {
    /// Inserts a holiday
    pub async fn create(conn: &mut PgConnection, date: NaiveDate) -> Result<Self, sqlx::Error> {
        let holiday = sqlx::query_as::<_, Holiday>(
            "INSERT INTO holidays (date) VALUES ($1) RETURNING id, date",
        )
        .bind(date)
        .fetch_one(conn)
        .await?;

        Ok(holiday)
    }

    /// Finds all holidays whose date appears in `dates`
    pub async fn find_by_dates(
        conn: &mut PgConnection,
        dates: &[NaiveDate],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let holidays = sqlx::query_as::<_, Holiday>(
            "SELECT id, date FROM holidays WHERE date = ANY($1)",
        )
        .bind(dates)
        .fetch_all(conn)
        .await?;

        Ok(holidays)
    }

    /// Returns the full set of excluded dates
    pub async fn dates(pool: &PgPool) -> Result<HashSet<NaiveDate>, sqlx::Error> {
        let rows: Vec<(NaiveDate,)> = sqlx::query_as("SELECT date FROM holidays")
            .fetch_all(pool)
            .await?;

        Ok(rows.into_iter().map(|(d,)| d).collect())
    }

    /// Hard-deletes holidays in the window that are not in `keep`
    ///
    /// Calendars shrink as well as grow; rows inside `[window_start,
    /// window_stop]` that were not re-fetched from the source are removed.
    /// Returns the deleted dates so workday caches can be recomputed.
    pub async fn delete_missing(
        pool: &PgPool,
        window_start: NaiveDate,
        window_stop: NaiveDate,
        keep: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>, sqlx::Error> {
        let rows: Vec<(NaiveDate,)> = sqlx::query_as(
            r#"
            DELETE FROM holidays
            WHERE date >= $1 AND date <= $2 AND NOT (date = ANY($3))
            RETURNING date
            "#,
        )
        .bind(window_start)
        .bind(window_stop)
        .bind(keep)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(d,)| d).collect())
    }
}
