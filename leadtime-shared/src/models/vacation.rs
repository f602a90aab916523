/// Vacation model: calendar dates excluded for a single user
///
/// # Schema
///
/// ```sql
/// CREATE TABLE vacations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     date DATE NOT NULL,
///     UNIQUE (user_id, date)
/// );
/// ```

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

/// A per-user excluded date
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Vacation {
    /// Unique vacation ID
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// The excluded date; (user_id, date) is the natural key
    pub date: NaiveDate,
}

impl Vacation {
    /// Inserts a vacation day
    pub async fn create(
        conn: &mut PgConnection,
        user_id: Uuid,
        date: NaiveDate,
    ) -> Result<Self, sqlx::Error> {
        let vacation = sqlx::query_as::<_, Vacation>(
            r#"
            INSERT INTO vacations (user_id, date)
            VALUES ($1, $2)
            RETURNING id, user_id, date
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(conn)
        .await?;

        Ok(vacation)
    }

    /// Finds all vacations matching any (user_id, date) pair in `keys`
    ///
    /// Composite natural keys are matched with an UNNEST row set so the
    /// whole batch resolves in one round trip.
    pub async fn find_by_keys(
        conn: &mut PgConnection,
        keys: &[(Uuid, NaiveDate)],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let (user_ids, dates): (Vec<Uuid>, Vec<NaiveDate>) = keys.iter().cloned().unzip();
        let vacations = sqlx::query_as::<_, Vacation>(
            r#"
            SELECT id, user_id, date
            FROM vacations
            WHERE (user_id, date) IN (SELECT * FROM UNNEST($1::uuid[], $2::date[]))
            "#,
        )
        .bind(user_ids)
        .bind(dates)
        .fetch_all(conn)
        .await?;

        Ok(vacations)
    }

    /// Returns the set of excluded dates for one user
    pub async fn dates_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<HashSet<NaiveDate>, sqlx::Error> {
        let rows: Vec<(NaiveDate,)> =
            sqlx::query_as("SELECT date FROM vacations WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(pool)
                .await?;

        Ok(rows.into_iter().map(|(d,)| d).collect())
    }

    /// Hard-deletes a user's vacations that are not in `keep`
    ///
    /// Returns the deleted dates so the user's workday caches can be
    /// recomputed.
    pub async fn delete_missing_for_user(
        pool: &PgPool,
        user_id: Uuid,
        keep: &[NaiveDate],
    ) -> Result<Vec<NaiveDate>, sqlx::Error> {
        let rows: Vec<(NaiveDate,)> = sqlx::query_as(
            r#"
            DELETE FROM vacations
            WHERE user_id = $1 AND NOT (date = ANY($2))
            RETURNING date
            "#,
        )
        .bind(user_id)
        .bind(keep)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(d,)| d).collect())
    }
}
