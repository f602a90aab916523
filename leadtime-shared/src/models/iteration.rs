/// Iteration model: external groupings of work
///
/// Iterations are typically "epics" in the upstream tracker. They are
/// keyed by the tracker's external id and carry effort/value estimate tags
/// plus an optional team tag.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE iterations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     ext_id VARCHAR(255) NOT NULL UNIQUE,
///     name VARCHAR(255) NOT NULL,
///     created_on TIMESTAMPTZ NOT NULL,
///     updated_on TIMESTAMPTZ NOT NULL,
///     rank INTEGER NOT NULL DEFAULT 0,
///     effort_est VARCHAR(50),
///     value_est VARCHAR(50),
///     team VARCHAR(255)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

/// Iteration model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Iteration {
    /// Unique iteration ID
    pub id: Uuid,

    /// External tracker id (natural key)
    pub ext_id: String,

    /// Human-readable name
    pub name: String,

    /// When the iteration was created in the tracker
    pub created_on: DateTime<Utc>,

    /// When the iteration was last updated in the tracker
    pub updated_on: DateTime<Utc>,

    /// Ordering rank in the tracker backlog
    pub rank: i32,

    /// Effort estimate tag
    pub effort_est: Option<String>,

    /// Value estimate tag
    pub value_est: Option<String>,

    /// Team/project tag
    pub team: Option<String>,
}

/// Input for creating or overwriting an iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationDraft {
    pub name: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub rank: i32,
    pub effort_est: Option<String>,
    pub value_est: Option<String>,
    pub team: Option<String>,
}

const ITERATION_COLUMNS: &str =
    "id, ext_id, name, created_on, updated_on, rank, effort_est, value_est, team";

impl Iteration {
    /// Inserts a new iteration
    pub async fn create(
        conn: &mut PgConnection,
        ext_id: &str,
        draft: &IterationDraft,
    ) -> Result<Self, sqlx::Error> {
        let iteration = sqlx::query_as::<_, Iteration>(&format!(
            r#"
            INSERT INTO iterations (ext_id, name, created_on, updated_on, rank,
                                    effort_est, value_est, team)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {ITERATION_COLUMNS}
            "#
        ))
        .bind(ext_id)
        .bind(&draft.name)
        .bind(draft.created_on)
        .bind(draft.updated_on)
        .bind(draft.rank)
        .bind(&draft.effort_est)
        .bind(&draft.value_est)
        .bind(&draft.team)
        .fetch_one(conn)
        .await?;

        Ok(iteration)
    }

    /// Overwrites every externally-sourced field of an existing iteration
    pub async fn overwrite(
        conn: &mut PgConnection,
        id: Uuid,
        draft: &IterationDraft,
    ) -> Result<Self, sqlx::Error> {
        let iteration = sqlx::query_as::<_, Iteration>(&format!(
            r#"
            UPDATE iterations
            SET name = $2, created_on = $3, updated_on = $4, rank = $5,
                effort_est = $6, value_est = $7, team = $8
            WHERE id = $1
            RETURNING {ITERATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&draft.name)
        .bind(draft.created_on)
        .bind(draft.updated_on)
        .bind(draft.rank)
        .bind(&draft.effort_est)
        .bind(&draft.value_est)
        .bind(&draft.team)
        .fetch_one(conn)
        .await?;

        Ok(iteration)
    }

    /// Finds all iterations whose external id appears in `ext_ids`
    pub async fn find_by_ext_ids(
        conn: &mut PgConnection,
        ext_ids: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let iterations = sqlx::query_as::<_, Iteration>(&format!(
            "SELECT {ITERATION_COLUMNS} FROM iterations WHERE ext_id = ANY($1)"
        ))
        .bind(ext_ids)
        .fetch_all(conn)
        .await?;

        Ok(iterations)
    }

    /// Pool variant of [`Iteration::find_by_ext_ids`] for read-only callers
    pub async fn lookup_by_ext_ids(
        pool: &PgPool,
        ext_ids: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::find_by_ext_ids(&mut conn, ext_ids).await
    }
}
