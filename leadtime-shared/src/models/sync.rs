/// Sync checkpoint model
///
/// Each row records that a sync of some kind completed, and the most
/// recent source `updated_on` timestamp that was durably absorbed. The
/// latest checkpoint per kind is the resume point for incremental sync.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE syncs (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     kind VARCHAR(50) NOT NULL,
///     synced_on TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_seen_update TIMESTAMPTZ NOT NULL,
///     notes JSONB
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::fmt;
use uuid::Uuid;

/// Kind of sync a checkpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Full,
    Iteration,
    Task,
    Holiday,
    Vacation,
}

impl SyncKind {
    /// Converts the kind to its stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Full => "full",
            SyncKind::Iteration => "iteration",
            SyncKind::Task => "task",
            SyncKind::Holiday => "holiday",
            SyncKind::Vacation => "vacation",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync checkpoint model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncCheckpoint {
    /// Unique checkpoint ID
    pub id: Uuid,

    /// Stored kind string; see [`SyncKind`]
    pub kind: String,

    /// When the sync ran
    pub synced_on: DateTime<Utc>,

    /// Most recent source update durably absorbed
    pub last_seen_update: DateTime<Utc>,

    /// Free-form run metadata
    pub notes: Option<JsonValue>,
}

impl SyncCheckpoint {
    /// Returns the most advanced checkpoint for a kind
    pub async fn latest(pool: &PgPool, kind: SyncKind) -> Result<Option<Self>, sqlx::Error> {
        let checkpoint = sqlx::query_as::<_, SyncCheckpoint>(
            r#"
            SELECT id, kind, synced_on, last_seen_update, notes
            FROM syncs
            WHERE kind = $1
            ORDER BY last_seen_update DESC
            LIMIT 1
            "#,
        )
        .bind(kind.as_str())
        .fetch_optional(pool)
        .await?;

        Ok(checkpoint)
    }

    /// Records a completed sync
    ///
    /// A sync that absorbed nothing (`last_seen` of `None`) records no
    /// checkpoint: there is no high-water mark to advance.
    pub async fn record(
        pool: &PgPool,
        kind: SyncKind,
        last_seen: Option<DateTime<Utc>>,
        notes: Option<JsonValue>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let Some(last_seen) = last_seen else {
            return Ok(None);
        };

        let checkpoint = sqlx::query_as::<_, SyncCheckpoint>(
            r#"
            INSERT INTO syncs (kind, last_seen_update, notes)
            VALUES ($1, $2, $3)
            RETURNING id, kind, synced_on, last_seen_update, notes
            "#,
        )
        .bind(kind.as_str())
        .bind(last_seen)
        .bind(notes)
        .fetch_one(pool)
        .await?;

        Ok(Some(checkpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_kind_strings() {
        assert_eq!(SyncKind::Full.as_str(), "full");
        assert_eq!(SyncKind::Iteration.as_str(), "iteration");
        assert_eq!(SyncKind::Task.as_str(), "task");
        assert_eq!(SyncKind::Holiday.as_str(), "holiday");
        assert_eq!(SyncKind::Vacation.as_str(), "vacation");
    }

    #[test]
    fn test_sync_kind_display() {
        assert_eq!(SyncKind::Task.to_string(), "task");
    }
}
