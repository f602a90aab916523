/// Event model: observed task mutations
///
/// Events record iteration changes, estimate changes, user changes, and
/// outlier flags against a task, with before/after values where they
/// apply. The unique key (task, type, occurred-on) makes re-ingestion of
/// the same tracker history idempotent.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE events (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     type VARCHAR(50) NOT NULL,
///     occurred_on TIMESTAMPTZ NOT NULL,
///     task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
///     iteration_id UUID REFERENCES iterations(id) ON DELETE SET NULL,
///     from_iteration_id UUID REFERENCES iterations(id) ON DELETE SET NULL,
///     from_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     to_user_id UUID REFERENCES users(id) ON DELETE SET NULL,
///     from_effort_est VARCHAR(50),
///     to_effort_est VARCHAR(50),
///     UNIQUE (task_id, type, occurred_on)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use std::fmt;
use uuid::Uuid;

/// Kind of task mutation an event records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// The task moved between iterations
    IterationChange,

    /// The task's effort estimate changed
    EstimateChange,

    /// The task changed owner
    UserChange,

    /// The task was flagged as a statistical outlier
    Outlier,
}

impl EventKind {
    /// Converts the kind to its stored string form
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::IterationChange => "iteration-change",
            EventKind::EstimateChange => "estimate-change",
            EventKind::UserChange => "user-change",
            EventKind::Outlier => "outlier",
        }
    }

    /// Parses the stored string form
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "iteration-change" => Some(EventKind::IterationChange),
            "estimate-change" => Some(EventKind::EstimateChange),
            "user-change" => Some(EventKind::UserChange),
            "outlier" => Some(EventKind::Outlier),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    /// Unique event ID
    pub id: Uuid,

    /// Stored kind string; see [`EventKind`]
    #[sqlx(rename = "type")]
    pub kind: String,

    /// When the mutation occurred in the tracker
    pub occurred_on: DateTime<Utc>,

    /// Task the mutation applies to
    pub task_id: Uuid,

    /// Iteration after an iteration change
    pub iteration_id: Option<Uuid>,

    /// Iteration before an iteration change
    pub from_iteration_id: Option<Uuid>,

    /// Owner before a user change
    pub from_user_id: Option<Uuid>,

    /// Owner after a user change
    pub to_user_id: Option<Uuid>,

    /// Estimate before an estimate change
    pub from_effort_est: Option<String>,

    /// Estimate after an estimate change
    pub to_effort_est: Option<String>,
}

/// Input for creating an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDraft {
    pub iteration_id: Option<Uuid>,
    pub from_iteration_id: Option<Uuid>,
    pub from_user_id: Option<Uuid>,
    pub to_user_id: Option<Uuid>,
    pub from_effort_est: Option<String>,
    pub to_effort_est: Option<String>,
}

const EVENT_COLUMNS: &str = "id, type, occurred_on, task_id, iteration_id, from_iteration_id, \
     from_user_id, to_user_id, from_effort_est, to_effort_est";

impl Event {
    /// Inserts a new event
    pub async fn create(
        conn: &mut PgConnection,
        task_id: Uuid,
        kind: EventKind,
        occurred_on: DateTime<Utc>,
        draft: &EventDraft,
    ) -> Result<Self, sqlx::Error> {
        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (type, occurred_on, task_id, iteration_id,
                                from_iteration_id, from_user_id, to_user_id,
                                from_effort_est, to_effort_est)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(kind.as_str())
        .bind(occurred_on)
        .bind(task_id)
        .bind(draft.iteration_id)
        .bind(draft.from_iteration_id)
        .bind(draft.from_user_id)
        .bind(draft.to_user_id)
        .bind(&draft.from_effort_est)
        .bind(&draft.to_effort_est)
        .fetch_one(conn)
        .await?;

        Ok(event)
    }

    /// Overwrites the before/after payload of an existing event
    pub async fn overwrite(
        conn: &mut PgConnection,
        id: Uuid,
        draft: &EventDraft,
    ) -> Result<Self, sqlx::Error> {
        let event = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events
            SET iteration_id = $2, from_iteration_id = $3, from_user_id = $4,
                to_user_id = $5, from_effort_est = $6, to_effort_est = $7
            WHERE id = $1
            RETURNING {EVENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(draft.iteration_id)
        .bind(draft.from_iteration_id)
        .bind(draft.from_user_id)
        .bind(draft.to_user_id)
        .bind(&draft.from_effort_est)
        .bind(&draft.to_effort_est)
        .fetch_one(conn)
        .await?;

        Ok(event)
    }

    /// Finds all events matching any (task, kind, occurred-on) key
    pub async fn find_by_keys(
        conn: &mut PgConnection,
        keys: &[(Uuid, String, DateTime<Utc>)],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut task_ids = Vec::with_capacity(keys.len());
        let mut kinds = Vec::with_capacity(keys.len());
        let mut occurred = Vec::with_capacity(keys.len());
        for (task_id, kind, occurred_on) in keys {
            task_ids.push(*task_id);
            kinds.push(kind.clone());
            occurred.push(*occurred_on);
        }

        let events = sqlx::query_as::<_, Event>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM events
            WHERE (task_id, type, occurred_on) IN
                  (SELECT * FROM UNNEST($1::uuid[], $2::text[], $3::timestamptz[]))
            "#
        ))
        .bind(task_ids)
        .bind(kinds)
        .bind(occurred)
        .fetch_all(conn)
        .await?;

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_round_trip() {
        for kind in [
            EventKind::IterationChange,
            EventKind::EstimateChange,
            EventKind::UserChange,
            EventKind::Outlier,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("rank-change"), None);
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::IterationChange.to_string(), "iteration-change");
        assert_eq!(EventKind::Outlier.to_string(), "outlier");
    }
}
