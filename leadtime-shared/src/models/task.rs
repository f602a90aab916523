/// Task model: units of work with lifecycle timestamps
///
/// Tasks are "stories" or "cards" in the upstream tracker. Each task
/// belongs to exactly one user and at most one iteration, and carries the
/// lifecycle timestamps (started, dev-done, prod-done) from which the
/// cached workday spans are derived.
///
/// # Workday caches
///
/// `dev_done_workdays` and `prod_done_workdays` must always equal
/// `net_workdays(started_on, X_done_on)` excluding holidays and the
/// owner's vacations. They are recomputed (never left stale) whenever
/// calendar data overlapping the task's active window changes; see
/// [`Task::workday_spans`] and the sync orchestrator.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     ext_id VARCHAR(255) NOT NULL UNIQUE,
///     name VARCHAR(255) NOT NULL,
///     created_on TIMESTAMPTZ NOT NULL,
///     updated_on TIMESTAMPTZ NOT NULL,
///     iteration_id UUID REFERENCES iterations(id) ON DELETE SET NULL,
///     user_id UUID NOT NULL REFERENCES users(id),
///     started_on TIMESTAMPTZ,
///     dev_done_on TIMESTAMPTZ,
///     prod_done_on TIMESTAMPTZ,
///     effort_est VARCHAR(50),
///     resolution VARCHAR(50),
///     rank INTEGER,
///     round_trips INTEGER,
///     dev_done_workdays INTEGER,
///     prod_done_workdays INTEGER
/// );
/// ```

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

use crate::workdays::{net_workdays, WorkWeek};

/// Task model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Task {
    /// Unique task ID
    pub id: Uuid,

    /// External tracker id (natural key)
    pub ext_id: String,

    /// Human-readable name
    pub name: String,

    /// When the task was created in the tracker
    pub created_on: DateTime<Utc>,

    /// When the task was last updated in the tracker
    pub updated_on: DateTime<Utc>,

    /// Iteration the task currently belongs to, if any
    pub iteration_id: Option<Uuid>,

    /// Owning user
    pub user_id: Uuid,

    /// When work started
    pub started_on: Option<DateTime<Utc>>,

    /// When development finished
    pub dev_done_on: Option<DateTime<Utc>>,

    /// When the work reached production
    pub prod_done_on: Option<DateTime<Utc>>,

    /// Effort estimate tag
    pub effort_est: Option<String>,

    /// Resolution outcome recorded by the tracker
    pub resolution: Option<String>,

    /// Ordering rank in the tracker backlog
    pub rank: Option<i32>,

    /// Number of times the task returned to a testing state
    pub round_trips: Option<i32>,

    /// Cached workdays from start to dev-done
    pub dev_done_workdays: Option<i32>,

    /// Cached workdays from start to prod-done
    pub prod_done_workdays: Option<i32>,
}

/// Input for creating or overwriting a task
///
/// The workday caches are not part of the draft: on insert they start
/// unset, and every sync chunk force-recomputes them afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub name: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub iteration_id: Option<Uuid>,
    pub user_id: Uuid,
    pub started_on: Option<DateTime<Utc>>,
    pub dev_done_on: Option<DateTime<Utc>>,
    pub prod_done_on: Option<DateTime<Utc>>,
    pub effort_est: Option<String>,
    pub resolution: Option<String>,
    pub rank: Option<i32>,
    pub round_trips: Option<i32>,
}

/// One task's contribution to the statistics evidence for its owner
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeliveryRow {
    pub dev_done_on: Option<DateTime<Utc>>,
    pub prod_done_on: Option<DateTime<Utc>>,
    pub dev_done_workdays: Option<i32>,
    pub prod_done_workdays: Option<i32>,
    pub round_trips: Option<i32>,
    pub resolution: Option<String>,
}

const TASK_COLUMNS: &str = "id, ext_id, name, created_on, updated_on, iteration_id, user_id, \
     started_on, dev_done_on, prod_done_on, effort_est, resolution, rank, round_trips, \
     dev_done_workdays, prod_done_workdays";

impl Task {
    /// Inserts a new task with unset workday caches
    pub async fn create(
        conn: &mut PgConnection,
        ext_id: &str,
        draft: &TaskDraft,
    ) -> Result<Self, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (ext_id, name, created_on, updated_on, iteration_id,
                               user_id, started_on, dev_done_on, prod_done_on,
                               effort_est, resolution, rank, round_trips)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(ext_id)
        .bind(&draft.name)
        .bind(draft.created_on)
        .bind(draft.updated_on)
        .bind(draft.iteration_id)
        .bind(draft.user_id)
        .bind(draft.started_on)
        .bind(draft.dev_done_on)
        .bind(draft.prod_done_on)
        .bind(&draft.effort_est)
        .bind(&draft.resolution)
        .bind(draft.rank)
        .bind(draft.round_trips)
        .fetch_one(conn)
        .await?;

        Ok(task)
    }

    /// Overwrites every externally-sourced field of an existing task
    ///
    /// The workday caches survive the overwrite; the caller recomputes
    /// them once the whole chunk is reconciled.
    pub async fn overwrite(
        conn: &mut PgConnection,
        id: Uuid,
        draft: &TaskDraft,
    ) -> Result<Self, sqlx::Error> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
            SET name = $2, created_on = $3, updated_on = $4, iteration_id = $5,
                user_id = $6, started_on = $7, dev_done_on = $8, prod_done_on = $9,
                effort_est = $10, resolution = $11, rank = $12, round_trips = $13
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&draft.name)
        .bind(draft.created_on)
        .bind(draft.updated_on)
        .bind(draft.iteration_id)
        .bind(draft.user_id)
        .bind(draft.started_on)
        .bind(draft.dev_done_on)
        .bind(draft.prod_done_on)
        .bind(&draft.effort_est)
        .bind(&draft.resolution)
        .bind(draft.rank)
        .bind(draft.round_trips)
        .fetch_one(conn)
        .await?;

        Ok(task)
    }

    /// Finds all tasks whose external id appears in `ext_ids`
    pub async fn find_by_ext_ids(
        conn: &mut PgConnection,
        ext_ids: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE ext_id = ANY($1)"
        ))
        .bind(ext_ids)
        .fetch_all(conn)
        .await?;

        Ok(tasks)
    }

    /// Pool variant of [`Task::find_by_ext_ids`] for read-only callers
    pub async fn lookup_by_ext_ids(
        pool: &PgPool,
        ext_ids: &[String],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut conn = pool.acquire().await?;
        Self::find_by_ext_ids(&mut conn, ext_ids).await
    }

    /// Finds tasks whose active window overlaps `date`
    ///
    /// A task is active over a date when it has started on or before that
    /// date and has not reached production before it. When `user_id` is
    /// given the search is scoped to that user's tasks (vacation changes
    /// only affect their owner).
    pub async fn find_active_over(
        pool: &PgPool,
        date: NaiveDate,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
            FROM tasks
            WHERE started_on IS NOT NULL
              AND started_on::date <= $1
              AND (prod_done_on IS NULL OR prod_done_on::date >= $1)
              AND ($2::uuid IS NULL OR user_id = $2)
            "#
        ))
        .bind(date)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(tasks)
    }

    /// Stores freshly computed workday caches
    pub async fn store_workdays(
        pool: &PgPool,
        id: Uuid,
        dev_done_workdays: Option<i32>,
        prod_done_workdays: Option<i32>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE tasks
            SET dev_done_workdays = $2, prod_done_workdays = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(dev_done_workdays)
        .bind(prod_done_workdays)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Loads the delivery evidence rows for one user and estimate tag
    ///
    /// Only tasks with at least one completion date contribute evidence.
    pub async fn delivery_rows(
        pool: &PgPool,
        user_id: Uuid,
        effort_est: Option<&str>,
    ) -> Result<Vec<DeliveryRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, DeliveryRow>(
            r#"
            SELECT dev_done_on, prod_done_on, dev_done_workdays,
                   prod_done_workdays, round_trips, resolution
            FROM tasks
            WHERE user_id = $1
              AND effort_est IS NOT DISTINCT FROM $2
              AND (dev_done_on IS NOT NULL OR prod_done_on IS NOT NULL)
            "#,
        )
        .bind(user_id)
        .bind(effort_est)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Returns the distinct effort-estimate tags seen on a user's tasks
    ///
    /// With `user_id` of `None`, returns the tags seen across all tasks.
    pub async fn distinct_efforts(
        pool: &PgPool,
        user_id: Option<Uuid>,
    ) -> Result<Vec<Option<String>>, sqlx::Error> {
        let rows: Vec<(Option<String>,)> = sqlx::query_as(
            r#"
            SELECT effort_est
            FROM tasks
            WHERE $1::uuid IS NULL OR user_id = $1
            GROUP BY effort_est
            ORDER BY effort_est
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|(est,)| est).collect())
    }

    /// Computes the workday spans this task should cache
    ///
    /// Returns `(dev_done_workdays, prod_done_workdays)`; a span is `None`
    /// unless both `started_on` and the matching done timestamp are set.
    pub fn workday_spans(
        &self,
        excludes: &HashSet<NaiveDate>,
        week: &WorkWeek,
    ) -> (Option<i32>, Option<i32>) {
        let Some(started) = self.started_on else {
            return (None, None);
        };
        let start = started.date_naive();
        let span = |stop: Option<DateTime<Utc>>| {
            stop.map(|s| net_workdays(start, s.date_naive(), excludes, week) as i32)
        };
        (span(self.dev_done_on), span(self.prod_done_on))
    }

    /// The earliest completion date present on the task, if any
    pub fn earliest_done_date(&self) -> Option<NaiveDate> {
        match (self.dev_done_on, self.prod_done_on) {
            (Some(dev), Some(prod)) => Some(dev.min(prod).date_naive()),
            (Some(dev), None) => Some(dev.date_naive()),
            (None, Some(prod)) => Some(prod.date_naive()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn task_with_dates(
        started: Option<(i32, u32, u32)>,
        dev_done: Option<(i32, u32, u32)>,
        prod_done: Option<(i32, u32, u32)>,
    ) -> Task {
        let ts = |ymd: (i32, u32, u32)| {
            Utc.with_ymd_and_hms(ymd.0, ymd.1, ymd.2, 12, 0, 0).unwrap()
        };
        Task {
            id: Uuid::new_v4(),
            ext_id: "T-1".to_string(),
            name: "task".to_string(),
            created_on: ts((2024, 1, 1)),
            updated_on: ts((2024, 1, 1)),
            iteration_id: None,
            user_id: Uuid::new_v4(),
            started_on: started.map(ts),
            dev_done_on: dev_done.map(ts),
            prod_done_on: prod_done.map(ts),
            effort_est: Some("M".to_string()),
            resolution: None,
            rank: None,
            round_trips: None,
            dev_done_workdays: None,
            prod_done_workdays: None,
        }
    }

    #[test]
    fn test_workday_spans_same_day() {
        let task = task_with_dates(Some((2024, 1, 1)), Some((2024, 1, 1)), None);
        let (dev, prod) = task.workday_spans(&HashSet::new(), &WorkWeek::default());
        assert_eq!(dev, Some(1));
        assert_eq!(prod, None);
    }

    #[test]
    fn test_workday_spans_with_holiday() {
        // Mon 2024-01-01 -> Mon 2024-01-08, Wed 2024-01-03 excluded:
        // Mon, Tue, Thu, Fri, Mon = 5
        let task = task_with_dates(Some((2024, 1, 1)), Some((2024, 1, 8)), None);
        let excludes: HashSet<_> = [NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()]
            .into_iter()
            .collect();
        let (dev, _) = task.workday_spans(&excludes, &WorkWeek::default());
        assert_eq!(dev, Some(5));
    }

    #[test]
    fn test_workday_spans_unstarted_task() {
        let task = task_with_dates(None, Some((2024, 1, 8)), Some((2024, 1, 9)));
        assert_eq!(
            task.workday_spans(&HashSet::new(), &WorkWeek::default()),
            (None, None)
        );
    }

    #[test]
    fn test_earliest_done_date() {
        let task = task_with_dates(Some((2024, 1, 1)), Some((2024, 1, 4)), Some((2024, 1, 9)));
        assert_eq!(
            task.earliest_done_date(),
            Some(NaiveDate::from_ymd_opt(2024, 1, 4).unwrap())
        );

        let open = task_with_dates(Some((2024, 1, 1)), None, None);
        assert_eq!(open.earliest_done_date(), None);
    }

    // Query operations are exercised through the sync flows against a
    // running database.
}
