/// The sync orchestrator
///
/// Drives every sync flow in dependency order and owns the rules that
/// connect them: calendars before workday caches, iterations and users
/// before the tasks that reference them, tasks before events, and the
/// change tracker's invalidations into the statistics engine.
///
/// # Architecture
///
/// ```text
/// SyncOrchestrator
///   ├─> Calendar: full-replace holidays/vacations, hard-delete the rest
///   │     └─> workday-cache recompute for overlapping active tasks
///   ├─> Source: incremental iterations (checkpointed)
///   ├─> Source: incremental tasks
///   │     ├─> referenced iterations reconciled first (durably)
///   │     ├─> embedded users reconciled next (durably)
///   │     ├─> task batch reconciled, workday caches force-recomputed
///   │     └─> embedded events reconciled last
///   └─> Statistics engine for exactly the invalidated (user, estimate)
///       pairs
/// ```
///
/// # Batching
///
/// Every list-shaped flow processes records in fixed-size chunks (default
/// 100). Each chunk commits atomically; a failure rolls back only the
/// current chunk, and checkpoints recorded for prior chunks stay valid.
/// Re-running a failed sync is safe because reconciliation is idempotent
/// on natural keys. The cancellation token is honored between chunks,
/// never mid-transaction.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use leadtime_shared::config::Settings;
use leadtime_shared::models::event::{Event, EventDraft};
use leadtime_shared::models::holiday::Holiday;
use leadtime_shared::models::iteration::{Iteration, IterationDraft};
use leadtime_shared::models::stat::Stat;
use leadtime_shared::models::sync::{SyncCheckpoint, SyncKind};
use leadtime_shared::models::task::{Task, TaskDraft};
use leadtime_shared::models::user::{CreateUser, User};
use leadtime_shared::models::vacation::Vacation;
use leadtime_shared::stats::{lead_time_stats, DailyStat};
use leadtime_shared::workdays::WorkWeek;

use crate::changes::ChangeSet;
use crate::reconcile::{reconcile_batch, EventKey, StatKey};
use crate::source::{Connector, SourceError, TaskRecord};

/// Sync error taxonomy
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A required mapping or setting is unusable; nothing was attempted
    #[error("Configuration error: {0}")]
    Config(String),

    /// A store-level constraint was violated; the chunk rolled back
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// The store failed; the chunk rolled back
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// A connector failed; the chunk rolled back, prior checkpoints stand
    #[error(transparent)]
    Transport(#[from] SourceError),

    /// The cancellation token fired between chunks
    #[error("Sync cancelled")]
    Cancelled,
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        let constraint = match &err {
            sqlx::Error::Database(db_err) => db_err.constraint().map(|c| c.to_string()),
            _ => None,
        };
        match constraint {
            Some(constraint) => {
                SyncError::Integrity(format!("Constraint violation: {constraint}"))
            }
            None => SyncError::Database(err),
        }
    }
}

/// Where an incremental sync starts reading
///
/// Distinguishes "use the recorded checkpoint" from "explicitly
/// everything" from "explicitly this instant" — three states one optional
/// timestamp cannot express.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    /// Resume from the latest recorded checkpoint for the sync kind
    #[default]
    FromCheckpoint,

    /// Ignore checkpoints and read everything
    All,

    /// Read records updated strictly after this instant
    Since(DateTime<Utc>),
}

/// The sync orchestrator
pub struct SyncOrchestrator {
    /// Database connection pool
    db: PgPool,

    /// Tracker and calendar connector handles
    connector: Connector,

    /// Process settings, loaded once at startup
    settings: Settings,

    /// The configured work week
    week: WorkWeek,

    /// Cooperative cancellation, checked between chunks
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    /// Creates a new orchestrator
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the configured work week does not
    /// parse
    pub fn new(db: PgPool, connector: Connector, settings: Settings) -> Result<Self, SyncError> {
        let week = settings
            .work
            .work_week()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        Ok(SyncOrchestrator {
            db,
            connector,
            settings,
            week,
            cancel: CancellationToken::new(),
        })
    }

    /// Returns the cancellation token
    ///
    /// Cancelling it stops the run at the next chunk boundary without
    /// corrupting committed state.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs every sync flow in dependency order
    ///
    /// holiday → vacation → iteration → task → stats, then records one
    /// `full` checkpoint at the maximum timestamp the sub-syncs observed.
    pub async fn sync(&self) -> Result<Option<SyncCheckpoint>, SyncError> {
        tracing::info!("Full sync starting");
        let mut observed: Vec<DateTime<Utc>> = Vec::new();

        if let Some(checkpoint) = self.sync_holidays().await? {
            observed.push(checkpoint.last_seen_update);
        }
        self.ensure_not_cancelled()?;

        if let Some(checkpoint) = self.sync_vacations().await? {
            observed.push(checkpoint.last_seen_update);
        }
        self.ensure_not_cancelled()?;

        if let Some(checkpoint) = self.sync_iterations(Cursor::FromCheckpoint, None).await? {
            observed.push(checkpoint.last_seen_update);
        }
        self.ensure_not_cancelled()?;

        if let Some(checkpoint) = self.sync_tasks(Cursor::FromCheckpoint, None).await? {
            observed.push(checkpoint.last_seen_update);
        }
        self.ensure_not_cancelled()?;

        self.sync_stats(None, None, Cursor::FromCheckpoint).await?;

        let checkpoint =
            SyncCheckpoint::record(&self.db, SyncKind::Full, observed.into_iter().max(), None)
                .await?;
        tracing::info!("Full sync complete");
        Ok(checkpoint)
    }

    /// Full-replace sync of the holiday calendar
    ///
    /// The calendar source has no update timestamps, so every run fetches
    /// the whole window, reconciles it, and hard-deletes rows the source
    /// no longer reports. Added or removed dates force workday-cache
    /// recomputation for every task whose active window overlaps them.
    pub async fn sync_holidays(&self) -> Result<Option<SyncCheckpoint>, SyncError> {
        let now = Utc::now();
        let (first_year, last_year) = holiday_window(now.year());

        let mut fetched: Vec<NaiveDate> = Vec::new();
        for year in first_year..=last_year {
            for record in self.connector.calendar.holidays(year).await? {
                fetched.push(record.date);
            }
        }
        fetched.sort();
        fetched.dedup();

        let mut added: Vec<NaiveDate> = Vec::new();
        for chunk in fetched.chunks(self.settings.sync.batch_size) {
            self.ensure_not_cancelled()?;
            let batch: Vec<(NaiveDate, ())> = chunk.iter().map(|date| (*date, ())).collect();
            let outcome = reconcile_batch::<Holiday>(&self.db, None, batch).await?;
            added.extend(outcome.created);
        }

        // deletions stay scoped to the refetched window so history
        // outside it survives the full-replace rule
        let (window_start, window_stop) = year_bounds(first_year, last_year);
        let removed = Holiday::delete_missing(&self.db, window_start, window_stop, &fetched).await?;

        let mut affected = added.clone();
        affected.extend(removed.iter().copied());
        affected.sort();
        affected.dedup();

        let mut changes = ChangeSet::new();
        let recomputed = self
            .recompute_workdays_over(&affected, None, &mut changes)
            .await?;
        self.refresh_stats(changes).await?;

        tracing::info!(
            fetched = fetched.len(),
            added = added.len(),
            removed = removed.len(),
            recomputed,
            "Holiday sync complete"
        );

        let notes = serde_json::json!({ "added": added.len(), "removed": removed.len() });
        Ok(SyncCheckpoint::record(&self.db, SyncKind::Holiday, Some(now), Some(notes)).await?)
    }

    /// Full-replace sync of every user's vacation calendar
    ///
    /// Same semantics as [`SyncOrchestrator::sync_holidays`], scoped per
    /// user: only the owning user's overlapping tasks are recomputed.
    pub async fn sync_vacations(&self) -> Result<Option<SyncCheckpoint>, SyncError> {
        let now = Utc::now();
        let users = User::list(&self.db).await?;

        let mut changes = ChangeSet::new();
        let mut total_added = 0usize;
        let mut total_removed = 0usize;

        for user in &users {
            self.ensure_not_cancelled()?;

            let mut fetched: Vec<NaiveDate> = self
                .connector
                .calendar
                .vacations(&user.email)
                .await?
                .into_iter()
                .map(|record| record.date)
                .collect();
            fetched.sort();
            fetched.dedup();

            let mut added: Vec<NaiveDate> = Vec::new();
            for chunk in fetched.chunks(self.settings.sync.batch_size) {
                self.ensure_not_cancelled()?;
                let batch: Vec<((Uuid, NaiveDate), ())> =
                    chunk.iter().map(|date| ((user.id, *date), ())).collect();
                let outcome = reconcile_batch::<Vacation>(&self.db, None, batch).await?;
                added.extend(outcome.created.into_iter().map(|(_, date)| date));
            }

            let removed = Vacation::delete_missing_for_user(&self.db, user.id, &fetched).await?;

            let mut affected = added.clone();
            affected.extend(removed.iter().copied());
            affected.sort();
            affected.dedup();

            self.recompute_workdays_over(&affected, Some(user.id), &mut changes)
                .await?;

            total_added += added.len();
            total_removed += removed.len();
        }

        self.refresh_stats(changes).await?;

        tracing::info!(
            users = users.len(),
            added = total_added,
            removed = total_removed,
            "Vacation sync complete"
        );

        let notes = serde_json::json!({ "added": total_added, "removed": total_removed });
        Ok(SyncCheckpoint::record(&self.db, SyncKind::Vacation, Some(now), Some(notes)).await?)
    }

    /// Incremental sync of iterations
    ///
    /// With `ids` set this is a targeted re-fetch: the listed iterations
    /// are reconciled but no checkpoint is recorded, since a targeted
    /// fetch is not a full interval scan.
    pub async fn sync_iterations(
        &self,
        cursor: Cursor,
        ids: Option<&[String]>,
    ) -> Result<Option<SyncCheckpoint>, SyncError> {
        let targeted = ids.is_some();
        // a targeted re-fetch reads the named records in full; the
        // checkpoint only bounds interval scans
        let since = match (targeted, cursor) {
            (true, Cursor::FromCheckpoint) => None,
            _ => self.resolve_cursor(cursor, SyncKind::Iteration).await?,
        };
        let records = self.connector.source.iterations(since, ids).await?;

        let mut high_water = since;
        let mut checkpoint = None;
        for chunk in records.chunks(self.settings.sync.batch_size) {
            self.ensure_not_cancelled()?;
            let batch: Vec<(String, IterationDraft)> = chunk
                .iter()
                .map(|record| {
                    (
                        record.ext_id.clone(),
                        IterationDraft {
                            name: record.name.clone(),
                            created_on: record.created_on,
                            updated_on: record.updated_on,
                            rank: record.rank,
                            effort_est: record.effort_est.clone(),
                            value_est: record.value_est.clone(),
                            team: record.team.clone(),
                        },
                    )
                })
                .collect();

            let outcome = reconcile_batch::<Iteration>(&self.db, high_water, batch).await?;
            high_water = outcome.high_water;
            if !targeted {
                checkpoint =
                    SyncCheckpoint::record(&self.db, SyncKind::Iteration, high_water, None).await?;
            }
        }

        tracing::info!(total = records.len(), targeted, "Iteration sync complete");
        Ok(checkpoint)
    }

    /// Incremental sync of tasks, their users, and their events
    ///
    /// The most involved flow; see the module documentation for the
    /// ordering guarantees each chunk provides.
    pub async fn sync_tasks(
        &self,
        cursor: Cursor,
        ids: Option<&[String]>,
    ) -> Result<Option<SyncCheckpoint>, SyncError> {
        let targeted = ids.is_some();
        let since = match (targeted, cursor) {
            (true, Cursor::FromCheckpoint) => None,
            _ => self.resolve_cursor(cursor, SyncKind::Task).await?,
        };
        let mut records = self.connector.source.tasks(since, ids).await?;

        if self.settings.tasks.discard_on_sync {
            let before = records.len();
            records.retain(|record| match &record.resolution {
                Some(resolution) => !self.settings.tasks.discard_resolutions.contains(resolution),
                None => true,
            });
            let dropped = before - records.len();
            if dropped > 0 {
                tracing::debug!(dropped, "Dropped discard-listed tasks at ingestion");
            }
        }

        let mut changes = ChangeSet::new();
        let mut high_water = since;
        let mut checkpoint = None;
        for chunk in records.chunks(self.settings.sync.batch_size) {
            self.ensure_not_cancelled()?;
            high_water = self.sync_task_chunk(chunk, high_water, &mut changes).await?;
            if !targeted {
                checkpoint =
                    SyncCheckpoint::record(&self.db, SyncKind::Task, high_water, None).await?;
            }
        }

        let stat_rows = self.refresh_stats(changes).await?;
        tracing::info!(
            total = records.len(),
            targeted,
            stat_rows,
            "Task sync complete"
        );
        Ok(checkpoint)
    }

    /// Recomputes statistics for users × estimates
    ///
    /// Defaults to every user and every estimate tag seen on that user's
    /// tasks, since the last task checkpoint (decay moves the aggregates
    /// even when no task changed). Returns the number of stat rows
    /// written.
    pub async fn sync_stats(
        &self,
        users: Option<&[Uuid]>,
        estimates: Option<&[Option<String>]>,
        cursor: Cursor,
    ) -> Result<usize, SyncError> {
        let since = self
            .resolve_cursor(cursor, SyncKind::Task)
            .await?
            .map(|t| t.date_naive());

        let user_ids: Vec<Uuid> = match users {
            Some(ids) => ids.to_vec(),
            None => User::list(&self.db).await?.into_iter().map(|u| u.id).collect(),
        };

        let mut written = 0usize;
        for user_id in user_ids {
            self.ensure_not_cancelled()?;
            let tags: Vec<Option<String>> = match estimates {
                Some(tags) => tags.to_vec(),
                None => Task::distinct_efforts(&self.db, Some(user_id)).await?,
            };
            for tag in tags {
                written += self
                    .recompute_stat_pair(user_id, tag.as_deref(), since)
                    .await?;
            }
        }

        tracing::info!(stat_rows = written, "Stats sync complete");
        Ok(written)
    }

    /// Reconciles one chunk of task records
    ///
    /// Ordering inside the chunk: referenced iterations are durably
    /// reconciled first, then embedded users, then the tasks themselves,
    /// then forced workday recomputation, then the embedded events. Old
    /// and new snapshots feed the change tracker throughout.
    async fn sync_task_chunk(
        &self,
        chunk: &[TaskRecord],
        high_water: Option<DateTime<Utc>>,
        changes: &mut ChangeSet,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        // gather every referenced iteration and user up front
        let mut iteration_refs: BTreeSet<String> = BTreeSet::new();
        let mut user_drafts: Vec<(String, CreateUser)> = Vec::new();
        let mut user_index: HashMap<String, usize> = HashMap::new();

        {
            let mut note_user = |raw_email: &str, pm_name: Option<String>| {
                let email = raw_email.trim().to_string();
                if email.is_empty() {
                    return;
                }
                match user_index.get(&email) {
                    Some(&i) => {
                        if user_drafts[i].1.pm_name.is_none() {
                            if let Some(pm_name) = pm_name {
                                user_drafts[i].1.pm_name = Some(pm_name);
                            }
                        }
                    }
                    None => {
                        user_index.insert(email.clone(), user_drafts.len());
                        user_drafts.push((
                            email.clone(),
                            CreateUser { email, pm_name },
                        ));
                    }
                }
            };

            for record in chunk {
                note_user(&record.user.email, record.user.pm_name.clone());
                if let Some(ext_id) = &record.iteration_ext_id {
                    iteration_refs.insert(ext_id.clone());
                }
                for change in &record.events {
                    for ext_id in [&change.iteration_ext_id, &change.from_iteration_ext_id]
                        .into_iter()
                        .flatten()
                    {
                        iteration_refs.insert(ext_id.clone());
                    }
                    for email in [&change.from_user_email, &change.to_user_email]
                        .into_iter()
                        .flatten()
                    {
                        note_user(email, None);
                    }
                }
            }
        }

        // iterations must be durably reconciled before any task
        // references them
        let mut iterations: HashMap<String, Iteration> = HashMap::new();
        if !iteration_refs.is_empty() {
            let refs: Vec<String> = iteration_refs.into_iter().collect();
            self.sync_iterations(Cursor::All, Some(&refs)).await?;
            for iteration in Iteration::lookup_by_ext_ids(&self.db, &refs).await? {
                iterations.insert(iteration.ext_id.clone(), iteration);
            }
        }

        // users next, durably, keyed by trimmed email
        let user_outcome = reconcile_batch::<User>(&self.db, None, user_drafts).await?;

        // old snapshots before the overwrite, for change tracking
        let ext_ids: Vec<String> = chunk.iter().map(|record| record.ext_id.clone()).collect();
        let old_tasks: HashMap<String, Task> = Task::lookup_by_ext_ids(&self.db, &ext_ids)
            .await?
            .into_iter()
            .map(|task| (task.ext_id.clone(), task))
            .collect();

        // the task batch itself
        let mut task_batch: Vec<(String, TaskDraft)> = Vec::with_capacity(chunk.len());
        for record in chunk {
            let Some(owner) = user_outcome.rows.get(record.user.email.trim()) else {
                return Err(SyncError::Config(format!(
                    "Task {} carries no usable owner email",
                    record.ext_id
                )));
            };
            let iteration_id = record
                .iteration_ext_id
                .as_ref()
                .and_then(|ext_id| iterations.get(ext_id))
                .map(|iteration| iteration.id);

            task_batch.push((
                record.ext_id.clone(),
                TaskDraft {
                    name: record.name.clone(),
                    created_on: record.created_on,
                    updated_on: record.updated_on,
                    iteration_id,
                    user_id: owner.id,
                    started_on: record.started_on,
                    dev_done_on: record.dev_done_on,
                    prod_done_on: record.prod_done_on,
                    effort_est: record.effort_est.clone(),
                    resolution: record.resolution.clone(),
                    rank: record.rank,
                    round_trips: record.round_trips,
                },
            ));
        }

        let outcome = reconcile_batch::<Task>(&self.db, high_water, task_batch).await?;
        let high_water = outcome.high_water;
        let mut fresh = outcome.rows;

        // force-recompute workday caches for the whole chunk: even
        // unchanged lifecycle dates go stale when calendars moved
        // concurrently
        let holidays = Holiday::dates(&self.db).await?;
        let mut vacations: HashMap<Uuid, HashSet<NaiveDate>> = HashMap::new();
        for task in fresh.values_mut() {
            if !vacations.contains_key(&task.user_id) {
                let dates = Vacation::dates_for_user(&self.db, task.user_id).await?;
                vacations.insert(task.user_id, dates);
            }
            let mut excludes = holidays.clone();
            excludes.extend(vacations[&task.user_id].iter().copied());

            let (dev, prod) = task.workday_spans(&excludes, &self.week);
            if dev != task.dev_done_workdays || prod != task.prod_done_workdays {
                Task::store_workdays(&self.db, task.id, dev, prod).await?;
                task.dev_done_workdays = dev;
                task.prod_done_workdays = prod;
            }
        }

        // events last, keyed (task, type, occurred-on) for idempotent
        // re-ingestion
        let mut event_batch: Vec<(EventKey, EventDraft)> = Vec::new();
        for record in chunk {
            let Some(task) = fresh.get(&record.ext_id) else {
                continue;
            };
            for change in &record.events {
                let resolve_iteration = |ext_id: &Option<String>| {
                    ext_id
                        .as_ref()
                        .and_then(|ext_id| iterations.get(ext_id))
                        .map(|iteration| iteration.id)
                };
                let resolve_user = |email: &Option<String>| {
                    email
                        .as_ref()
                        .and_then(|email| user_outcome.rows.get(email.trim()))
                        .map(|user| user.id)
                };

                event_batch.push((
                    (task.id, change.kind.as_str().to_string(), change.occurred_on),
                    EventDraft {
                        iteration_id: resolve_iteration(&change.iteration_ext_id),
                        from_iteration_id: resolve_iteration(&change.from_iteration_ext_id),
                        from_user_id: resolve_user(&change.from_user_email),
                        to_user_id: resolve_user(&change.to_user_email),
                        from_effort_est: change.from_effort_est.clone(),
                        to_effort_est: change.to_effort_est.clone(),
                    },
                ));
            }
        }
        reconcile_batch::<Event>(&self.db, None, event_batch).await?;

        // feed the change tracker: snapshot diffs plus cache-only deltas
        for (ext_id, task) in &fresh {
            let old = old_tasks.get(ext_id);
            changes.record_task(old, task);
            let caches_moved = old.is_some_and(|old| {
                old.dev_done_workdays != task.dev_done_workdays
                    || old.prod_done_workdays != task.prod_done_workdays
            });
            if caches_moved {
                changes.record_recompute(task);
            }
        }

        Ok(high_water)
    }

    /// Recomputes workday caches for tasks overlapping the given dates
    ///
    /// A task overlaps a date when it started on or before it and had not
    /// reached production before it. `user_id` scopes the search when the
    /// calendar change was vacation-specific. Tasks whose caches actually
    /// moved are recorded in the change set.
    async fn recompute_workdays_over(
        &self,
        dates: &[NaiveDate],
        user_id: Option<Uuid>,
        changes: &mut ChangeSet,
    ) -> Result<usize, SyncError> {
        if dates.is_empty() {
            return Ok(0);
        }

        let mut tasks: HashMap<Uuid, Task> = HashMap::new();
        for date in dates {
            for task in Task::find_active_over(&self.db, *date, user_id).await? {
                tasks.entry(task.id).or_insert(task);
            }
        }
        if tasks.is_empty() {
            return Ok(0);
        }

        let holidays = Holiday::dates(&self.db).await?;
        let mut vacations: HashMap<Uuid, HashSet<NaiveDate>> = HashMap::new();
        let mut recomputed = 0usize;

        for task in tasks.values() {
            if !vacations.contains_key(&task.user_id) {
                let dates = Vacation::dates_for_user(&self.db, task.user_id).await?;
                vacations.insert(task.user_id, dates);
            }
            let mut excludes = holidays.clone();
            excludes.extend(vacations[&task.user_id].iter().copied());

            let (dev, prod) = task.workday_spans(&excludes, &self.week);
            if dev != task.dev_done_workdays || prod != task.prod_done_workdays {
                Task::store_workdays(&self.db, task.id, dev, prod).await?;
                changes.record_recompute(task);
                recomputed += 1;
            }
        }

        Ok(recomputed)
    }

    /// Recomputes statistics for exactly the invalidated pairs
    async fn refresh_stats(&self, changes: ChangeSet) -> Result<usize, SyncError> {
        if changes.is_empty() {
            return Ok(0);
        }

        let stale_iterations = changes.iteration_count();
        if stale_iterations > 0 {
            // simulations consume this scope when an engine lands; for
            // now the invalidation is only surfaced
            tracing::debug!(iterations = stale_iterations, "Iteration history changed");
        }

        let mut written = 0usize;
        for (user_id, estimate, since) in changes.into_user_invalidations() {
            self.ensure_not_cancelled()?;
            written += self
                .recompute_stat_pair(user_id, estimate.as_deref(), Some(since))
                .await?;
        }
        Ok(written)
    }

    /// Recomputes and reconciles stat rows for one (user, estimate) pair
    async fn recompute_stat_pair(
        &self,
        user_id: Uuid,
        effort_est: Option<&str>,
        since: Option<NaiveDate>,
    ) -> Result<usize, SyncError> {
        let rows = Task::delivery_rows(&self.db, user_id, effort_est).await?;
        let until = Utc::now().date_naive();
        let days = lead_time_stats(&rows, since, until, &self.settings.forecast, &self.settings.tasks);

        let mut written = 0usize;
        for chunk in days.chunks(self.settings.sync.batch_size) {
            self.ensure_not_cancelled()?;
            let batch: Vec<(StatKey, DailyStat)> = chunk
                .iter()
                .map(|day| {
                    (
                        (user_id, effort_est.map(str::to_string), day.as_of),
                        day.clone(),
                    )
                })
                .collect();
            let outcome = reconcile_batch::<Stat>(&self.db, None, batch).await?;
            written += outcome.rows.len();
        }

        Ok(written)
    }

    async fn resolve_cursor(
        &self,
        cursor: Cursor,
        kind: SyncKind,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        match cursor {
            Cursor::FromCheckpoint => Ok(SyncCheckpoint::latest(&self.db, kind)
                .await?
                .map(|checkpoint| checkpoint.last_seen_update)),
            Cursor::All => Ok(None),
            Cursor::Since(instant) => Ok(Some(instant)),
        }
    }

    fn ensure_not_cancelled(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// The year window holidays are fetched (and deletions scoped) over
fn holiday_window(current_year: i32) -> (i32, i32) {
    (current_year - 1, current_year + 1)
}

/// First and last calendar dates of a year window
fn year_bounds(first_year: i32, last_year: i32) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(first_year, 1, 1).unwrap_or(NaiveDate::MIN);
    let stop = NaiveDate::from_ymd_opt(last_year, 12, 31).unwrap_or(NaiveDate::MAX);
    (start, stop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_default_resumes_from_checkpoint() {
        assert_eq!(Cursor::default(), Cursor::FromCheckpoint);
    }

    #[test]
    fn test_holiday_window_spans_three_years() {
        assert_eq!(holiday_window(2024), (2023, 2025));
    }

    #[test]
    fn test_year_bounds() {
        let (start, stop) = year_bounds(2023, 2025);
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(stop, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    }

    #[test]
    fn test_sync_error_maps_plain_db_errors() {
        let err: SyncError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, SyncError::Database(_)));
    }

    #[test]
    fn test_sync_error_display() {
        assert_eq!(
            SyncError::Config("bad week".to_string()).to_string(),
            "Configuration error: bad week"
        );
        assert_eq!(SyncError::Cancelled.to_string(), "Sync cancelled");
    }

    // The orchestration flows are exercised against a running database
    // with the in-memory connector.
}
