/// The task change tracker
///
/// Statistics and simulations are cached derivations of task history, so
/// every task mutation must name which caches went stale and since when.
/// A [`ChangeSet`] accumulates that scope across a whole sync run:
///
/// - `(user, effort estimate)` pairs whose delivery statistics need
///   recomputation, each with the earliest affected date
/// - iteration ids whose simulations need re-running, likewise dated
///
/// The boundary for a task mutation is the minimum over every date-valued
/// field that differs between the old and new snapshots (considering both
/// the old and the new value — a date moving in either direction widens
/// the stale range). A mutation that changes no date field invalidates
/// nothing: nothing derived can have moved.
///
/// Reassignment invalidates both sides: when a task moves from user A to
/// user B, or estimate S to M, or iteration X to Y, the statistics of
/// both the previous and the new bucket are stale.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use leadtime_shared::models::task::Task;

/// Accumulated invalidation scope for one sync run
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    /// user -> estimate tag -> earliest stale date
    users: HashMap<Uuid, HashMap<Option<String>, NaiveDate>>,

    /// iteration -> earliest stale date
    iterations: HashMap<Uuid, NaiveDate>,
}

impl ChangeSet {
    /// Creates an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing has been invalidated
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.iterations.is_empty()
    }

    /// Number of stale (user, estimate) pairs
    pub fn user_pair_count(&self) -> usize {
        self.users.values().map(|ests| ests.len()).sum()
    }

    /// Number of stale iterations
    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }

    /// Records a task mutation from `old` (absent for new tasks) to `new`
    pub fn record_task(&mut self, old: Option<&Task>, new: &Task) {
        let Some(since) = change_since(old, new) else {
            return;
        };

        let mut user_ids = vec![new.user_id];
        let mut estimates = vec![new.effort_est.clone()];
        let mut iteration_ids: Vec<Uuid> = new.iteration_id.into_iter().collect();
        if let Some(old) = old {
            if old.user_id != new.user_id {
                user_ids.push(old.user_id);
            }
            if old.effort_est != new.effort_est {
                estimates.push(old.effort_est.clone());
            }
            if old.iteration_id != new.iteration_id {
                iteration_ids.extend(old.iteration_id);
            }
        }

        for user_id in &user_ids {
            for estimate in &estimates {
                self.touch_user(*user_id, estimate.clone(), since);
            }
        }
        for iteration_id in iteration_ids {
            self.touch_iteration(iteration_id, since);
        }
    }

    /// Records a calendar-triggered workday-cache recomputation
    ///
    /// The cached spans changed without any lifecycle date moving, so the
    /// stale boundary is the earliest completion date the task carries.
    pub fn record_recompute(&mut self, task: &Task) {
        let Some(since) = task.earliest_done_date() else {
            return;
        };
        self.touch_user(task.user_id, task.effort_est.clone(), since);
        if let Some(iteration_id) = task.iteration_id {
            self.touch_iteration(iteration_id, since);
        }
    }

    /// Folds another change set into this one
    pub fn merge(&mut self, other: ChangeSet) {
        for (user_id, estimates) in other.users {
            for (estimate, since) in estimates {
                self.touch_user(user_id, estimate, since);
            }
        }
        for (iteration_id, since) in other.iterations {
            self.touch_iteration(iteration_id, since);
        }
    }

    /// Consumes the set, yielding stale (user, estimate, since) triples
    pub fn into_user_invalidations(self) -> Vec<(Uuid, Option<String>, NaiveDate)> {
        let mut pairs: Vec<_> = self
            .users
            .into_iter()
            .flat_map(|(user_id, estimates)| {
                estimates
                    .into_iter()
                    .map(move |(estimate, since)| (user_id, estimate, since))
            })
            .collect();
        pairs.sort();
        pairs
    }

    /// Stale iterations with their earliest stale dates
    pub fn iteration_invalidations(&self) -> Vec<(Uuid, NaiveDate)> {
        let mut pairs: Vec<_> = self
            .iterations
            .iter()
            .map(|(id, since)| (*id, *since))
            .collect();
        pairs.sort();
        pairs
    }

    fn touch_user(&mut self, user_id: Uuid, estimate: Option<String>, since: NaiveDate) {
        let entry = self
            .users
            .entry(user_id)
            .or_default()
            .entry(estimate)
            .or_insert(since);
        *entry = (*entry).min(since);
    }

    fn touch_iteration(&mut self, iteration_id: Uuid, since: NaiveDate) {
        let entry = self.iterations.entry(iteration_id).or_insert(since);
        *entry = (*entry).min(since);
    }
}

/// The earliest date over every date-valued field that changed
///
/// Returns `None` when no date field differs, in which case the mutation
/// invalidates nothing.
fn change_since(old: Option<&Task>, new: &Task) -> Option<NaiveDate> {
    let fields = |task: &Task| {
        [
            Some(task.created_on),
            Some(task.updated_on),
            task.started_on,
            task.dev_done_on,
            task.prod_done_on,
        ]
    };

    let new_fields = fields(new);
    let old_fields: [Option<DateTime<Utc>>; 5] = match old {
        Some(old) => fields(old),
        None => [None; 5],
    };

    let mut earliest: Option<DateTime<Utc>> = None;
    for (old_value, new_value) in old_fields.into_iter().zip(new_fields) {
        if old_value == new_value {
            continue;
        }
        for value in [old_value, new_value].into_iter().flatten() {
            earliest = Some(match earliest {
                Some(current) => current.min(value),
                None => value,
            });
        }
    }

    earliest.map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn task(user_id: Uuid, est: Option<&str>) -> Task {
        Task {
            id: Uuid::new_v4(),
            ext_id: "T-1".to_string(),
            name: "task".to_string(),
            created_on: ts(2024, 1, 1),
            updated_on: ts(2024, 1, 1),
            iteration_id: None,
            user_id,
            started_on: None,
            dev_done_on: None,
            prod_done_on: None,
            effort_est: est.map(|e| e.to_string()),
            resolution: None,
            rank: None,
            round_trips: None,
            dev_done_workdays: None,
            prod_done_workdays: None,
        }
    }

    #[test]
    fn test_new_task_invalidates_owner_since_earliest_date() {
        let user = Uuid::new_v4();
        let mut new = task(user, Some("M"));
        new.started_on = Some(ts(2024, 1, 3));
        new.created_on = ts(2024, 1, 2);
        new.updated_on = ts(2024, 1, 5);

        let mut changes = ChangeSet::new();
        changes.record_task(None, &new);

        let pairs = changes.into_user_invalidations();
        assert_eq!(pairs, vec![(user, Some("M".to_string()), date(2024, 1, 2))]);
    }

    #[test]
    fn test_unchanged_dates_invalidate_nothing() {
        let user = Uuid::new_v4();
        let old = task(user, Some("M"));
        let mut new = old.clone();
        // non-date churn only
        new.name = "renamed".to_string();
        new.rank = Some(7);

        let mut changes = ChangeSet::new();
        changes.record_task(Some(&old), &new);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_user_reassignment_invalidates_both_owners() {
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let old = task(user_a, Some("M"));
        let mut new = task(user_b, Some("M"));
        new.updated_on = ts(2024, 1, 9);

        let mut changes = ChangeSet::new();
        changes.record_task(Some(&old), &new);

        let users: Vec<Uuid> = changes
            .into_user_invalidations()
            .into_iter()
            .map(|(user, _, _)| user)
            .collect();
        assert!(users.contains(&user_a));
        assert!(users.contains(&user_b));
    }

    #[test]
    fn test_estimate_change_invalidates_both_tags() {
        let user = Uuid::new_v4();
        let old = task(user, Some("S"));
        let mut new = task(user, Some("M"));
        new.updated_on = ts(2024, 1, 9);

        let mut changes = ChangeSet::new();
        changes.record_task(Some(&old), &new);

        let estimates: Vec<Option<String>> = changes
            .into_user_invalidations()
            .into_iter()
            .map(|(_, est, _)| est)
            .collect();
        assert!(estimates.contains(&Some("S".to_string())));
        assert!(estimates.contains(&Some("M".to_string())));
    }

    #[test]
    fn test_iteration_reassignment_invalidates_both_iterations() {
        let user = Uuid::new_v4();
        let iter_x = Uuid::new_v4();
        let iter_y = Uuid::new_v4();
        let mut old = task(user, None);
        old.iteration_id = Some(iter_x);
        let mut new = task(user, None);
        new.iteration_id = Some(iter_y);
        new.updated_on = ts(2024, 1, 9);

        let mut changes = ChangeSet::new();
        changes.record_task(Some(&old), &new);

        let iterations: Vec<Uuid> = changes
            .iteration_invalidations()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert!(iterations.contains(&iter_x));
        assert!(iterations.contains(&iter_y));
    }

    #[test]
    fn test_since_only_moves_earlier() {
        let user = Uuid::new_v4();
        let mut changes = ChangeSet::new();

        let mut late = task(user, Some("M"));
        late.updated_on = ts(2024, 3, 1);
        changes.record_task(None, &late);

        let mut early = task(user, Some("M"));
        early.ext_id = "T-2".to_string();
        early.created_on = ts(2024, 1, 1);
        early.updated_on = ts(2024, 2, 1);
        changes.record_task(None, &early);

        let pairs = changes.into_user_invalidations();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].2, date(2024, 1, 1));
    }

    #[test]
    fn test_date_moving_backward_widens_range() {
        let user = Uuid::new_v4();
        let mut old = task(user, Some("M"));
        old.started_on = Some(ts(2024, 2, 10));
        let mut new = old.clone();
        new.started_on = Some(ts(2024, 2, 1));

        let mut changes = ChangeSet::new();
        changes.record_task(Some(&old), &new);

        let pairs = changes.into_user_invalidations();
        // both the old and new value of the moved field are candidates;
        // created/updated fields were equal and contribute nothing
        assert_eq!(pairs[0].2, date(2024, 2, 1));
    }

    #[test]
    fn test_record_recompute_uses_earliest_done_date() {
        let user = Uuid::new_v4();
        let mut done = task(user, Some("L"));
        done.dev_done_on = Some(ts(2024, 2, 6));
        done.prod_done_on = Some(ts(2024, 2, 9));

        let mut changes = ChangeSet::new();
        changes.record_recompute(&done);

        let pairs = changes.into_user_invalidations();
        assert_eq!(pairs, vec![(user, Some("L".to_string()), date(2024, 2, 6))]);
    }

    #[test]
    fn test_record_recompute_skips_open_tasks() {
        let mut changes = ChangeSet::new();
        changes.record_recompute(&task(Uuid::new_v4(), Some("L")));
        assert!(changes.is_empty());
    }

    #[test]
    fn test_merge_keeps_earliest_dates() {
        let user = Uuid::new_v4();
        let mut a = ChangeSet::new();
        let mut late = task(user, None);
        late.updated_on = ts(2024, 3, 1);
        a.record_task(None, &late);

        let mut b = ChangeSet::new();
        let mut early = task(user, None);
        early.created_on = ts(2024, 1, 15);
        early.updated_on = ts(2024, 1, 15);
        b.record_task(None, &early);

        a.merge(b);
        let pairs = a.into_user_invalidations();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].2, date(2024, 1, 15));
    }
}
