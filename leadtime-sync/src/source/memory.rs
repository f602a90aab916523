/// In-memory connector for testing and local runs
///
/// Holds iteration, task, holiday, and vacation records in memory and
/// serves them through the `Source` and `Calendar` contracts with the
/// same filtering semantics a real tracker link applies (`since` on
/// `updated_on`, explicit id lists, per-year holidays, per-email
/// vacations).
///
/// # Example
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use leadtime_sync::source::{InMemoryConnector, IterationRecord, Source};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let connector = InMemoryConnector::new();
/// connector.push_iteration(IterationRecord {
///     ext_id: "EPIC-1".to_string(),
///     name: "Search rewrite".to_string(),
///     created_on: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
///     updated_on: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
///     rank: 1,
///     effort_est: Some("L".to_string()),
///     value_est: None,
///     team: None,
/// }).await;
///
/// let all = connector.iterations(None, None).await?;
/// assert_eq!(all.len(), 1);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use tokio::sync::Mutex;

use super::{Calendar, HolidayRecord, IterationRecord, Source, SourceError, TaskRecord, VacationRecord};

#[derive(Default)]
struct Records {
    iterations: Vec<IterationRecord>,
    tasks: Vec<TaskRecord>,
    holidays: Vec<HolidayRecord>,
    vacations: Vec<VacationRecord>,
}

/// Connector backed by in-memory record stores
#[derive(Default)]
pub struct InMemoryConnector {
    records: Mutex<Records>,
}

impl InMemoryConnector {
    /// Creates an empty in-memory connector
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an iteration record by external id
    pub async fn push_iteration(&self, record: IterationRecord) {
        let mut records = self.records.lock().await;
        records.iterations.retain(|r| r.ext_id != record.ext_id);
        records.iterations.push(record);
    }

    /// Adds or replaces a task record by external id
    pub async fn push_task(&self, record: TaskRecord) {
        let mut records = self.records.lock().await;
        records.tasks.retain(|r| r.ext_id != record.ext_id);
        records.tasks.push(record);
    }

    /// Adds a holiday record
    pub async fn push_holiday(&self, record: HolidayRecord) {
        let mut records = self.records.lock().await;
        records.holidays.retain(|r| r.date != record.date);
        records.holidays.push(record);
    }

    /// Removes a holiday record, as a shrinking calendar would
    pub async fn remove_holiday(&self, record: HolidayRecord) {
        let mut records = self.records.lock().await;
        records.holidays.retain(|r| r.date != record.date);
    }

    /// Adds a vacation record
    pub async fn push_vacation(&self, record: VacationRecord) {
        let mut records = self.records.lock().await;
        records
            .vacations
            .retain(|r| !(r.email == record.email && r.date == record.date));
        records.vacations.push(record);
    }

    /// Removes a vacation record
    pub async fn remove_vacation(&self, record: VacationRecord) {
        let mut records = self.records.lock().await;
        records
            .vacations
            .retain(|r| !(r.email == record.email && r.date == record.date));
    }
}

fn keep(
    since: Option<DateTime<Utc>>,
    ids: Option<&[String]>,
    updated_on: DateTime<Utc>,
    ext_id: &str,
) -> bool {
    if let Some(since) = since {
        if updated_on <= since {
            return false;
        }
    }
    if let Some(ids) = ids {
        if !ids.iter().any(|id| id == ext_id) {
            return false;
        }
    }
    true
}

#[async_trait]
impl Source for InMemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn iterations(
        &self,
        since: Option<DateTime<Utc>>,
        ids: Option<&[String]>,
    ) -> Result<Vec<IterationRecord>, SourceError> {
        let records = self.records.lock().await;
        Ok(records
            .iterations
            .iter()
            .filter(|r| keep(since, ids, r.updated_on, &r.ext_id))
            .cloned()
            .collect())
    }

    async fn tasks(
        &self,
        since: Option<DateTime<Utc>>,
        ids: Option<&[String]>,
    ) -> Result<Vec<TaskRecord>, SourceError> {
        let records = self.records.lock().await;
        Ok(records
            .tasks
            .iter()
            .filter(|r| keep(since, ids, r.updated_on, &r.ext_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Calendar for InMemoryConnector {
    fn name(&self) -> &str {
        "memory"
    }

    async fn holidays(&self, year: i32) -> Result<Vec<HolidayRecord>, SourceError> {
        let records = self.records.lock().await;
        Ok(records
            .holidays
            .iter()
            .filter(|r| r.date.year() == year)
            .copied()
            .collect())
    }

    async fn vacations(&self, email: &str) -> Result<Vec<VacationRecord>, SourceError> {
        let records = self.records.lock().await;
        Ok(records
            .vacations
            .iter()
            .filter(|r| r.email == email)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn iteration(ext_id: &str, updated_day: u32) -> IterationRecord {
        IterationRecord {
            ext_id: ext_id.to_string(),
            name: format!("iteration {ext_id}"),
            created_on: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            updated_on: Utc.with_ymd_and_hms(2024, 1, updated_day, 0, 0, 0).unwrap(),
            rank: 0,
            effort_est: None,
            value_est: None,
            team: None,
        }
    }

    #[tokio::test]
    async fn test_since_filter_is_exclusive() {
        let connector = InMemoryConnector::new();
        connector.push_iteration(iteration("A", 5)).await;
        connector.push_iteration(iteration("B", 10)).await;

        let since = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let fresh = connector.iterations(Some(since), None).await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].ext_id, "B");
    }

    #[tokio::test]
    async fn test_ids_filter_selects_exact_records() {
        let connector = InMemoryConnector::new();
        connector.push_iteration(iteration("A", 5)).await;
        connector.push_iteration(iteration("B", 10)).await;

        let ids = vec!["A".to_string()];
        let picked = connector.iterations(None, Some(&ids)).await.unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].ext_id, "A");
    }

    #[tokio::test]
    async fn test_push_replaces_by_ext_id() {
        let connector = InMemoryConnector::new();
        connector.push_iteration(iteration("A", 5)).await;
        connector.push_iteration(iteration("A", 9)).await;

        let all = connector.iterations(None, None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].updated_on.day(), 9);
    }

    #[tokio::test]
    async fn test_holidays_filter_by_year() {
        let connector = InMemoryConnector::new();
        connector
            .push_holiday(HolidayRecord {
                date: NaiveDate::from_ymd_opt(2023, 12, 25).unwrap(),
            })
            .await;
        connector
            .push_holiday(HolidayRecord {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            })
            .await;

        let y2024 = connector.holidays(2024).await.unwrap();
        assert_eq!(y2024.len(), 1);
        assert_eq!(y2024[0].date.year(), 2024);
    }

    #[tokio::test]
    async fn test_vacations_filter_by_email() {
        let connector = InMemoryConnector::new();
        connector
            .push_vacation(VacationRecord {
                date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                email: "a@x.com".to_string(),
            })
            .await;
        connector
            .push_vacation(VacationRecord {
                date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
                email: "b@x.com".to_string(),
            })
            .await;

        let mine = connector.vacations("a@x.com").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].email, "a@x.com");
    }
}
