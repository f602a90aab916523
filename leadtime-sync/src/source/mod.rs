/// Connector contracts for the external tracker and calendar
///
/// This module defines the traits the sync orchestrator depends on and
/// the typed records they yield. Concrete connectors (the HTTP tracker
/// link, the calendar service link) live behind these traits; the crate
/// ships a no-op connector and a deterministic in-memory connector for
/// tests and local runs.
///
/// # Connector Contract
///
/// All connectors must:
/// 1. Yield complete records for each entity they enumerate
/// 2. Honor `since`/`ids` filters where the trait offers them
/// 3. Report transport failures as retryable and malformed payloads as
///    decode errors
/// 4. Be restartable: every call re-enumerates from the source of truth
///
/// # Example
///
/// ```no_run
/// use leadtime_sync::source::{ConnectorKind, Source};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let connector = ConnectorKind::Noop.connect();
/// let iterations = connector.source.iterations(None, None).await?;
/// assert!(iterations.is_empty());
/// # Ok(())
/// # }
/// ```

pub mod memory;
pub mod noop;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use leadtime_shared::models::event::EventKind;

pub use memory::InMemoryConnector;
pub use noop::NoopConnector;

/// Connector error types
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The remote service could not be reached or answered abnormally
    #[error("Transport failure talking to {connector}: {message}")]
    Transport {
        connector: String,
        message: String,
        /// Timeouts and 5xx-style failures are retryable; auth failures
        /// are not
        retryable: bool,
    },

    /// The remote service answered with a payload that does not parse
    #[error("Malformed record from {connector}: {message}")]
    Decode { connector: String, message: String },
}

/// A user embedded in a task record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Email address (natural key; surrounding whitespace is tolerated)
    pub email: String,

    /// Identifier in the project-management tool
    pub pm_name: Option<String>,
}

/// An iteration (epic) as the tracker reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub ext_id: String,
    pub name: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub rank: i32,
    pub effort_est: Option<String>,
    pub value_est: Option<String>,
    pub team: Option<String>,
}

/// A task mutation embedded in a task record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// What changed
    pub kind: EventKind,

    /// When the change occurred in the tracker
    pub occurred_on: DateTime<Utc>,

    /// Iteration after an iteration change
    pub iteration_ext_id: Option<String>,

    /// Iteration before an iteration change
    pub from_iteration_ext_id: Option<String>,

    /// Owner before a user change
    pub from_user_email: Option<String>,

    /// Owner after a user change
    pub to_user_email: Option<String>,

    /// Estimate before an estimate change
    pub from_effort_est: Option<String>,

    /// Estimate after an estimate change
    pub to_effort_est: Option<String>,
}

/// A task (story/card) as the tracker reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub ext_id: String,
    pub name: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
    pub iteration_ext_id: Option<String>,
    pub user: UserRecord,
    pub started_on: Option<DateTime<Utc>>,
    pub dev_done_on: Option<DateTime<Utc>>,
    pub prod_done_on: Option<DateTime<Utc>>,
    pub effort_est: Option<String>,
    pub resolution: Option<String>,
    pub rank: Option<i32>,
    pub round_trips: Option<i32>,

    /// Change history embedded in the task payload
    pub events: Vec<ChangeRecord>,
}

/// A company-wide excluded date from the calendar service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayRecord {
    pub date: NaiveDate,
}

/// A per-user excluded date from the calendar service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationRecord {
    pub date: NaiveDate,
    pub email: String,
}

/// The project-tracker contract
///
/// Sequences are finite and restartable per call. Both methods accept an
/// optional `since` lower bound on the record's `updated_on` and an
/// optional explicit id list; when `ids` is given the `since` filter still
/// applies if set.
#[async_trait]
pub trait Source: Send + Sync {
    /// Returns the connector name for logging and error reporting
    fn name(&self) -> &str;

    /// Enumerates iterations, optionally time- or id-filtered
    async fn iterations(
        &self,
        since: Option<DateTime<Utc>>,
        ids: Option<&[String]>,
    ) -> Result<Vec<IterationRecord>, SourceError>;

    /// Enumerates tasks with embedded users and change events
    async fn tasks(
        &self,
        since: Option<DateTime<Utc>>,
        ids: Option<&[String]>,
    ) -> Result<Vec<TaskRecord>, SourceError>;
}

/// The calendar-service contract
///
/// The calendar offers no reliable update timestamps, so both methods
/// always enumerate the full current state.
#[async_trait]
pub trait Calendar: Send + Sync {
    /// Returns the connector name for logging and error reporting
    fn name(&self) -> &str;

    /// Enumerates all holidays in a calendar year
    async fn holidays(&self, year: i32) -> Result<Vec<HolidayRecord>, SourceError>;

    /// Enumerates one user's vacation days
    async fn vacations(&self, email: &str) -> Result<Vec<VacationRecord>, SourceError>;
}

/// A resolved pair of connector handles
#[derive(Clone)]
pub struct Connector {
    pub source: Arc<dyn Source>,
    pub calendar: Arc<dyn Calendar>,
}

/// The registry of known connector kinds
///
/// Resolved once at startup from configuration; each kind maps to a
/// factory rather than a module loaded by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorKind {
    /// Empty sequences; the default when no tracker is linked
    Noop,

    /// Deterministic in-memory fixture for tests and local runs
    Memory,
}

impl ConnectorKind {
    /// Builds the connector pair for this kind
    pub fn connect(&self) -> Connector {
        match self {
            ConnectorKind::Noop => {
                let noop = Arc::new(NoopConnector::new());
                Connector {
                    source: noop.clone(),
                    calendar: noop,
                }
            }
            ConnectorKind::Memory => {
                let memory = Arc::new(InMemoryConnector::new());
                Connector {
                    source: memory.clone(),
                    calendar: memory,
                }
            }
        }
    }
}

impl FromStr for ConnectorKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "noop" => Ok(ConnectorKind::Noop),
            "memory" => Ok(ConnectorKind::Memory),
            other => Err(format!("Unknown connector kind: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connector_kind_from_str() {
        assert_eq!("noop".parse::<ConnectorKind>().unwrap(), ConnectorKind::Noop);
        assert_eq!("Memory".parse::<ConnectorKind>().unwrap(), ConnectorKind::Memory);
        assert!("jira".parse::<ConnectorKind>().is_err());
    }

    #[tokio::test]
    async fn test_noop_registry_entry_yields_nothing() {
        let connector = ConnectorKind::Noop.connect();
        assert!(connector.source.iterations(None, None).await.unwrap().is_empty());
        assert!(connector.source.tasks(None, None).await.unwrap().is_empty());
        assert!(connector.calendar.holidays(2024).await.unwrap().is_empty());
        assert!(connector.calendar.vacations("a@x.com").await.unwrap().is_empty());
    }
}
