/// No-op connector
///
/// Yields empty sequences for every contract method. This is the default
/// connector when no tracker or calendar service is linked; a sync run
/// against it is a harmless no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Calendar, HolidayRecord, IterationRecord, Source, SourceError, TaskRecord, VacationRecord};

/// Connector that reports nothing
pub struct NoopConnector;

impl NoopConnector {
    /// Creates a new no-op connector
    pub fn new() -> Self {
        NoopConnector
    }
}

impl Default for NoopConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Source for NoopConnector {
    fn name(&self) -> &str {
        "noop"
    }

    async fn iterations(
        &self,
        _since: Option<DateTime<Utc>>,
        _ids: Option<&[String]>,
    ) -> Result<Vec<IterationRecord>, SourceError> {
        Ok(Vec::new())
    }

    async fn tasks(
        &self,
        _since: Option<DateTime<Utc>>,
        _ids: Option<&[String]>,
    ) -> Result<Vec<TaskRecord>, SourceError> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl Calendar for NoopConnector {
    fn name(&self) -> &str {
        "noop"
    }

    async fn holidays(&self, _year: i32) -> Result<Vec<HolidayRecord>, SourceError> {
        Ok(Vec::new())
    }

    async fn vacations(&self, _email: &str) -> Result<Vec<VacationRecord>, SourceError> {
        Ok(Vec::new())
    }
}
