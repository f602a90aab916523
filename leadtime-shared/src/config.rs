/// Configuration management for the sync service
///
/// This module loads configuration from environment variables once at
/// process start and provides a type-safe settings struct that is passed
/// by reference into the orchestrator and the statistics engine.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `FORECAST_HALFLIFE_DAYS`: Evidence-weight halflife in days (default: 30)
/// - `TASKS_DISCARD_RESOLUTIONS`: Comma-separated resolutions excluded from
///   statistics (default: empty)
/// - `TASKS_DISCARD_ON_SYNC`: Also drop discard-listed tasks at ingestion
///   (default: false)
/// - `TASKS_FAILURE_RESOLUTION`: Resolution counted as a delivery failure
///   (default: "failed")
/// - `WORK_DAYS`: Comma-separated weekday names forming the work week
///   (default: "mon,tue,wed,thu,fri")
/// - `SYNC_BATCH_SIZE`: Records per reconciliation chunk (default: 100)
/// - `SYNC_CONNECTOR`: Connector kind for the tracker/calendar links
///   (default: "noop")
/// - `RUST_LOG`: Log level (default: info)
///
/// # Example
///
/// ```no_run
/// use leadtime_shared::config::Settings;
///
/// # fn example() -> anyhow::Result<()> {
/// let settings = Settings::from_env()?;
/// println!("halflife: {} days", settings.forecast.halflife_days);
/// # Ok(())
/// # }
/// ```

use std::collections::HashSet;
use std::env;

use serde::{Deserialize, Serialize};

use crate::workdays::WorkWeek;

/// Complete application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Database configuration
    pub database: DatabaseSettings,

    /// Forecasting parameters
    pub forecast: ForecastSettings,

    /// Task resolution rules
    pub tasks: TaskRules,

    /// Work-week definition
    pub work: WorkSettings,

    /// Sync batching and connector selection
    pub sync: SyncSettings,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

/// Forecasting parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSettings {
    /// Evidence-weight halflife in days
    ///
    /// An evidence point's influence halves every `halflife_days` days
    /// after it occurred.
    pub halflife_days: f64,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        ForecastSettings { halflife_days: 30.0 }
    }
}

/// Task resolution rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRules {
    /// Resolutions excluded entirely from statistics evidence
    pub discard_resolutions: HashSet<String>,

    /// Whether discard-listed tasks are also dropped at ingestion
    pub discard_on_sync: bool,

    /// The resolution counted as a delivery failure
    pub failure_resolution: String,
}

/// Work-week definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSettings {
    /// Weekday names constituting a workday
    pub days: Vec<String>,
}

impl Default for WorkSettings {
    fn default() -> Self {
        WorkSettings {
            days: ["mon", "tue", "wed", "thu", "fri"]
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

/// Sync batching and connector selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Records per reconciliation chunk
    pub batch_size: usize,

    /// Connector kind for the tracker and calendar links
    pub connector: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            batch_size: 100,
            connector: "noop".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `DATABASE_URL` is missing
    /// - A numeric variable has an invalid value
    /// - `WORK_DAYS` names an unknown weekday or is empty
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse::<u32>()?;

        let halflife_days = env::var("FORECAST_HALFLIFE_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<f64>()?;
        if halflife_days <= 0.0 {
            anyhow::bail!("FORECAST_HALFLIFE_DAYS must be positive");
        }

        let discard_resolutions = env::var("TASKS_DISCARD_RESOLUTIONS")
            .map(|v| parse_list(&v))
            .unwrap_or_default()
            .into_iter()
            .collect::<HashSet<_>>();

        let discard_on_sync = env::var("TASKS_DISCARD_ON_SYNC")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        let failure_resolution =
            env::var("TASKS_FAILURE_RESOLUTION").unwrap_or_else(|_| "failed".to_string());

        let work = match env::var("WORK_DAYS") {
            Ok(v) => WorkSettings { days: parse_list(&v) },
            Err(_) => WorkSettings::default(),
        };
        // Validate the names up front rather than at first use
        work.work_week()?;

        let batch_size = env::var("SYNC_BATCH_SIZE")
            .unwrap_or_else(|_| "100".to_string())
            .parse::<usize>()?;
        if batch_size == 0 {
            anyhow::bail!("SYNC_BATCH_SIZE must be at least 1");
        }

        let connector = env::var("SYNC_CONNECTOR").unwrap_or_else(|_| "noop".to_string());

        Ok(Settings {
            database: DatabaseSettings {
                url: database_url,
                max_connections,
            },
            forecast: ForecastSettings { halflife_days },
            tasks: TaskRules {
                discard_resolutions,
                discard_on_sync,
                failure_resolution,
            },
            work,
            sync: SyncSettings {
                batch_size,
                connector,
            },
        })
    }
}

impl WorkSettings {
    /// Builds the configured work week
    ///
    /// # Errors
    ///
    /// Returns an error if a day name is unrecognized or the list is empty
    pub fn work_week(&self) -> anyhow::Result<WorkWeek> {
        Ok(WorkWeek::from_names(&self.days)?)
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    #[test]
    fn test_parse_list_trims_and_drops_empty() {
        assert_eq!(parse_list("a, b ,,c"), vec!["a", "b", "c"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_work_settings_default_week() {
        let work = WorkSettings::default();
        let week = work.work_week().unwrap();
        assert!(week.contains(Weekday::Mon));
        assert!(week.contains(Weekday::Fri));
        assert!(!week.contains(Weekday::Sat));
        assert!(!week.contains(Weekday::Sun));
    }

    #[test]
    fn test_forecast_default_halflife() {
        assert_eq!(ForecastSettings::default().halflife_days, 30.0);
    }

    #[test]
    fn test_sync_settings_default() {
        let sync = SyncSettings::default();
        assert_eq!(sync.batch_size, 100);
        assert_eq!(sync.connector, "noop");
    }
}
