/// Simulation model: delivery-date forecast runs
///
/// Extension point only: the schema groups the data points of one
/// simulation run against an iteration, consuming the same task/event
/// history the statistics engine uses. No simulation engine ships yet;
/// the change tracker already scopes which iterations would need a
/// re-run.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE simulations (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     iteration_id UUID NOT NULL REFERENCES iterations(id) ON DELETE CASCADE,
///     simulated_on TIMESTAMPTZ NOT NULL,
///     algorithm VARCHAR(50) NOT NULL,
///     plays INTEGER NOT NULL,
///     earliest_date TIMESTAMPTZ,
///     latest_date TIMESTAMPTZ,
///     data JSONB,
///     errors JSONB
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// Simulation model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Simulation {
    /// Unique simulation ID
    pub id: Uuid,

    /// Iteration the simulation forecasts
    pub iteration_id: Uuid,

    /// The date the simulation was run "as of" (may predate the actual run)
    pub simulated_on: DateTime<Utc>,

    /// Forecasting algorithm identifier
    pub algorithm: String,

    /// Number of plays in the run
    pub plays: i32,

    /// Earliest forecast completion date
    pub earliest_date: Option<DateTime<Utc>>,

    /// Latest forecast completion date
    pub latest_date: Option<DateTime<Utc>>,

    /// Raw per-play data
    pub data: Option<JsonValue>,

    /// Per-play errors, if any
    pub errors: Option<JsonValue>,
}

impl Simulation {
    /// Lists the simulation runs recorded for an iteration
    pub async fn list_for_iteration(
        pool: &PgPool,
        iteration_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let simulations = sqlx::query_as::<_, Simulation>(
            r#"
            SELECT id, iteration_id, simulated_on, algorithm, plays,
                   earliest_date, latest_date, data, errors
            FROM simulations
            WHERE iteration_id = $1
            ORDER BY simulated_on DESC
            "#,
        )
        .bind(iteration_id)
        .fetch_all(pool)
        .await?;

        Ok(simulations)
    }
}
