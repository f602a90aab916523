/// Stat model: cached per-day delivery aggregates
///
/// One row per (user, effort estimate, as-of day) that had any evidence.
/// Rows are never patched in place: a re-sync recomputes the whole day
/// from scratch and overwrites it through the batch reconciler.
///
/// # Schema (abridged)
///
/// ```sql
/// CREATE TABLE stats (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     effort_est VARCHAR(50),
///     as_of DATE NOT NULL,
///     dev_done_sample_size BIGINT NOT NULL DEFAULT 0,
///     dev_done_mean DOUBLE PRECISION,
///     -- ... median, mode, stddev, stderr, conf_int for dev_done,
///     --     prod_done and round_trips ...
///     failure_rate DOUBLE PRECISION
/// );
/// CREATE UNIQUE INDEX stats_user_est_as_of
///     ON stats (user_id, COALESCE(effort_est, ''), as_of);
/// ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnection;
use uuid::Uuid;

use crate::stats::{DailyStat, SeriesAggregate};

/// Stat model
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub effort_est: Option<String>,
    pub as_of: NaiveDate,

    pub dev_done_sample_size: i64,
    pub dev_done_mean: Option<f64>,
    pub dev_done_median: Option<f64>,
    pub dev_done_mode: Option<f64>,
    pub dev_done_stddev: Option<f64>,
    pub dev_done_stderr: Option<f64>,
    pub dev_done_conf_int: Option<f64>,

    pub prod_done_sample_size: i64,
    pub prod_done_mean: Option<f64>,
    pub prod_done_median: Option<f64>,
    pub prod_done_mode: Option<f64>,
    pub prod_done_stddev: Option<f64>,
    pub prod_done_stderr: Option<f64>,
    pub prod_done_conf_int: Option<f64>,

    pub round_trips_sample_size: i64,
    pub round_trips_mean: Option<f64>,
    pub round_trips_median: Option<f64>,
    pub round_trips_mode: Option<f64>,
    pub round_trips_stddev: Option<f64>,
    pub round_trips_stderr: Option<f64>,
    pub round_trips_conf_int: Option<f64>,

    pub failure_rate: Option<f64>,
}

const STAT_COLUMNS: &str = "id, user_id, effort_est, as_of, \
     dev_done_sample_size, dev_done_mean, dev_done_median, dev_done_mode, \
     dev_done_stddev, dev_done_stderr, dev_done_conf_int, \
     prod_done_sample_size, prod_done_mean, prod_done_median, prod_done_mode, \
     prod_done_stddev, prod_done_stderr, prod_done_conf_int, \
     round_trips_sample_size, round_trips_mean, round_trips_median, round_trips_mode, \
     round_trips_stddev, round_trips_stderr, round_trips_conf_int, \
     failure_rate";

/// Flattens an optional series aggregate into its column values
fn series_columns(
    series: &Option<SeriesAggregate>,
) -> (
    i64,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
    Option<f64>,
) {
    match series {
        Some(s) => (
            s.sample_size,
            Some(s.mean),
            Some(s.median),
            Some(s.mode),
            Some(s.stddev),
            Some(s.stderr),
            Some(s.conf_int),
        ),
        None => (0, None, None, None, None, None, None),
    }
}

impl Stat {
    /// Inserts a freshly computed day
    pub async fn create(
        conn: &mut PgConnection,
        user_id: Uuid,
        effort_est: Option<&str>,
        daily: &DailyStat,
    ) -> Result<Self, sqlx::Error> {
        let dev = series_columns(&daily.dev_done);
        let prod = series_columns(&daily.prod_done);
        let trips = series_columns(&daily.round_trips);

        let stat = sqlx::query_as::<_, Stat>(&format!(
            r#"
            INSERT INTO stats (user_id, effort_est, as_of,
                dev_done_sample_size, dev_done_mean, dev_done_median, dev_done_mode,
                dev_done_stddev, dev_done_stderr, dev_done_conf_int,
                prod_done_sample_size, prod_done_mean, prod_done_median, prod_done_mode,
                prod_done_stddev, prod_done_stderr, prod_done_conf_int,
                round_trips_sample_size, round_trips_mean, round_trips_median, round_trips_mode,
                round_trips_stddev, round_trips_stderr, round_trips_conf_int,
                failure_rate)
            VALUES ($1, $2, $3,
                    $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24,
                    $25)
            RETURNING {STAT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(effort_est)
        .bind(daily.as_of)
        .bind(dev.0)
        .bind(dev.1)
        .bind(dev.2)
        .bind(dev.3)
        .bind(dev.4)
        .bind(dev.5)
        .bind(dev.6)
        .bind(prod.0)
        .bind(prod.1)
        .bind(prod.2)
        .bind(prod.3)
        .bind(prod.4)
        .bind(prod.5)
        .bind(prod.6)
        .bind(trips.0)
        .bind(trips.1)
        .bind(trips.2)
        .bind(trips.3)
        .bind(trips.4)
        .bind(trips.5)
        .bind(trips.6)
        .bind(daily.failure_rate)
        .fetch_one(conn)
        .await?;

        Ok(stat)
    }

    /// Overwrites an existing day with recomputed values
    pub async fn overwrite(
        conn: &mut PgConnection,
        id: Uuid,
        daily: &DailyStat,
    ) -> Result<Self, sqlx::Error> {
        let dev = series_columns(&daily.dev_done);
        let prod = series_columns(&daily.prod_done);
        let trips = series_columns(&daily.round_trips);

        let stat = sqlx::query_as::<_, Stat>(&format!(
            r#"
            UPDATE stats
            SET dev_done_sample_size = $2, dev_done_mean = $3, dev_done_median = $4,
                dev_done_mode = $5, dev_done_stddev = $6, dev_done_stderr = $7,
                dev_done_conf_int = $8,
                prod_done_sample_size = $9, prod_done_mean = $10, prod_done_median = $11,
                prod_done_mode = $12, prod_done_stddev = $13, prod_done_stderr = $14,
                prod_done_conf_int = $15,
                round_trips_sample_size = $16, round_trips_mean = $17, round_trips_median = $18,
                round_trips_mode = $19, round_trips_stddev = $20, round_trips_stderr = $21,
                round_trips_conf_int = $22,
                failure_rate = $23
            WHERE id = $1
            RETURNING {STAT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(dev.0)
        .bind(dev.1)
        .bind(dev.2)
        .bind(dev.3)
        .bind(dev.4)
        .bind(dev.5)
        .bind(dev.6)
        .bind(prod.0)
        .bind(prod.1)
        .bind(prod.2)
        .bind(prod.3)
        .bind(prod.4)
        .bind(prod.5)
        .bind(prod.6)
        .bind(trips.0)
        .bind(trips.1)
        .bind(trips.2)
        .bind(trips.3)
        .bind(trips.4)
        .bind(trips.5)
        .bind(trips.6)
        .bind(daily.failure_rate)
        .fetch_one(conn)
        .await?;

        Ok(stat)
    }

    /// Finds the existing days for one (user, estimate) pair
    ///
    /// Stat batches are homogeneous in user and estimate, so key
    /// membership reduces to a date-set match.
    pub async fn find_days(
        conn: &mut PgConnection,
        user_id: Uuid,
        effort_est: Option<&str>,
        days: &[NaiveDate],
    ) -> Result<Vec<Self>, sqlx::Error> {
        let stats = sqlx::query_as::<_, Stat>(&format!(
            r#"
            SELECT {STAT_COLUMNS}
            FROM stats
            WHERE user_id = $1
              AND effort_est IS NOT DISTINCT FROM $2
              AND as_of = ANY($3)
            "#
        ))
        .bind(user_id)
        .bind(effort_est)
        .bind(days)
        .fetch_all(conn)
        .await?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_columns_absent_series() {
        let (size, mean, median, mode, stddev, stderr, conf) = series_columns(&None);
        assert_eq!(size, 0);
        assert!(mean.is_none());
        assert!(median.is_none());
        assert!(mode.is_none());
        assert!(stddev.is_none());
        assert!(stderr.is_none());
        assert!(conf.is_none());
    }

    #[test]
    fn test_series_columns_present_series() {
        let agg = SeriesAggregate {
            sample_size: 3,
            mean: 4.0,
            median: 4.0,
            mode: 5.0,
            stddev: 1.0,
            stderr: 0.5,
            conf_int: 0.98,
        };
        let (size, mean, ..) = series_columns(&Some(agg));
        assert_eq!(size, 3);
        assert_eq!(mean, Some(4.0));
    }
}
