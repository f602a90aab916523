/// Exponentially time-weighted delivery statistics
///
/// For a given user and effort-estimate tag, this module computes one
/// aggregate per calendar day from the earliest relevant evidence up to an
/// `until` bound. Each day's aggregate uses only evidence dated on or
/// before that day, weighted by
///
/// ```text
/// weight = 0.5 ^ (age_days / halflife)
/// ```
///
/// so an evidence point's influence halves every `halflife` days after it
/// occurred. Three series are aggregated — dev-done workdays, prod-done
/// workdays, and round trips — together with a weighted delivery failure
/// rate. Days with no evidence produce nothing.
///
/// Tasks whose resolution is in the configured discard list are excluded
/// from all evidence.

use std::collections::HashMap;

use chrono::{Days, NaiveDate};

use crate::config::{ForecastSettings, TaskRules};
use crate::models::task::DeliveryRow;

/// Aggregate of one weighted evidence series for one day
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesAggregate {
    /// Number of evidence points (unweighted count)
    pub sample_size: i64,

    /// Weighted mean
    pub mean: f64,

    /// Weighted median, linear-interpolated at an exact midpoint
    pub median: f64,

    /// Weighted mode; ties resolve to the smallest value
    pub mode: f64,

    /// Weighted standard deviation
    pub stddev: f64,

    /// Standard error: stddev / sqrt(total weight)
    pub stderr: f64,

    /// 95% confidence half-width: stderr * 1.96
    pub conf_int: f64,
}

/// One day's computed statistics for a (user, estimate) pair
#[derive(Debug, Clone, PartialEq)]
pub struct DailyStat {
    /// The day the aggregate is valid for
    pub as_of: NaiveDate,

    /// Workdays from start to dev-done
    pub dev_done: Option<SeriesAggregate>,

    /// Workdays from start to prod-done
    pub prod_done: Option<SeriesAggregate>,

    /// Times through a testing state
    pub round_trips: Option<SeriesAggregate>,

    /// Weighted fraction of completed tasks that failed delivery
    pub failure_rate: Option<f64>,
}

/// A weighted sample accumulated for a single evaluation day
#[derive(Debug, Default)]
struct WeightedSample {
    points: Vec<(f64, f64)>, // (value, weight)
}

impl WeightedSample {
    fn push(&mut self, value: f64, weight: f64) {
        self.points.push((value, weight));
    }

    fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn total_weight(&self) -> f64 {
        self.points.iter().map(|(_, w)| w).sum()
    }

    fn mean(&self) -> f64 {
        let total = self.total_weight();
        self.points.iter().map(|(v, w)| v * w).sum::<f64>() / total
    }

    fn variance(&self) -> f64 {
        let mean = self.mean();
        let total = self.total_weight();
        self.points
            .iter()
            .map(|(v, w)| w * (v - mean) * (v - mean))
            .sum::<f64>()
            / total
    }

    /// Weighted median over value-sorted points
    ///
    /// Walks the cumulative weight toward half the total; when the
    /// cumulative weight lands exactly on the midpoint at a point
    /// boundary, the result interpolates linearly between that value and
    /// the next.
    fn median(&self) -> f64 {
        let mut sorted = self.points.clone();
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
        let midpoint = self.total_weight() / 2.0;
        let mut cumulative = 0.0;
        for (i, (value, weight)) in sorted.iter().enumerate() {
            cumulative += weight;
            if cumulative > midpoint {
                return *value;
            }
            if cumulative == midpoint {
                return match sorted.get(i + 1) {
                    Some((next, _)) => (value + next) / 2.0,
                    None => *value,
                };
            }
        }
        // unreachable for non-empty samples; keep a defined value
        sorted.last().map(|(v, _)| *v).unwrap_or(0.0)
    }

    /// Weighted mode: the value with the largest summed weight
    ///
    /// Ties resolve deterministically to the smallest value (ascending
    /// scan, strict-greater replacement).
    fn mode(&self) -> f64 {
        let mut by_value: Vec<(f64, f64)> = Vec::new();
        let mut index: HashMap<u64, usize> = HashMap::new();
        for (value, weight) in &self.points {
            match index.get(&value.to_bits()) {
                Some(&i) => by_value[i].1 += weight,
                None => {
                    index.insert(value.to_bits(), by_value.len());
                    by_value.push((*value, *weight));
                }
            }
        }
        by_value.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut best = by_value[0];
        for candidate in &by_value[1..] {
            if candidate.1 > best.1 {
                best = *candidate;
            }
        }
        best.0
    }

    fn aggregate(&self) -> Option<SeriesAggregate> {
        if self.is_empty() {
            return None;
        }
        let stddev = self.variance().sqrt();
        let stderr = stddev / self.total_weight().sqrt();
        Some(SeriesAggregate {
            sample_size: self.points.len() as i64,
            mean: self.mean(),
            median: self.median(),
            mode: self.mode(),
            stddev,
            stderr,
            conf_int: stderr * 1.96,
        })
    }
}

/// A dated evidence point
#[derive(Debug, Clone, Copy)]
struct Evidence {
    on: NaiveDate,
    value: f64,
}

/// Computes the weight of evidence aged `age_days` at the given halflife
fn decay_weight(age_days: i64, halflife_days: f64) -> f64 {
    0.5f64.powf(age_days as f64 / halflife_days)
}

fn weighted_over(series: &[Evidence], day: NaiveDate, halflife: f64) -> WeightedSample {
    let mut sample = WeightedSample::default();
    for point in series {
        if point.on > day {
            // series are date-sorted; everything after is future evidence
            break;
        }
        let age = (day - point.on).num_days();
        sample.push(point.value, decay_weight(age, halflife));
    }
    sample
}

/// Computes per-day delivery statistics for one user/estimate pair
///
/// `rows` is the user's delivery evidence for the estimate tag; `since`
/// bounds the emitted days (defaulting to the earliest evidence date) and
/// `until` bounds them exclusively at the top. Returns one [`DailyStat`]
/// per day that has any evidence, in ascending date order.
pub fn lead_time_stats(
    rows: &[DeliveryRow],
    since: Option<NaiveDate>,
    until: NaiveDate,
    forecast: &ForecastSettings,
    rules: &TaskRules,
) -> Vec<DailyStat> {
    let halflife = forecast.halflife_days;

    let mut dev_done: Vec<Evidence> = Vec::new();
    let mut prod_done: Vec<Evidence> = Vec::new();
    let mut round_trips: Vec<Evidence> = Vec::new();
    let mut failures: Vec<Evidence> = Vec::new();

    for row in rows {
        if let Some(resolution) = &row.resolution {
            if rules.discard_resolutions.contains(resolution) {
                continue;
            }
        }
        if let (Some(on), Some(workdays)) = (row.dev_done_on, row.dev_done_workdays) {
            dev_done.push(Evidence {
                on: on.date_naive(),
                value: workdays as f64,
            });
        }
        if let (Some(on), Some(workdays)) = (row.prod_done_on, row.prod_done_workdays) {
            prod_done.push(Evidence {
                on: on.date_naive(),
                value: workdays as f64,
            });
        }
        // round trips and failure outcomes date from the task's completion
        let completed_on = row.prod_done_on.or(row.dev_done_on).map(|t| t.date_naive());
        if let Some(on) = completed_on {
            if let Some(trips) = row.round_trips {
                round_trips.push(Evidence {
                    on,
                    value: trips as f64,
                });
            }
            let failed = row.resolution.as_deref() == Some(rules.failure_resolution.as_str());
            failures.push(Evidence {
                on,
                value: if failed { 1.0 } else { 0.0 },
            });
        }
    }

    for series in [&mut dev_done, &mut prod_done, &mut round_trips, &mut failures] {
        series.sort_by_key(|e| e.on);
    }

    let earliest = [&dev_done, &prod_done, &round_trips, &failures]
        .iter()
        .filter_map(|s| s.first().map(|e| e.on))
        .min();
    let Some(earliest) = earliest else {
        // no evidence at all: not an error, just nothing to emit
        return Vec::new();
    };
    let since = since.unwrap_or(earliest);

    let mut stats = Vec::new();
    let mut day = since;
    while day < until {
        let dev = weighted_over(&dev_done, day, halflife).aggregate();
        let prod = weighted_over(&prod_done, day, halflife).aggregate();
        let trips = weighted_over(&round_trips, day, halflife).aggregate();
        let failure_sample = weighted_over(&failures, day, halflife);
        let failure_rate = if failure_sample.is_empty() {
            None
        } else {
            Some(failure_sample.mean())
        };

        if dev.is_some() || prod.is_some() || trips.is_some() || failure_rate.is_some() {
            stats.push(DailyStat {
                as_of: day,
                dev_done: dev,
                prod_done: prod,
                round_trips: trips,
                failure_rate,
            });
        }

        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(
        dev_done: Option<(i32, u32, u32, i32)>,
        prod_done: Option<(i32, u32, u32, i32)>,
        round_trips: Option<i32>,
        resolution: Option<&str>,
    ) -> DeliveryRow {
        let ts = |y, m, d| Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap();
        DeliveryRow {
            dev_done_on: dev_done.map(|(y, m, d, _)| ts(y, m, d)),
            prod_done_on: prod_done.map(|(y, m, d, _)| ts(y, m, d)),
            dev_done_workdays: dev_done.map(|(_, _, _, w)| w),
            prod_done_workdays: prod_done.map(|(_, _, _, w)| w),
            round_trips,
            resolution: resolution.map(|r| r.to_string()),
        }
    }

    fn rules() -> TaskRules {
        TaskRules {
            failure_resolution: "failed".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_decay_weight_halves_at_halflife() {
        let w0 = decay_weight(0, 30.0);
        let w30 = decay_weight(30, 30.0);
        assert_eq!(w0, 1.0);
        assert!((w30 - 0.5).abs() < 1e-12);
        assert!((w0 / 2.0 - w30).abs() < 1e-12);
    }

    #[test]
    fn test_no_evidence_emits_nothing() {
        let stats = lead_time_stats(
            &[],
            None,
            date(2024, 2, 1),
            &ForecastSettings::default(),
            &rules(),
        );
        assert!(stats.is_empty());
    }

    #[test]
    fn test_future_evidence_is_excluded() {
        let rows = vec![row(Some((2024, 1, 10, 3)), None, None, None)];
        let stats = lead_time_stats(
            &rows,
            Some(date(2024, 1, 8)),
            date(2024, 1, 12),
            &ForecastSettings::default(),
            &rules(),
        );
        // days 8 and 9 have no evidence yet; 10 and 11 do
        let days: Vec<_> = stats.iter().map(|s| s.as_of).collect();
        assert_eq!(days, vec![date(2024, 1, 10), date(2024, 1, 11)]);
    }

    #[test]
    fn test_single_point_aggregate() {
        let rows = vec![row(Some((2024, 1, 10, 4)), None, None, None)];
        let stats = lead_time_stats(
            &rows,
            None,
            date(2024, 1, 11),
            &ForecastSettings::default(),
            &rules(),
        );
        assert_eq!(stats.len(), 1);
        let dev = stats[0].dev_done.as_ref().unwrap();
        assert_eq!(dev.sample_size, 1);
        assert_eq!(dev.mean, 4.0);
        assert_eq!(dev.median, 4.0);
        assert_eq!(dev.mode, 4.0);
        assert_eq!(dev.stddev, 0.0);
        assert_eq!(dev.conf_int, 0.0);
    }

    #[test]
    fn test_weighted_mean_decays_old_evidence() {
        // two points, 30 days apart, halflife 30: old point carries half
        // the weight, so the mean leans toward the recent value
        let rows = vec![
            row(Some((2024, 1, 1, 2)), None, None, None),
            row(Some((2024, 1, 31, 8)), None, None, None),
        ];
        let stats = lead_time_stats(
            &rows,
            Some(date(2024, 1, 31)),
            date(2024, 2, 1),
            &ForecastSettings::default(),
            &rules(),
        );
        let dev = stats[0].dev_done.as_ref().unwrap();
        // (0.5 * 2 + 1.0 * 8) / 1.5 = 6
        assert!((dev.mean - 6.0).abs() < 1e-9);
        assert_eq!(dev.sample_size, 2);
    }

    #[test]
    fn test_median_interpolates_at_exact_midpoint() {
        let mut sample = WeightedSample::default();
        sample.push(2.0, 1.0);
        sample.push(6.0, 1.0);
        // cumulative weight hits exactly half after the first point
        assert_eq!(sample.median(), 4.0);
    }

    #[test]
    fn test_median_picks_majority_value() {
        let mut sample = WeightedSample::default();
        sample.push(2.0, 3.0);
        sample.push(6.0, 1.0);
        assert_eq!(sample.median(), 2.0);
    }

    #[test]
    fn test_mode_tie_breaks_to_smallest_value() {
        let mut sample = WeightedSample::default();
        sample.push(5.0, 1.0);
        sample.push(3.0, 1.0);
        assert_eq!(sample.mode(), 3.0);
    }

    #[test]
    fn test_mode_prefers_largest_summed_weight() {
        let mut sample = WeightedSample::default();
        sample.push(5.0, 0.6);
        sample.push(5.0, 0.6);
        sample.push(3.0, 1.0);
        assert_eq!(sample.mode(), 5.0);
    }

    #[test]
    fn test_stderr_uses_total_weight() {
        let mut sample = WeightedSample::default();
        sample.push(2.0, 1.0);
        sample.push(6.0, 1.0);
        let agg = sample.aggregate().unwrap();
        assert!((agg.stddev - 2.0).abs() < 1e-9);
        assert!((agg.stderr - 2.0 / 2.0f64.sqrt()).abs() < 1e-9);
        assert!((agg.conf_int - agg.stderr * 1.96).abs() < 1e-12);
    }

    #[test]
    fn test_failure_rate_counts_failure_resolution() {
        let rows = vec![
            row(None, Some((2024, 1, 10, 3)), None, Some("failed")),
            row(None, Some((2024, 1, 10, 5)), None, Some("done")),
        ];
        let stats = lead_time_stats(
            &rows,
            None,
            date(2024, 1, 11),
            &ForecastSettings::default(),
            &rules(),
        );
        assert_eq!(stats[0].failure_rate, Some(0.5));
    }

    #[test]
    fn test_discarded_resolutions_are_not_evidence() {
        let mut rules = rules();
        rules.discard_resolutions.insert("duplicate".to_string());
        let rows = vec![
            row(Some((2024, 1, 10, 3)), None, None, Some("duplicate")),
            row(Some((2024, 1, 10, 7)), None, None, None),
        ];
        let stats = lead_time_stats(
            &rows,
            None,
            date(2024, 1, 11),
            &ForecastSettings::default(),
            &rules,
        );
        let dev = stats[0].dev_done.as_ref().unwrap();
        assert_eq!(dev.sample_size, 1);
        assert_eq!(dev.mean, 7.0);
    }

    #[test]
    fn test_round_trips_series_dates_from_completion() {
        let rows = vec![row(Some((2024, 1, 8, 2)), Some((2024, 1, 10, 4)), Some(3), None)];
        let stats = lead_time_stats(
            &rows,
            Some(date(2024, 1, 9)),
            date(2024, 1, 11),
            &ForecastSettings::default(),
            &rules(),
        );
        // on the 9th only dev evidence exists; round trips appear on the 10th
        assert_eq!(stats[0].as_of, date(2024, 1, 9));
        assert!(stats[0].round_trips.is_none());
        assert_eq!(stats[1].as_of, date(2024, 1, 10));
        assert_eq!(stats[1].round_trips.as_ref().unwrap().mean, 3.0);
    }
}
