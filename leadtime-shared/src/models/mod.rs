/// Database models for leadtime
///
/// This module contains all database models and their query operations.
///
/// # Models
///
/// - `user`: Task owners, keyed by unique email
/// - `holiday`: Company-wide excluded dates
/// - `vacation`: Per-user excluded dates
/// - `iteration`: External groupings of work (epics)
/// - `task`: Units of work with lifecycle timestamps and cached workday spans
/// - `event`: Observed task mutations (iteration/estimate/user changes, outliers)
/// - `stat`: Per user/estimate/day computed delivery aggregates
/// - `sync`: High-water-mark checkpoints for incremental sync
/// - `simulation`: Forecast simulation runs (extension point, schema only)

pub mod event;
pub mod holiday;
pub mod iteration;
pub mod simulation;
pub mod stat;
pub mod sync;
pub mod task;
pub mod user;
pub mod vacation;
