//! # Leadtime Sync
//!
//! The incremental synchronization engine: it pulls iteration, task, and
//! calendar records from an external tracker through abstract connector
//! traits, merges them into the local relational model with a generic
//! upsert-by-natural-key reconciler, tracks which statistics the changes
//! invalidate, and recomputes exactly those.
//!
//! ## Modules
//!
//! - `source`: Connector contracts, record types, and the connector registry
//! - `reconcile`: The batch reconciler primitive
//! - `changes`: The task change tracker
//! - `orchestrator`: The sync orchestrator driving everything in order
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p leadtime-sync
//! ```

pub mod changes;
pub mod orchestrator;
pub mod reconcile;
pub mod source;
