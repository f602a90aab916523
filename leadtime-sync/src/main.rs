//! # Leadtime Sync binary
//!
//! Runs one full synchronization pass: calendars, iterations, tasks, and
//! statistics, in dependency order. Periodic operation is an operator
//! concern (cron or similar); every run is idempotent, so overlapping or
//! repeated invocations converge.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p leadtime-sync
//! ```

use std::str::FromStr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadtime_shared::config::Settings;
use leadtime_shared::db::migrations::run_migrations;
use leadtime_shared::db::pool::{close_pool, create_pool, PoolConfig};
use leadtime_sync::orchestrator::SyncOrchestrator;
use leadtime_sync::source::ConnectorKind;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadtime_sync=info,leadtime_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Leadtime sync v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = Settings::from_env()?;

    let pool = create_pool(PoolConfig {
        url: settings.database.url.clone(),
        max_connections: settings.database.max_connections,
        ..Default::default()
    })
    .await?;
    run_migrations(&pool).await?;

    let kind = ConnectorKind::from_str(&settings.sync.connector)
        .map_err(|e| anyhow::anyhow!(e))?;
    let connector = kind.connect();
    tracing::info!(connector = %settings.sync.connector, "Connector resolved");

    let orchestrator = SyncOrchestrator::new(pool.clone(), connector, settings)?;

    // ctrl-c stops the run at the next chunk boundary
    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Shutdown signal received, stopping after the current chunk");
            cancel.cancel();
        }
    });

    match orchestrator.sync().await {
        Ok(Some(checkpoint)) => {
            tracing::info!(
                last_seen_update = %checkpoint.last_seen_update,
                "Sync recorded checkpoint"
            );
        }
        Ok(None) => {
            tracing::info!("Sync absorbed nothing new; no checkpoint recorded");
        }
        Err(e) => {
            close_pool(pool).await;
            return Err(e.into());
        }
    }

    close_pool(pool).await;
    Ok(())
}
