//! Followgraph daemon entry point

use followgraph::{AppState, config, events::FollowEvent};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Initialize metrics
/// 3. Load configuration from file and environment
/// 4. Initialize AppState
/// 5. Start background tasks (event drain, maintenance, reconciliation)
/// 6. Wait for shutdown signal
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("FOLLOWGRAPH__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "followgraph=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "followgraph=info".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting Followgraph...");

    // 2. Initialize metrics
    followgraph::metrics::init_metrics();

    // 3. Load configuration
    let config = config::AppConfig::load()?;
    tracing::info!(
        database = %config.database.path.display(),
        cooldown_ttl = config.cooldown.ttl_seconds,
        "Configuration loaded"
    );

    // 4. Initialize application state
    let (state, events_rx) = AppState::new(config).await?;

    // 5. Start background tasks
    spawn_event_drain_task(events_rx);
    spawn_maintenance_task(state.clone());
    if state.config.maintenance.reconcile.enabled {
        spawn_reconcile_task(state.clone());
    }

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, exiting");

    Ok(())
}

/// Spawn the event drain task
///
/// The daemon has no delivery channel of its own; published events are
/// logged for downstream pickup. Embedders replace this by consuming the
/// receiver returned from `AppState::new`.
fn spawn_event_drain_task(mut events_rx: mpsc::UnboundedReceiver<FollowEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            tracing::debug!(?event, "relationship event published");
        }
    });

    tracing::info!("Event drain task spawned");
}

/// Spawn background maintenance task
///
/// Prunes expired cooldown pairs and stale cache tag-index entries.
fn spawn_maintenance_task(state: AppState) {
    tokio::spawn(async move {
        let configured_interval_secs = state.config.maintenance.interval_seconds;
        let interval_secs = configured_interval_secs.max(1);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        if configured_interval_secs == 0 {
            tracing::warn!("maintenance.interval_seconds=0 is invalid; clamped to 1 second");
        }

        // Consume the immediate first tick to delay the initial pass.
        interval.tick().await;

        loop {
            interval.tick().await;

            state.cooldown.prune_expired().await;
            state.cache.maintain().await;
        }
    });

    tracing::info!("Maintenance task spawned");
}

/// Spawn background counter reconciliation task
fn spawn_reconcile_task(state: AppState) {
    tokio::spawn(async move {
        let interval_secs = state.config.maintenance.reconcile.interval_seconds.max(1);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        interval.tick().await;

        loop {
            interval.tick().await;

            tracing::info!("Running scheduled counter reconciliation...");
            match state.store.reconcile_counters().await {
                Ok(corrected) => {
                    use followgraph::metrics::COUNTERS_RECONCILED_TOTAL;
                    COUNTERS_RECONCILED_TOTAL.inc_by(corrected);
                    if corrected > 0 {
                        tracing::warn!(corrected, "Counter reconciliation corrected drifted rows");
                    } else {
                        tracing::info!("Counter reconciliation found no drift");
                    }
                }
                Err(error) => {
                    tracing::error!(%error, "Counter reconciliation failed");
                }
            }
        }
    });

    tracing::info!("Reconciliation task spawned");
}
