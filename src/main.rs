//! Testnet pulse: binary entrypoint.
//! Boots ingestion timers and the Axum HTTP server (status + live stream).

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use testnet_pulse::{
    api::{self, AppState},
    config::{load_config_default, PulseConfig},
    default_registry,
    metrics::Metrics,
    snapshot::{SnapshotStore, SqliteSnapshotStore},
    spawn_ingestion,
};

/// Structured logs; JSON when PULSE_LOG_JSON=1. The hosting runtime may
/// already have installed a subscriber, in which case this is a no-op.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("testnet_pulse=info,warn"));
    let json = std::env::var("PULSE_LOG_JSON").ok().is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let source = load_config_default()?;
    let cfg = PulseConfig::from_source(&source)?;

    let store: Arc<dyn SnapshotStore> = Arc::new(
        SqliteSnapshotStore::open(&cfg.store_path)
            .with_context(|| format!("opening snapshot store at {}", cfg.store_path))?,
    );

    let registry = default_registry(&cfg, store.clone());
    let tasks = spawn_ingestion(&registry, &source);
    tracing::info!(
        running = tasks.len(),
        publish_interval_secs = cfg.publish_interval.as_secs(),
        "ingestion started"
    );

    let metrics = Metrics::init()?;
    let router = api::create_router(AppState::new(store, cfg.publish_interval))
        .merge(metrics.router());

    Ok(router.into())
}
