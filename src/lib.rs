// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod jobs;
pub mod metrics;
pub mod publisher;
pub mod snapshot;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, router, AppState};
pub use crate::error::{PulseError, PulseResult};
pub use crate::jobs::{Job, Scheduler, TaskId, TaskRegistry, TaskSpec};
pub use crate::publisher::{Publisher, StreamEvent};
pub use crate::snapshot::{MetricKind, MetricPayload, MetricSnapshot, SnapshotStore};

use std::sync::Arc;

use crate::config::{ConfigSource, PulseConfig, TIMER_NAMESPACE};
use crate::fetch::{RpcBlockFetcher, ValidatorApiClient};
use crate::jobs::{BlockStatsJob, ValidatorStatsJob};
use tokio::task::JoinHandle;

/// Registry with both ingestion handlers wired to the live upstreams.
pub fn default_registry(cfg: &PulseConfig, store: Arc<dyn SnapshotStore>) -> TaskRegistry {
    let blocks = BlockStatsJob::new(Arc::new(RpcBlockFetcher::new(&cfg.rpc_url)), store.clone())
        .with_limit(cfg.block_window);
    let validators =
        ValidatorStatsJob::new(Arc::new(ValidatorApiClient::new(&cfg.validator_url)), store)
            .with_network(&cfg.network);

    let mut registry = TaskRegistry::new();
    registry
        .register(TaskId::BlockStats, Arc::new(blocks))
        .register(TaskId::Validator, Arc::new(validators));
    registry
}

/// Resolve every task against `source` and start the ones that resolve.
/// Tasks that fail to resolve are logged by the scheduler and skipped.
pub fn spawn_ingestion(
    registry: &TaskRegistry,
    source: &dyn ConfigSource,
) -> Vec<(TaskId, JoinHandle<()>)> {
    let (scheduler, rejected) =
        Scheduler::from_registry(registry, &TaskId::ALL, TIMER_NAMESPACE, source);
    if !rejected.is_empty() {
        tracing::warn!(
            target: "ingest",
            disabled = rejected.len(),
            "some ingestion tasks are disabled"
        );
    }
    scheduler.start()
}
