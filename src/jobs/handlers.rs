// src/jobs/handlers.rs
use std::sync::Arc;

use async_trait::async_trait;
use metrics::{counter, gauge};

use super::{Job, TaskId};
use crate::error::PulseResult;
use crate::fetch::{BlockStatsSource, ValidatorSource};
use crate::snapshot::{MetricPayload, MetricSnapshot, SnapshotStore};

pub const DEFAULT_BLOCK_WINDOW: u64 = 10;
pub const DEFAULT_NETWORK: &str = "testnet";

fn record_outcome(task: TaskId, source: &'static str, res: PulseResult<MetricSnapshot>) {
    match res {
        Ok(snap) => {
            counter!("snapshots_appended_total", "kind" => snap.kind().as_str()).increment(1);
            gauge!("ingest_last_success_ts", "task" => task.as_str())
                .set(snap.captured_at.timestamp() as f64);
            tracing::debug!(
                target: "ingest",
                task = %task,
                seq = snap.seq,
                payload = ?snap.payload,
                "snapshot stored"
            );
        }
        Err(e) => {
            counter!("ingest_failures_total", "task" => task.as_str(), "reason" => e.reason())
                .increment(1);
            tracing::warn!(target: "ingest", task = %task, source, error = %e, "ingest tick skipped");
        }
    }
}

/// Fetch recent block stats and append a `BlockStats` snapshot.
pub struct BlockStatsJob {
    source: Arc<dyn BlockStatsSource>,
    store: Arc<dyn SnapshotStore>,
    limit: u64,
}

impl BlockStatsJob {
    pub fn new(source: Arc<dyn BlockStatsSource>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            source,
            store,
            limit: DEFAULT_BLOCK_WINDOW,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// One fetch-normalize-persist pass. At most one row per call.
    pub async fn ingest(&self) -> PulseResult<MetricSnapshot> {
        let stats = self.source.fetch_block_stats(self.limit).await?;
        let snap = MetricSnapshot::new(MetricPayload::BlockStats {
            block_num: stats.block_num,
            avg_block_time: stats.avg_block_time,
        });
        self.store.append(snap).await
    }
}

#[async_trait]
impl Job for BlockStatsJob {
    async fn execute(&self) {
        let res = self.ingest().await;
        record_outcome(TaskId::BlockStats, self.source.name(), res);
    }
}

/// Count validators on a network and append a `ValidatorStats` snapshot.
/// An empty validator list is a failed tick, not a zero reading.
pub struct ValidatorStatsJob {
    source: Arc<dyn ValidatorSource>,
    store: Arc<dyn SnapshotStore>,
    network: String,
}

impl ValidatorStatsJob {
    pub fn new(source: Arc<dyn ValidatorSource>, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            source,
            store,
            network: DEFAULT_NETWORK.to_string(),
        }
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    pub async fn ingest(&self) -> PulseResult<MetricSnapshot> {
        let validators = self.source.fetch_validator_count(&self.network).await?;
        let snap = MetricSnapshot::new(MetricPayload::ValidatorStats { validators });
        self.store.append(snap).await
    }
}

#[async_trait]
impl Job for ValidatorStatsJob {
    async fn execute(&self) {
        let res = self.ingest().await;
        record_outcome(TaskId::Validator, self.source.name(), res);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PulseError;
    use crate::fetch::BlockStats;
    use crate::snapshot::{MemorySnapshotStore, MetricKind};

    struct FailingBlocks;

    #[async_trait]
    impl BlockStatsSource for FailingBlocks {
        async fn fetch_block_stats(&self, _limit: u64) -> PulseResult<BlockStats> {
            Err(PulseError::Transport("connection refused".into()))
        }
        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct SeenNetwork(std::sync::Mutex<Option<String>>);

    #[async_trait]
    impl ValidatorSource for SeenNetwork {
        async fn fetch_validator_count(&self, network: &str) -> PulseResult<u32> {
            *self.0.lock().unwrap() = Some(network.to_string());
            Ok(5)
        }
        fn name(&self) -> &'static str {
            "seen"
        }
    }

    #[tokio::test]
    async fn transport_failure_stores_nothing() {
        let store = Arc::new(MemorySnapshotStore::new());
        let job = BlockStatsJob::new(Arc::new(FailingBlocks), store.clone());

        assert!(matches!(job.ingest().await, Err(PulseError::Transport(_))));
        job.execute().await;
        assert_eq!(store.count(MetricKind::BlockStats), 0);
    }

    #[tokio::test]
    async fn validator_job_queries_configured_network() {
        let store = Arc::new(MemorySnapshotStore::new());
        let src = Arc::new(SeenNetwork(std::sync::Mutex::new(None)));
        let job = ValidatorStatsJob::new(src.clone(), store.clone());

        job.execute().await;
        assert_eq!(src.0.lock().unwrap().as_deref(), Some("testnet"));

        let job = ValidatorStatsJob::new(src.clone(), store.clone()).with_network("devnet");
        job.execute().await;
        assert_eq!(src.0.lock().unwrap().as_deref(), Some("devnet"));
        assert_eq!(store.count(MetricKind::ValidatorStats), 2);
    }
}
