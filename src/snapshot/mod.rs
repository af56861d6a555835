// src/snapshot/mod.rs
//! Metric snapshots and the append-only store contract shared by the
//! ingestion handlers (writers) and the stream publisher (reader).

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PulseError, PulseResult};

pub use memory::MemorySnapshotStore;
pub use sqlite::SqliteSnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    BlockStats,
    ValidatorStats,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::BlockStats => "block_stats",
            MetricKind::ValidatorStats => "validator_stats",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific fields of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricPayload {
    BlockStats {
        block_num: u64,
        /// Mean seconds between recent blocks, one decimal place (e.g. "2.0").
        avg_block_time: String,
    },
    ValidatorStats {
        validators: u32,
    },
}

impl MetricPayload {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricPayload::BlockStats { .. } => MetricKind::BlockStats,
            MetricPayload::ValidatorStats { .. } => MetricKind::ValidatorStats,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Insertion sequence assigned by the store; 0 until appended.
    pub seq: i64,
    pub captured_at: DateTime<Utc>,
    pub payload: MetricPayload,
}

impl MetricSnapshot {
    /// New, not-yet-stored snapshot stamped with the current time (millisecond precision).
    pub fn new(payload: MetricPayload) -> Self {
        Self::captured_at(payload, Utc::now())
    }

    pub fn captured_at(payload: MetricPayload, at: DateTime<Utc>) -> Self {
        Self {
            seq: 0,
            captured_at: at.trunc_subsecs(3),
            payload,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.payload.kind()
    }
}

/// Append-only snapshot persistence.
///
/// `append` is atomic: a concurrent `latest` sees either the whole row or
/// nothing. Within one kind, `captured_at` strictly increases in insertion
/// order; a store moves a late or colliding timestamp to one millisecond
/// after the previous row's.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn append(&self, snapshot: MetricSnapshot) -> PulseResult<MetricSnapshot>;

    /// Most recently inserted snapshot of `kind`, or `PulseError::NotFound`.
    async fn latest(&self, kind: MetricKind) -> PulseResult<MetricSnapshot>;
}

/// Current block number, average block time and validator count, as read
/// by the status endpoint and the stream publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkStatistics {
    pub block_num: u64,
    pub avg_block_time: String,
    pub validators: u32,
}

/// Read both latest snapshots. Fails with `NotFound` if either kind is still empty.
pub async fn read_statistics(store: &dyn SnapshotStore) -> PulseResult<NetworkStatistics> {
    let block = store.latest(MetricKind::BlockStats).await?;
    let validators = store.latest(MetricKind::ValidatorStats).await?;

    match (block.payload, validators.payload) {
        (
            MetricPayload::BlockStats {
                block_num,
                avg_block_time,
            },
            MetricPayload::ValidatorStats { validators },
        ) => Ok(NetworkStatistics {
            block_num,
            avg_block_time,
            validators,
        }),
        (a, b) => Err(PulseError::Persistence(format!(
            "store returned mismatched kinds: {} / {}",
            a.kind(),
            b.kind()
        ))),
    }
}
