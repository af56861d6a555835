// src/snapshot/memory.rs
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Duration;

use super::{MetricKind, MetricSnapshot, SnapshotStore};
use crate::error::{PulseError, PulseResult};

/// In-process store. Rows live in insertion order behind one lock.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    rows: RwLock<Vec<MetricSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows of `kind`.
    pub fn count(&self, kind: MetricKind) -> usize {
        self.rows
            .read()
            .map(|rows| rows.iter().filter(|r| r.kind() == kind).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn append(&self, mut snapshot: MetricSnapshot) -> PulseResult<MetricSnapshot> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| PulseError::Persistence("snapshot lock poisoned".into()))?;

        let kind = snapshot.kind();
        if let Some(prev) = rows.iter().rev().find(|r| r.kind() == kind) {
            if snapshot.captured_at <= prev.captured_at {
                snapshot.captured_at = prev.captured_at + Duration::milliseconds(1);
            }
        }
        snapshot.seq = rows.len() as i64 + 1;
        rows.push(snapshot.clone());
        Ok(snapshot)
    }

    async fn latest(&self, kind: MetricKind) -> PulseResult<MetricSnapshot> {
        let rows = self
            .rows
            .read()
            .map_err(|_| PulseError::Persistence("snapshot lock poisoned".into()))?;
        rows.iter()
            .rev()
            .find(|r| r.kind() == kind)
            .cloned()
            .ok_or(PulseError::NotFound(kind))
    }
}
