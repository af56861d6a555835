// src/snapshot/sqlite.rs
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{MetricKind, MetricPayload, MetricSnapshot, SnapshotStore};
use crate::error::{PulseError, PulseResult};

/// SQLite-backed snapshot store. One table, insert-only; `id` is the
/// insertion sequence used to pick the latest row.
#[derive(Clone)]
pub struct SqliteSnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSnapshotStore {
    pub fn open<P: AsRef<Path>>(path: P) -> PulseResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PulseError::Persistence(format!("creating {}: {e}", parent.display()))
            })?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> PulseResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> PulseResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> PulseResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PulseError::Persistence("database lock poisoned".into()))
    }

    fn init_schema(&self) -> PulseResult<()> {
        let conn = self.lock()?;

        // WAL lets the publisher read while an ingestion tick writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS metric_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                captured_at_ms INTEGER NOT NULL,
                block_num INTEGER,
                avg_block_time TEXT,
                validators INTEGER
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_metric_snapshots_kind ON metric_snapshots(kind, id)",
            [],
        )?;

        Ok(())
    }
}

fn row_to_snapshot(
    kind: MetricKind,
    id: i64,
    captured_at_ms: i64,
    block_num: Option<i64>,
    avg_block_time: Option<String>,
    validators: Option<i64>,
) -> PulseResult<MetricSnapshot> {
    let captured_at = DateTime::<Utc>::from_timestamp_millis(captured_at_ms)
        .ok_or_else(|| PulseError::Persistence(format!("bad timestamp in row {id}")))?;

    let payload = match kind {
        MetricKind::BlockStats => MetricPayload::BlockStats {
            block_num: block_num
                .and_then(|n| u64::try_from(n).ok())
                .ok_or_else(|| PulseError::Persistence(format!("row {id}: missing block_num")))?,
            avg_block_time: avg_block_time.ok_or_else(|| {
                PulseError::Persistence(format!("row {id}: missing avg_block_time"))
            })?,
        },
        MetricKind::ValidatorStats => MetricPayload::ValidatorStats {
            validators: validators
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| PulseError::Persistence(format!("row {id}: missing validators")))?,
        },
    };

    Ok(MetricSnapshot {
        seq: id,
        captured_at,
        payload,
    })
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn append(&self, mut snapshot: MetricSnapshot) -> PulseResult<MetricSnapshot> {
        let conn = self.lock()?;
        let kind = snapshot.kind();

        let prev_ms: Option<i64> = conn
            .query_row(
                "SELECT captured_at_ms FROM metric_snapshots WHERE kind = ?1 ORDER BY id DESC LIMIT 1",
                params![kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let mut captured_ms = snapshot.captured_at.timestamp_millis();
        if let Some(prev) = prev_ms {
            if captured_ms <= prev {
                captured_ms = prev.saturating_add(1);
            }
        }

        let (block_num, avg_block_time, validators) = match &snapshot.payload {
            MetricPayload::BlockStats {
                block_num,
                avg_block_time,
            } => {
                let n = i64::try_from(*block_num).map_err(|_| {
                    PulseError::Persistence(format!("block number {block_num} out of range"))
                })?;
                (Some(n), Some(avg_block_time.clone()), None)
            }
            MetricPayload::ValidatorStats { validators } => (None, None, Some(i64::from(*validators))),
        };

        conn.execute(
            r#"
            INSERT INTO metric_snapshots (kind, captured_at_ms, block_num, avg_block_time, validators)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![kind.as_str(), captured_ms, block_num, avg_block_time, validators],
        )?;

        snapshot.seq = conn.last_insert_rowid();
        snapshot.captured_at = DateTime::<Utc>::from_timestamp_millis(captured_ms)
            .unwrap_or(snapshot.captured_at);
        Ok(snapshot)
    }

    async fn latest(&self, kind: MetricKind) -> PulseResult<MetricSnapshot> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                r#"
                SELECT id, captured_at_ms, block_num, avg_block_time, validators
                FROM metric_snapshots
                WHERE kind = ?1
                ORDER BY id DESC
                LIMIT 1
                "#,
                params![kind.as_str()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, ms, block_num, avg, validators)) => {
                row_to_snapshot(kind, id, ms, block_num, avg, validators)
            }
            None => Err(PulseError::NotFound(kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrips_both_kinds_in_memory() {
        let store = SqliteSnapshotStore::in_memory().unwrap();

        assert!(store.latest(MetricKind::BlockStats).await.unwrap_err().is_not_found());

        let saved = store
            .append(MetricSnapshot::new(MetricPayload::BlockStats {
                block_num: 100,
                avg_block_time: "2.0".into(),
            }))
            .await
            .unwrap();
        store
            .append(MetricSnapshot::new(MetricPayload::ValidatorStats { validators: 42 }))
            .await
            .unwrap();

        let got = store.latest(MetricKind::BlockStats).await.unwrap();
        assert_eq!(got, saved);
        let v = store.latest(MetricKind::ValidatorStats).await.unwrap();
        assert_eq!(v.payload, MetricPayload::ValidatorStats { validators: 42 });
    }

    #[tokio::test]
    async fn late_and_colliding_timestamps_move_forward() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        let now = Utc::now();
        let p = MetricPayload::ValidatorStats { validators: 9 };

        let first = store
            .append(MetricSnapshot::captured_at(p.clone(), now))
            .await
            .unwrap();
        let late = store
            .append(MetricSnapshot::captured_at(p.clone(), now - chrono::Duration::seconds(30)))
            .await
            .unwrap();
        let same = store
            .append(MetricSnapshot::captured_at(p, late.captured_at))
            .await
            .unwrap();

        assert_eq!(late.captured_at, first.captured_at + chrono::Duration::milliseconds(1));
        assert_eq!(same.captured_at, late.captured_at + chrono::Duration::milliseconds(1));
        assert_eq!(store.latest(MetricKind::ValidatorStats).await.unwrap(), same);
    }

    #[tokio::test]
    async fn huge_block_numbers_are_rejected() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        let err = store
            .append(MetricSnapshot::new(MetricPayload::BlockStats {
                block_num: u64::MAX,
                avg_block_time: "1.0".into(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, PulseError::Persistence(_)));
    }
}
