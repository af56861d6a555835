// src/publisher.rs
//! Per-connection publisher loop: on its own timer, read the latest
//! block/validator snapshots and push one event to the subscriber.
//!
//! The outbound slot is a `watch` channel, so a slow subscriber only ever
//! sees the newest event and nothing queues up behind it.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::snapshot::{read_statistics, NetworkStatistics, SnapshotStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub block_num: u64,
    pub avg_block_time: String,
    pub validators: u32,
    /// Unix seconds at the publish tick.
    pub timestamp: i64,
}

impl StreamEvent {
    pub fn from_statistics(stats: NetworkStatistics, timestamp: i64) -> Self {
        Self {
            block_num: stats.block_num,
            avg_block_time: stats.avg_block_time,
            validators: stats.validators,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherState {
    Connected,
    Streaming,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Connection context cancelled (client went away, server shutting the request down).
    Cancelled,
    /// The subscriber side of the channel is gone.
    SubscriberGone,
}

/// Subscriber end: yields the latest event whenever a new one is published.
pub type EventReceiver = watch::Receiver<Option<StreamEvent>>;

pub struct Publisher {
    store: Arc<dyn SnapshotStore>,
    interval: Duration,
    tx: watch::Sender<Option<StreamEvent>>,
    state: watch::Sender<PublisherState>,
}

impl Publisher {
    /// New publisher in `Connected` state plus the receiver for its events.
    pub fn new(store: Arc<dyn SnapshotStore>, interval: Duration) -> (Self, EventReceiver) {
        let (tx, rx) = watch::channel(None);
        let publisher = Self {
            store,
            interval,
            tx,
            state: watch::Sender::new(PublisherState::Connected),
        };
        (publisher, rx)
    }

    pub fn state(&self) -> PublisherState {
        *self.state.borrow()
    }

    /// Follows the lifecycle after `run` has taken ownership of the publisher.
    pub fn watch_state(&self) -> watch::Receiver<PublisherState> {
        self.state.subscribe()
    }

    /// Stream until `cancel` fires or the subscriber drops its receiver.
    pub async fn run(self, cancel: CancellationToken) -> CloseReason {
        let period = self.interval.max(Duration::from_millis(1));
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.state.send_replace(PublisherState::Streaming);
        tracing::debug!(target: "stream", interval_ms = period.as_millis() as u64, "publisher streaming");

        let reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => break CloseReason::Cancelled,
                _ = self.tx.closed() => break CloseReason::SubscriberGone,
                _ = ticker.tick() => {}
            }

            // the store read is raced against cancellation so both go down together
            let stats = tokio::select! {
                _ = cancel.cancelled() => break CloseReason::Cancelled,
                res = read_statistics(self.store.as_ref()) => res,
            };

            match stats {
                Ok(stats) => {
                    let ev = StreamEvent::from_statistics(stats, chrono::Utc::now().timestamp());
                    if self.tx.send(Some(ev)).is_err() {
                        break CloseReason::SubscriberGone;
                    }
                    counter!("stream_events_sent_total").increment(1);
                }
                Err(e) if e.is_not_found() => {
                    counter!("stream_ticks_skipped_total").increment(1);
                    tracing::trace!(target: "stream", error = %e, "no snapshot yet, tick skipped");
                }
                Err(e) => {
                    counter!("stream_ticks_skipped_total").increment(1);
                    tracing::warn!(target: "stream", error = %e, "snapshot read failed, tick skipped");
                }
            }
        };

        self.state.send_replace(PublisherState::Closed);
        tracing::debug!(target: "stream", ?reason, "publisher closed");
        reason
    }
}
