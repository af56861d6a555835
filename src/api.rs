// src/api.rs
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::get,
    Json, Router,
};
use futures_util::Stream;
use metrics::gauge;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::error::{PulseError, PulseResult};
use crate::publisher::Publisher;
use crate::snapshot::{MetricKind, MetricPayload, SnapshotStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SnapshotStore>,
    pub publish_interval: Duration,
}

impl AppState {
    pub fn new(store: Arc<dyn SnapshotStore>, publish_interval: Duration) -> Self {
        Self {
            store,
            publish_interval,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/v1/statistics", get(statistics))
        .route("/v1/statistics/stream", get(statistics_stream))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Alias kept for callers that build the router by its short name.
pub fn router(state: AppState) -> Router {
    create_router(state)
}

#[derive(Debug, Serialize)]
struct StatisticsOut {
    block_num: Option<u64>,
    avg_block_time: Option<String>,
    validators: Option<u32>,
    timestamp: i64,
}

fn soft<T>(res: PulseResult<T>) -> PulseResult<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(PulseError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Non-streaming read of the latest statistics. Kinds with no snapshot
/// yet come back as `null`; only a store failure is an error.
async fn statistics(
    State(state): State<AppState>,
) -> Result<Json<StatisticsOut>, (StatusCode, Json<serde_json::Value>)> {
    let read = async {
        let block = soft(state.store.latest(MetricKind::BlockStats).await)?;
        let validators = soft(state.store.latest(MetricKind::ValidatorStats).await)?;
        Ok::<_, PulseError>((block, validators))
    };

    let (block, validators) = read.await.map_err(|e| {
        tracing::error!(error = %e, "statistics read failed");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "store_unavailable" })),
        )
    })?;

    let mut out = StatisticsOut {
        block_num: None,
        avg_block_time: None,
        validators: None,
        timestamp: chrono::Utc::now().timestamp(),
    };
    if let Some(MetricPayload::BlockStats {
        block_num,
        avg_block_time,
    }) = block.map(|s| s.payload)
    {
        out.block_num = Some(block_num);
        out.avg_block_time = Some(avg_block_time);
    }
    if let Some(MetricPayload::ValidatorStats { validators }) = validators.map(|s| s.payload) {
        out.validators = Some(validators);
    }
    Ok(Json(out))
}

/// Decrements the subscriber gauge when the response stream is dropped.
struct SubscriberGuard;

impl SubscriberGuard {
    fn enter() -> Self {
        gauge!("stream_subscribers").increment(1.0);
        SubscriberGuard
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        gauge!("stream_subscribers").decrement(1.0);
    }
}

/// Live statistics over server-sent events. One publisher task per
/// connection; dropping the response body cancels it.
async fn statistics_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (publisher, mut rx) = Publisher::new(state.store.clone(), state.publish_interval);
    let cancel = CancellationToken::new();
    let cancel_on_drop = cancel.clone().drop_guard();
    tokio::spawn(publisher.run(cancel));

    let stream = async_stream::stream! {
        let _cancel_on_drop = cancel_on_drop;
        let _subscriber = SubscriberGuard::enter();

        while rx.changed().await.is_ok() {
            let latest = rx.borrow_and_update().clone();
            let Some(ev) = latest else { continue };
            match Event::default().json_data(&ev) {
                Ok(event) => yield Ok::<_, Infallible>(event),
                Err(e) => tracing::warn!(target: "stream", error = %e, "event encode failed"),
            }
        }
    };

    Sse::new(stream)
}
