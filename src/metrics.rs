use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_ticks_total", "Scheduler ticks fired, per task.");
        describe_counter!(
            "ingest_failures_total",
            "Ingest ticks that produced no snapshot, per task and reason."
        );
        describe_counter!("snapshots_appended_total", "Snapshots stored, per kind.");
        describe_gauge!(
            "ingest_last_success_ts",
            "Unix ts of the last stored snapshot, per task."
        );
        describe_histogram!("fetch_duration_ms", "Upstream fetch time in milliseconds.");
        describe_counter!("stream_events_sent_total", "Events pushed to stream subscribers.");
        describe_counter!(
            "stream_ticks_skipped_total",
            "Publish ticks skipped because a snapshot was missing or unreadable."
        );
        describe_gauge!("stream_subscribers", "Currently connected stream subscribers.");
    });
}

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for the process.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
