// src/fetch/validators.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use serde::Deserialize;

use super::{http_client, ValidatorSource};
use crate::error::{PulseError, PulseResult};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ValidatorRecord {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub epoch: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "val_index", default)]
    pub index: i64,
    #[serde(default)]
    pub stake: String,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub observer_node_id: String,
    #[serde(default)]
    pub observer_node_type: String,
}

#[derive(Debug, Deserialize)]
struct ValidatorResponse {
    data: Vec<ValidatorRecord>,
}

/// Parse a `{"data": [...]}` body into records ordered by index, highest first.
pub fn parse_validators(body: &str) -> PulseResult<Vec<ValidatorRecord>> {
    let resp: ValidatorResponse = serde_json::from_str(body)?;
    let mut records = resp.data;
    records.sort_by(|a, b| b.index.cmp(&a.index));
    Ok(records)
}

/// HTTP client for the validator listing service: `GET <base_url><network>`.
pub struct ValidatorApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ValidatorApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: http_client(),
        }
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    fn url_for(&self, network: &str) -> String {
        format!("{}{}", self.base_url, network)
    }
}

#[async_trait]
impl ValidatorSource for ValidatorApiClient {
    async fn fetch_validator_count(&self, network: &str) -> PulseResult<u32> {
        let t0 = std::time::Instant::now();
        let url = self.url_for(network);

        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let records = parse_validators(&body)?;
        histogram!("fetch_duration_ms", "source" => self.name())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        let Some(top) = records.first() else {
            return Err(PulseError::EmptyResult(url));
        };
        tracing::debug!(
            target: "ingest",
            network,
            count = records.len(),
            top_index = top.index,
            top_node = %top.node_id,
            "validator list fetched"
        );

        u32::try_from(records.len())
            .map_err(|_| PulseError::Decode(format!("validator count {} overflows", records.len())))
    }

    fn name(&self) -> &'static str {
        "validators"
    }
}
