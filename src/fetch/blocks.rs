// src/fetch/blocks.rs
use async_trait::async_trait;
use metrics::histogram;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

use super::{average_block_time, http_client, BlockStats, BlockStatsSource};
use crate::error::{PulseError, PulseResult};

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

impl<'a> RpcRequest<'a> {
    fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    #[serde(default)]
    id: u64,
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    number: String,
    timestamp: String,
}

fn parse_quantity(s: &str) -> PulseResult<u64> {
    let hex = s
        .strip_prefix("0x")
        .ok_or_else(|| PulseError::Decode(format!("quantity without 0x prefix: {s}")))?;
    u64::from_str_radix(hex, 16).map_err(|e| PulseError::Decode(format!("quantity {s}: {e}")))
}

fn unwrap_rpc<T>(resp: RpcResponse<T>, method: &str) -> PulseResult<Option<T>> {
    if let Some(err) = resp.error {
        return Err(PulseError::Transport(format!(
            "{method} rpc error {}: {}",
            err.code, err.message
        )));
    }
    Ok(resp.result)
}

/// Block statistics from an Ethereum-style JSON-RPC node.
///
/// One `eth_blockNumber` call, then a single batched `eth_getBlockByNumber`
/// for the `limit` newest blocks.
pub struct RpcBlockFetcher {
    rpc_url: String,
    client: reqwest::Client,
}

impl RpcBlockFetcher {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            client: http_client(),
        }
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, body: &B) -> PulseResult<T> {
        let text = self
            .client
            .post(&self.rpc_url)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn latest_block_number(&self) -> PulseResult<u64> {
        let req = RpcRequest::new(1, "eth_blockNumber", json!([]));
        let resp: RpcResponse<String> = self.post(&req).await?;
        let hex = unwrap_rpc(resp, "eth_blockNumber")?
            .ok_or_else(|| PulseError::Decode("eth_blockNumber returned null".into()))?;
        parse_quantity(&hex)
    }

    /// Timestamps of blocks `from..=to`, oldest first. Missing blocks are skipped.
    async fn block_timestamps(&self, from: u64, to: u64) -> PulseResult<Vec<u64>> {
        let batch: Vec<RpcRequest<'_>> = (from..=to)
            .map(|n| RpcRequest::new(n, "eth_getBlockByNumber", json!([format!("{n:#x}"), false])))
            .collect();
        let responses: Vec<RpcResponse<RpcBlock>> = self.post(&batch).await?;

        let mut blocks = Vec::with_capacity(responses.len());
        for resp in responses {
            let id = resp.id;
            match unwrap_rpc(resp, "eth_getBlockByNumber")? {
                Some(b) => blocks.push((parse_quantity(&b.number)?, parse_quantity(&b.timestamp)?)),
                None => tracing::debug!(target: "ingest", block = id, "block not available"),
            }
        }
        blocks.sort_by_key(|(number, _)| *number);
        Ok(blocks.into_iter().map(|(_, ts)| ts).collect())
    }
}

#[async_trait]
impl BlockStatsSource for RpcBlockFetcher {
    async fn fetch_block_stats(&self, limit: u64) -> PulseResult<BlockStats> {
        let t0 = std::time::Instant::now();

        let latest = self.latest_block_number().await?;
        let window = limit.max(2).min(latest.saturating_add(1));
        let from = latest - (window - 1);
        let timestamps = self.block_timestamps(from, latest).await?;

        histogram!("fetch_duration_ms", "source" => self.name())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        let avg_block_time = average_block_time(&timestamps).ok_or_else(|| {
            PulseError::EmptyResult(format!("fewer than two blocks in {from}..={latest}"))
        })?;

        Ok(BlockStats {
            block_num: latest,
            avg_block_time,
        })
    }

    fn name(&self) -> &'static str {
        "blocks"
    }
}
