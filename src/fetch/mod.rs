// src/fetch/mod.rs
pub mod blocks;
pub mod validators;

use async_trait::async_trait;

use crate::error::PulseResult;

pub use blocks::RpcBlockFetcher;
pub use validators::{ValidatorApiClient, ValidatorRecord};

/// Latest block height plus mean block interval over a recent window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStats {
    pub block_num: u64,
    pub avg_block_time: String,
}

#[async_trait]
pub trait BlockStatsSource: Send + Sync {
    async fn fetch_block_stats(&self, limit: u64) -> PulseResult<BlockStats>;
    fn name(&self) -> &'static str;
}

#[async_trait]
pub trait ValidatorSource: Send + Sync {
    /// Number of validators on `network`. An empty list is an error, never zero.
    async fn fetch_validator_count(&self, network: &str) -> PulseResult<u32>;
    fn name(&self) -> &'static str;
}

/// Arithmetic mean of consecutive deltas, one decimal place.
///
/// `timestamps` must be in chain order (oldest first). The signed deltas
/// telescope, so the mean is `(newest - oldest) / (n - 1)`. Returns `None`
/// when there are fewer than two points.
pub fn average_block_time(timestamps: &[u64]) -> Option<String> {
    let (first, last) = match timestamps {
        [first, .., last] => (*first, *last),
        _ => return None,
    };
    let span = i128::from(last) - i128::from(first);
    let mean = span as f64 / (timestamps.len() - 1) as f64;
    Some(format!("{mean:.1}"))
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_is_mean_of_deltas() {
        assert_eq!(average_block_time(&[100, 102, 104, 106]).as_deref(), Some("2.0"));
        assert_eq!(average_block_time(&[10, 11, 13]).as_deref(), Some("1.5"));
        assert_eq!(average_block_time(&[0, 1, 2, 4]).as_deref(), Some("1.3"));
    }

    #[test]
    fn single_block_has_no_average() {
        assert_eq!(average_block_time(&[5]), None);
        assert_eq!(average_block_time(&[]), None);
    }

    #[test]
    fn clock_skew_between_blocks_counts_as_negative_delta() {
        assert_eq!(average_block_time(&[10, 9, 12]).as_deref(), Some("1.0"));
    }

    #[test]
    fn newest_older_than_oldest_gives_negative_mean() {
        assert_eq!(average_block_time(&[20, 15, 10]).as_deref(), Some("-5.0"));
    }
}
