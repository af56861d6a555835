// tests/fetch_http.rs
//
// Fetchers against local axum servers standing in for the validator
// service and the chain RPC node.

use std::time::Duration;

use axum::{
    extract::Path,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use testnet_pulse::error::PulseError;
use testnet_pulse::fetch::{BlockStatsSource, RpcBlockFetcher, ValidatorApiClient, ValidatorSource};

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn validators_by_network(Path(network): Path<String>) -> (StatusCode, String) {
    match network.as_str() {
        "testnet" => (
            StatusCode::OK,
            json!({"data": [
                {"node_id": "a", "val_index": 0, "display_name": "a"},
                {"node_id": "b", "val_index": 2, "display_name": "b"},
                {"node_id": "c", "val_index": 1, "display_name": "c"}
            ]})
            .to_string(),
        ),
        "empty" => (StatusCode::OK, r#"{"data": []}"#.to_string()),
        "broken" => (StatusCode::OK, "<html>oops</html>".to_string()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "down".to_string()),
    }
}

#[tokio::test]
async fn validator_count_and_failure_modes() {
    let base = serve(Router::new().route("/validators/{network}", get(validators_by_network))).await;
    let client = ValidatorApiClient::new(format!("{base}/validators/"));

    assert_eq!(client.fetch_validator_count("testnet").await.unwrap(), 3);
    assert!(matches!(
        client.fetch_validator_count("empty").await,
        Err(PulseError::EmptyResult(_))
    ));
    assert!(matches!(
        client.fetch_validator_count("broken").await,
        Err(PulseError::Decode(_))
    ));
    assert!(matches!(
        client.fetch_validator_count("mainnet").await,
        Err(PulseError::Transport(_))
    ));
}

#[tokio::test]
async fn unreachable_service_is_transport_error() {
    // bind then drop to get a port nothing listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .unwrap();
    let client = ValidatorApiClient::with_client(format!("http://{addr}/v/"), http);
    assert!(matches!(
        client.fetch_validator_count("testnet").await,
        Err(PulseError::Transport(_))
    ));
}

const HEAD: u64 = 100;

/// Block n has timestamp 1000 + 2n, except that blocks below 95 are 3s apart.
fn block_ts(n: u64) -> u64 {
    if n >= 95 {
        1000 + 2 * n
    } else {
        1000 + 2 * 95 - 3 * (95 - n)
    }
}

fn rpc_answer(req: &Value) -> Value {
    let id = req["id"].clone();
    match req["method"].as_str() {
        Some("eth_blockNumber") => json!({"jsonrpc": "2.0", "id": id, "result": format!("{HEAD:#x}")}),
        Some("eth_getBlockByNumber") => {
            let hex = req["params"][0].as_str().unwrap_or("0x0");
            let n = u64::from_str_radix(hex.trim_start_matches("0x"), 16).unwrap();
            json!({"jsonrpc": "2.0", "id": id, "result": {
                "number": format!("{n:#x}"),
                "timestamp": format!("{:#x}", block_ts(n)),
            }})
        }
        _ => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "method not found"}}),
    }
}

async fn rpc(Json(body): Json<Value>) -> Json<Value> {
    match body {
        Value::Array(reqs) => {
            // answer out of order, as real nodes may
            let mut out: Vec<Value> = reqs.iter().map(rpc_answer).collect();
            out.reverse();
            Json(Value::Array(out))
        }
        single => Json(rpc_answer(&single)),
    }
}

#[tokio::test]
async fn block_stats_average_recent_window() {
    let base = serve(Router::new().route("/", post(rpc))).await;
    let fetcher = RpcBlockFetcher::new(format!("{base}/"));

    // blocks 91..=100: deltas 3,3,3,3(91->95 mixed), then 2s
    let stats = fetcher.fetch_block_stats(10).await.unwrap();
    assert_eq!(stats.block_num, HEAD);
    let expected = (block_ts(100) - block_ts(91)) as f64 / 9.0;
    assert_eq!(stats.avg_block_time, format!("{expected:.1}"));

    // only the steady 2s tail
    let stats = fetcher.fetch_block_stats(5).await.unwrap();
    assert_eq!(stats.avg_block_time, "2.0");
}

#[tokio::test]
async fn rpc_error_is_transport_error() {
    let app = Router::new().route(
        "/",
        post(|| async {
            Json(json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "syncing"}}))
        }),
    );
    let base = serve(app).await;
    let fetcher = RpcBlockFetcher::new(base);

    assert!(matches!(
        fetcher.fetch_block_stats(10).await,
        Err(PulseError::Transport(m)) if m.contains("syncing")
    ));
}
