//! On-chain verification of submitted transactions.
//!
//! The verifier asks a blockchain node for the transaction receipt and
//! classifies the outcome purely from the receipt's status field. It never
//! reinterprets application-level logs, and it is idempotent: receipts are
//! immutable once mined, so re-verifying a hash is always safe.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::chains::ChainConfig;
use crate::error::VerifyError;

/// A transaction receipt, as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    /// Quantity-encoded outcome: `0x1` success, `0x0` reverted.
    pub status: String,
    #[serde(default)]
    pub block_number: Option<String>,
    /// Present for contract-creation transactions.
    #[serde(default)]
    pub contract_address: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
}

impl TransactionReceipt {
    pub fn succeeded(&self) -> bool {
        normalize_quantity(&self.status) == "0x1"
    }
}

/// Classifies submitted transactions against a chain's node.
#[async_trait]
pub trait TransactionVerifier: Send + Sync {
    /// Fetch and classify the receipt for `tx_hash`.
    ///
    /// Success means mined with status `0x1`; everything else is a
    /// [`VerifyError`] variant that keeps "not yet mined" distinct from
    /// "mined but reverted".
    async fn verify(
        &self,
        tx_hash: &str,
        chain: &ChainConfig,
    ) -> Result<TransactionReceipt, VerifyError>;
}

/// JSON-RPC receipt verifier with a bounded request timeout.
pub struct RpcVerifier {
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<TransactionReceipt>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl RpcVerifier {
    /// Build a verifier whose receipt lookups are bounded by `timeout`, so
    /// a stalled node connection cannot hold a session lock indefinitely.
    pub fn new(timeout: Duration) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifyError::Rpc {
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TransactionVerifier for RpcVerifier {
    async fn verify(
        &self,
        tx_hash: &str,
        chain: &ChainConfig,
    ) -> Result<TransactionReceipt, VerifyError> {
        if !is_tx_hash(tx_hash) {
            return Err(VerifyError::InvalidHash {
                tx_hash: tx_hash.to_string(),
            });
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getTransactionReceipt",
            "params": [tx_hash],
        });

        let response = self
            .client
            .post(&chain.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("receipt lookup timed out: {e}")
                } else {
                    format!("receipt lookup failed: {e}")
                };
                VerifyError::Rpc { reason }
            })?;

        let parsed: JsonRpcResponse = response.json().await.map_err(|e| VerifyError::Rpc {
            reason: format!("malformed node response: {e}"),
        })?;

        if let Some(err) = parsed.error {
            return Err(VerifyError::Rpc {
                reason: format!("node error {}: {}", err.code, err.message),
            });
        }

        // A null result means the transaction is not mined yet; that is
        // not the same thing as a permanent failure.
        let receipt = parsed.result.ok_or_else(|| VerifyError::NotMined {
            tx_hash: tx_hash.to_string(),
        })?;

        match normalize_quantity(&receipt.status).as_str() {
            "0x1" => Ok(receipt),
            "0x0" => Err(VerifyError::Reverted {
                tx_hash: tx_hash.to_string(),
            }),
            other => Err(VerifyError::Unclassifiable {
                tx_hash: tx_hash.to_string(),
                status: other.to_string(),
            }),
        }
    }
}

/// True for a 0x-prefixed 32-byte hex hash.
pub fn is_tx_hash(raw: &str) -> bool {
    let Some(hex_part) = raw.strip_prefix("0x") else {
        return false;
    };
    hex_part.len() == 64 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Strip leading zeros from a quantity-encoded hex field so `0x01` and
/// `0x1` classify identically.
fn normalize_quantity(raw: &str) -> String {
    let hex_part = raw.trim().strip_prefix("0x").unwrap_or(raw.trim());
    let trimmed = hex_part.trim_start_matches('0');
    if trimmed.is_empty() {
        "0x0".to_string()
    } else {
        format!("0x{}", trimmed.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::sync::oneshot;

    const MINED_HASH: &str =
        "0x1111111111111111111111111111111111111111111111111111111111111111";
    const REVERTED_HASH: &str =
        "0x2222222222222222222222222222222222222222222222222222222222222222";

    /// Minimal node stub: answers `eth_getTransactionReceipt` from a fixed
    /// table keyed by hash.
    async fn start_node_stub() -> Option<(ChainConfig, oneshot::Sender<()>)> {
        async fn handler(Json(req): Json<serde_json::Value>) -> Json<serde_json::Value> {
            let hash = req["params"][0].as_str().unwrap_or_default().to_string();
            let result = match hash.as_str() {
                MINED_HASH => serde_json::json!({
                    "transactionHash": hash,
                    "status": "0x1",
                    "blockNumber": "0x10",
                    "contractAddress": "0x000000000000000000000000000000000000c0de",
                    "gasUsed": "0x5208",
                }),
                REVERTED_HASH => serde_json::json!({
                    "transactionHash": hash,
                    "status": "0x0",
                    "blockNumber": "0x11",
                }),
                _ => serde_json::Value::Null,
            };
            Json(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
        }

        let app = Router::new().route("/", post(handler));
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(l) => l,
            // Sandboxed environments may forbid binding; skip in that case.
            Err(_) => return None,
        };
        let bound = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        let chain = ChainConfig {
            name: "stub".to_string(),
            network_id: 31337,
            rpc_url: format!("http://{bound}"),
        };
        Some((chain, shutdown_tx))
    }

    #[test]
    fn validates_hash_shape() {
        assert!(is_tx_hash(MINED_HASH));
        assert!(!is_tx_hash("0x123"));
        assert!(!is_tx_hash("1111111111111111111111111111111111111111111111111111111111111111"));
        assert!(!is_tx_hash(&format!("0x{}", "zz".repeat(32))));
    }

    #[test]
    fn normalizes_quantity_encoding() {
        assert_eq!(normalize_quantity("0x1"), "0x1");
        assert_eq!(normalize_quantity("0x01"), "0x1");
        assert_eq!(normalize_quantity("0x0"), "0x0");
        assert_eq!(normalize_quantity("0x00"), "0x0");
    }

    #[tokio::test]
    async fn classifies_mined_reverted_and_missing() {
        let Some((chain, _shutdown)) = start_node_stub().await else {
            return;
        };
        let verifier = RpcVerifier::new(Duration::from_secs(5)).unwrap();

        let receipt = verifier.verify(MINED_HASH, &chain).await.expect("mined");
        assert!(receipt.succeeded());
        assert_eq!(
            receipt.contract_address.as_deref(),
            Some("0x000000000000000000000000000000000000c0de")
        );

        let err = verifier.verify(REVERTED_HASH, &chain).await.unwrap_err();
        assert!(matches!(err, VerifyError::Reverted { .. }));

        let unknown = format!("0x{}", "33".repeat(32));
        let err = verifier.verify(&unknown, &chain).await.unwrap_err();
        assert!(matches!(err, VerifyError::NotMined { .. }));
    }

    #[tokio::test]
    async fn verification_is_idempotent_for_mined_hashes() {
        let Some((chain, _shutdown)) = start_node_stub().await else {
            return;
        };
        let verifier = Arc::new(RpcVerifier::new(Duration::from_secs(5)).unwrap());

        let first = verifier.verify(MINED_HASH, &chain).await.expect("mined");
        let second = verifier.verify(MINED_HASH, &chain).await.expect("mined");
        assert_eq!(first.succeeded(), second.succeeded());
        assert_eq!(first.contract_address, second.contract_address);

        // Same for the failure classification.
        let e1 = verifier.verify(REVERTED_HASH, &chain).await.unwrap_err();
        let e2 = verifier.verify(REVERTED_HASH, &chain).await.unwrap_err();
        assert!(matches!(e1, VerifyError::Reverted { .. }));
        assert!(matches!(e2, VerifyError::Reverted { .. }));
    }

    #[tokio::test]
    async fn malformed_hash_is_rejected_without_a_network_call() {
        let verifier = RpcVerifier::new(Duration::from_secs(5)).unwrap();
        let chain = ChainConfig {
            name: "unreachable".to_string(),
            network_id: 1,
            // Nothing listens here; an InvalidHash result proves we never
            // tried to connect.
            rpc_url: "http://127.0.0.1:1".to_string(),
        };
        let err = verifier.verify("0xnope", &chain).await.unwrap_err();
        assert!(matches!(err, VerifyError::InvalidHash { .. }));
    }
}
