use super::eth::{Address, EthSignature};
use super::{ProviderError, TransactionRequest, TxHash, USER_REJECTED_CODE, WalletProvider};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Wallet reached over Ethereum JSON-RPC 2.0 (HTTP POST).
///
/// No request timeout is set: how long the user takes to approve is up to
/// the wallet.
pub struct JsonRpcProvider {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    pub fn new(url: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(JsonRpcProvider {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(method, id, url = %self.url, "json-rpc request");
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!("HTTP {}", status)));
        }

        let reply: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if let Some(error) = reply.error {
            tracing::debug!(method, code = error.code, message = %error.message, "json-rpc error");
            return Err(if error.code == USER_REJECTED_CODE {
                ProviderError::UserRejected
            } else {
                ProviderError::Rpc {
                    code: error.code,
                    message: error.message,
                }
            });
        }

        let result = reply
            .result
            .ok_or_else(|| ProviderError::InvalidResponse(format!("{} returned no result", method)))?;
        serde_json::from_value(result).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl WalletProvider for JsonRpcProvider {
    fn name(&self) -> &str {
        "json-rpc"
    }

    async fn request_accounts(&self) -> Result<Vec<Address>, ProviderError> {
        self.call("eth_requestAccounts", json!([])).await
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> Result<TxHash, ProviderError> {
        let hash: String = self.call("eth_sendTransaction", json!([tx])).await?;
        TxHash::parse(&hash)
    }

    async fn personal_sign(
        &self,
        message: &[u8],
        account: &Address,
    ) -> Result<EthSignature, ProviderError> {
        let data = format!("0x{}", hex::encode(message));
        self.call("personal_sign", json!([data, account])).await
    }
}
