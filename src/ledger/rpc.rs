//! JSON-RPC 2.0 client for a Solana node.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use super::{COMMITMENT, LedgerClient, RpcError, TokenAccount};
use crate::identity::wallet::Pubkey;

/// Thin JSON-RPC client over `reqwest`.
pub struct RpcClient {
    http: reqwest::Client,
    endpoint: Url,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// `{ context, value }` wrapper most account methods return.
#[derive(Deserialize)]
struct WithContext<T> {
    value: T,
}

impl RpcClient {
    /// Build on an existing HTTP client so connection pools can be shared.
    pub fn with_client(http: reqwest::Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "rpc call");

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }

        let body: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.without_url().to_string()))?;

        if let Some(err) = body.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| RpcError::Decode(format!("{method}: response has no result")))
    }
}

#[async_trait]
impl LedgerClient for RpcClient {
    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        program_id: &Pubkey,
    ) -> Result<Vec<TokenAccount>, RpcError> {
        let resp: WithContext<Vec<Value>> = self
            .call(
                "getParsedTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    { "programId": program_id.to_string() },
                    { "encoding": "jsonParsed", "commitment": COMMITMENT },
                ]),
            )
            .await?;
        Ok(resp.value.iter().map(TokenAccount::from_parsed).collect())
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, RpcError> {
        let resp: WithContext<Option<Value>> = self
            .call(
                "getAccountInfo",
                json!([
                    address.to_string(),
                    { "encoding": "base64", "commitment": COMMITMENT },
                ]),
            )
            .await?;

        let Some(account) = resp.value else {
            return Ok(None);
        };
        // data is ["<base64>", "base64"]
        let encoded = account
            .pointer("/data/0")
            .and_then(|d| d.as_str())
            .ok_or_else(|| RpcError::Decode("account data is not base64-encoded".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| RpcError::Decode(e.to_string()))?;
        Ok(Some(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_errors_omit_the_endpoint() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let endpoint = Url::parse(&format!("http://{addr}/?api-key=rpc-secret")).unwrap();
        let client = RpcClient::with_client(reqwest::Client::new(), endpoint);

        let owner = Pubkey::new([7; 32]);
        let err = client
            .token_accounts_by_owner(&owner, &crate::identity::wallet::TOKEN_PROGRAM)
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
        let text = format!("{err} {err:?}");
        assert!(!text.contains("rpc-secret"), "{text}");
    }
}
