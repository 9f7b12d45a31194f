use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::instrument;

/// EIP-1193 "User Rejected Request".
pub const USER_REJECTED: i64 = 4001;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Provider answered HTTP {0}")]
    Http(StatusCode),
    #[error("{message} (code {code})")]
    Rpc { code: i64, message: String },
    #[error("Unexpected provider response: {0}")]
    Decode(String),
}

impl RpcError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, RpcError::Rpc { code, .. } if *code == USER_REJECTED)
    }
}

#[derive(Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    result: Value,
    error: Option<ErrorObject>,
}

/// JSON-RPC 2.0 over HTTP, as spoken by wallet bridges and Ethereum nodes.
#[derive(Debug)]
pub struct JsonRpcClient {
    http: Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(url: &str) -> Self {
        Self {
            http: Client::new(),
            url: url.to_string(),
            next_id: AtomicU64::new(1),
        }
    }

    #[instrument(skip(self, params))]
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Http(status));
        }

        let body: Response = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;

        if let Some(error) = body.error {
            tracing::debug!("{} failed with code {}", method, error.code);
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(body.result).map_err(|e| RpcError::Decode(e.to_string()))
    }
}
