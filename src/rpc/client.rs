// Client RPC - Minimal JSON-RPC client for devnet node endpoints
// Principle: One request per call, fresh bearer token per call on control endpoints

use crate::rpc::auth::create_token;
use crate::rpc::types::{JsonRpcRequest, JsonRpcResponse};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// JSON-RPC client bound to one endpoint
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    secret: Option<[u8; 32]>,
    next_id: AtomicI64,
}

impl RpcClient {
    /// Client for a public query endpoint
    pub fn new(addr: SocketAddr) -> Result<Self, RpcClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(|e| RpcClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            url: format!("http://{}/", addr),
            secret: None,
            next_id: AtomicI64::new(1),
        })
    }

    /// Client for a control endpoint, authenticating with `secret`
    pub fn with_secret(addr: SocketAddr, secret: [u8; 32]) -> Result<Self, RpcClientError> {
        let mut client = Self::new(addr)?;
        client.secret = Some(secret);
        Ok(client)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and decode its result
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, RpcClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, id);

        let mut builder = self.http.post(&self.url).json(&request);
        if let Some(ref secret) = self.secret {
            let token = create_token(secret).map_err(|e| RpcClientError::Auth(e.to_string()))?;
            builder = builder.bearer_auth(token);
        }

        let http_response = builder
            .send()
            .await
            .map_err(|e| RpcClientError::Transport(e.to_string()))?;
        let status = http_response.status();

        let response: JsonRpcResponse = http_response
            .json()
            .await
            .map_err(|e| RpcClientError::Decode(format!("HTTP {}: {}", status, e)))?;

        if let Some(error) = response.error {
            return Err(RpcClientError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result).map_err(|e| RpcClientError::Decode(e.to_string()))
    }

    /// Trivial query used as the readiness probe
    pub async fn version(&self) -> Result<String, RpcClientError> {
        self.call("system_version", serde_json::Value::Null).await
    }

    /// Connected peer count
    pub async fn peer_count(&self) -> Result<usize, RpcClientError> {
        let peers: crate::rpc::types::PeersInfo =
            self.call("system_peers", serde_json::Value::Null).await?;
        Ok(peers.count)
    }
}

/// RPC client errors
#[derive(Debug, thiserror::Error)]
pub enum RpcClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Remote error {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("Auth error: {0}")]
    Auth(String),
}

impl RpcClientError {
    /// Whether the endpoint could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        matches!(self, RpcClientError::Transport(_))
    }
}
