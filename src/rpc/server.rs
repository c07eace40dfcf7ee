// Server RPC - JSON-RPC HTTP Server using warp
//
// Note: the node's swarm lives in its own task and is not Sync, so warp
// handlers never touch node state directly. Requests are sent over a channel
// to the node event loop, which answers on a oneshot.

use crate::rpc::auth::verify_bearer;
use crate::rpc::types::{
    ChainHead, HealthStatus, JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse, NodeInfo,
    PeersInfo,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::Filter;

/// How long a stopping server may take to drain connections
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// RPC REQUEST/RESPONSE TYPES FOR CHANNEL
// =============================================================================

/// Internal RPC request sent over channel
pub enum RpcCall {
    SystemHealth(oneshot::Sender<HealthStatus>),
    SystemPeers(oneshot::Sender<PeersInfo>),
    NodeInfo(oneshot::Sender<NodeInfo>),
    ChainHead(oneshot::Sender<ChainHead>),
    AddPeer(String, oneshot::Sender<Result<(), String>>),
}

/// Channel sender for RPC calls
pub type RpcSender = mpsc::UnboundedSender<RpcCall>;

// =============================================================================
// RPC STATE
// =============================================================================

/// State shared with warp handlers
#[derive(Clone)]
pub struct RpcState {
    /// Channel to send requests to the node
    pub tx: RpcSender,
    /// Secret required from callers; `Some` marks the privileged endpoint
    pub secret: Option<Arc<[u8; 32]>>,
}

impl RpcState {
    pub fn new(tx: RpcSender) -> Self {
        Self { tx, secret: None }
    }

    pub fn with_secret(tx: RpcSender, secret: [u8; 32]) -> Self {
        Self {
            tx,
            secret: Some(Arc::new(secret)),
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.secret.is_some()
    }

    /// Check the caller's Authorization header on privileged endpoints
    fn authorize(&self, header: Option<&str>) -> Result<(), String> {
        match self.secret {
            Some(ref secret) => verify_bearer(header, &secret[..]).map_err(|e| e.to_string()),
            None => Ok(()),
        }
    }
}

// =============================================================================
// RPC SERVER
// =============================================================================

/// JSON-RPC HTTP Server
pub struct RpcServer {
    /// Listen address (loopback only for devnet nodes)
    addr: SocketAddr,
    /// Control secret; when set every call needs a bearer token
    secret: Option<[u8; 32]>,
}

impl RpcServer {
    /// Create a public query server
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, secret: None }
    }

    /// Create a privileged control server
    pub fn with_secret(addr: SocketAddr, secret: [u8; 32]) -> Self {
        Self {
            addr,
            secret: Some(secret),
        }
    }

    /// Bind and serve in the background, returns a shutdown handle
    pub async fn start_background(self, rpc_tx: RpcSender) -> Result<RpcServerHandle, RpcServerError> {
        let state = match self.secret {
            Some(secret) => RpcState::with_secret(rpc_tx, secret),
            None => RpcState::new(rpc_tx),
        };
        let kind = if state.is_privileged() { "control" } else { "query" };

        // JSON-RPC endpoint
        let rpc = warp::path::end()
            .and(warp::post())
            .and(warp::header::optional::<String>("authorization"))
            .and(warp::body::json())
            .and(with_state(state.clone()))
            .and_then(handle_rpc_request);

        // Health check endpoint
        let health = warp::path("health")
            .and(warp::get())
            .and(warp::header::optional::<String>("authorization"))
            .and(with_state(state.clone()))
            .and_then(handle_health_check);

        let routes = rpc.or(health);

        // Create shutdown channel
        let (tx, rx) = oneshot::channel::<()>();

        let (bound_addr, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(self.addr, async {
                rx.await.ok();
            })
            .map_err(|e| RpcServerError::BindError(format!("{}: {}", self.addr, e)))?;

        info!("🌐 RPC {} server ready on http://{}", kind, bound_addr);

        let task = tokio::spawn(server);

        Ok(RpcServerHandle {
            addr: bound_addr,
            shutdown_tx: Some(tx),
            task: Some(task),
        })
    }
}

/// Handle for a running RPC server
pub struct RpcServerHandle {
    /// Server address
    pub addr: SocketAddr,
    /// Shutdown signal sender
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Server task
    task: Option<JoinHandle<()>>,
}

impl RpcServerHandle {
    /// Stop the server and wait until the listener is released
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
                warn!("RPC server on {} did not drain in time, aborting", self.addr);
                abort.abort();
            }
        }
        debug!("RPC server on {} stopped", self.addr);
    }

    /// Get the server address
    pub fn address(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for RpcServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

// =============================================================================
// REQUEST HANDLERS
// =============================================================================

/// Filter to inject state into handlers
fn with_state(
    state: RpcState,
) -> impl Filter<Extract = (RpcState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Handle a single JSON-RPC request
async fn handle_rpc_request(
    authorization: Option<String>,
    request: JsonRpcRequest,
    state: RpcState,
) -> Result<impl warp::Reply, Infallible> {
    if let Err(reason) = state.authorize(authorization.as_deref()) {
        warn!("Rejected unauthorized {} call: {}", request.method, reason);
        let response = JsonRpcResponse::error(request.id, JsonRpcError::unauthorized(&reason));
        return Ok(warp::reply::with_status(
            warp::reply::json(&response),
            StatusCode::UNAUTHORIZED,
        ));
    }

    debug!("RPC request: {}", request.method);

    // Validate JSON-RPC version
    if request.jsonrpc != "2.0" {
        let response = JsonRpcResponse::error(
            request.id,
            JsonRpcError::invalid_request("Invalid JSON-RPC version"),
        );
        return Ok(warp::reply::with_status(warp::reply::json(&response), StatusCode::OK));
    }

    let response = route_request(request, &state).await;
    Ok(warp::reply::with_status(warp::reply::json(&response), StatusCode::OK))
}

/// Route request to appropriate handler
async fn route_request(request: JsonRpcRequest, state: &RpcState) -> JsonRpcResponse {
    match request.method.as_str() {
        // System methods
        "system_version" => JsonRpcResponse::success(request.id, env!("CARGO_PKG_VERSION")),
        "system_name" => JsonRpcResponse::success(request.id, "KratOs Devnet Node"),
        "system_health" => handle_system_health(request.id, state).await,
        "system_peers" => handle_system_peers(request.id, state).await,
        "system_nodeInfo" => handle_node_info(request.id, state).await,

        // Chain methods
        "chain_getHead" => handle_chain_head(request.id, state).await,

        // Admin methods (control endpoint only)
        "admin_addPeer" if state.is_privileged() => {
            handle_add_peer(request.id, request.params, state).await
        }
        "admin_peers" if state.is_privileged() => handle_system_peers(request.id, state).await,

        // Unknown method
        _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(&request.method)),
    }
}

// =============================================================================
// INDIVIDUAL HANDLERS
// =============================================================================

async fn handle_system_health(id: JsonRpcId, state: &RpcState) -> JsonRpcResponse {
    let (tx, rx) = oneshot::channel();
    if state.tx.send(RpcCall::SystemHealth(tx)).is_err() {
        return JsonRpcResponse::error(id, JsonRpcError::internal_error("Node unavailable"));
    }
    match rx.await {
        Ok(health) => JsonRpcResponse::success(id, health),
        Err(_) => JsonRpcResponse::error(id, JsonRpcError::internal_error("Request timeout")),
    }
}

async fn handle_system_peers(id: JsonRpcId, state: &RpcState) -> JsonRpcResponse {
    let (tx, rx) = oneshot::channel();
    if state.tx.send(RpcCall::SystemPeers(tx)).is_err() {
        return JsonRpcResponse::error(id, JsonRpcError::internal_error("Node unavailable"));
    }
    match rx.await {
        Ok(peers) => JsonRpcResponse::success(id, peers),
        Err(_) => JsonRpcResponse::error(id, JsonRpcError::internal_error("Request timeout")),
    }
}

async fn handle_node_info(id: JsonRpcId, state: &RpcState) -> JsonRpcResponse {
    let (tx, rx) = oneshot::channel();
    if state.tx.send(RpcCall::NodeInfo(tx)).is_err() {
        return JsonRpcResponse::error(id, JsonRpcError::internal_error("Node unavailable"));
    }
    match rx.await {
        Ok(info) => JsonRpcResponse::success(id, info),
        Err(_) => JsonRpcResponse::error(id, JsonRpcError::internal_error("Request timeout")),
    }
}

async fn handle_chain_head(id: JsonRpcId, state: &RpcState) -> JsonRpcResponse {
    let (tx, rx) = oneshot::channel();
    if state.tx.send(RpcCall::ChainHead(tx)).is_err() {
        return JsonRpcResponse::error(id, JsonRpcError::internal_error("Node unavailable"));
    }
    match rx.await {
        Ok(head) => JsonRpcResponse::success(id, head),
        Err(_) => JsonRpcResponse::error(id, JsonRpcError::internal_error("Request timeout")),
    }
}

async fn handle_add_peer(id: JsonRpcId, params: serde_json::Value, state: &RpcState) -> JsonRpcResponse {
    let address: String = match params {
        serde_json::Value::Array(arr) if !arr.is_empty() => match arr[0].as_str() {
            Some(s) => s.to_string(),
            None => return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Expected multiaddr string")),
        },
        _ => return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Expected [multiaddr]")),
    };

    let (tx, rx) = oneshot::channel();
    if state.tx.send(RpcCall::AddPeer(address, tx)).is_err() {
        return JsonRpcResponse::error(id, JsonRpcError::internal_error("Node unavailable"));
    }
    match rx.await {
        Ok(Ok(())) => JsonRpcResponse::success(id, true),
        Ok(Err(e)) => JsonRpcResponse::error(id, JsonRpcError::invalid_params(&e)),
        Err(_) => JsonRpcResponse::error(id, JsonRpcError::internal_error("Request timeout")),
    }
}

/// Handle health check request
async fn handle_health_check(
    authorization: Option<String>,
    state: RpcState,
) -> Result<impl warp::Reply, Infallible> {
    let unhealthy = HealthStatus {
        healthy: false,
        has_peers: false,
        peer_count: 0,
        block_height: 0,
    };

    if state.authorize(authorization.as_deref()).is_err() {
        return Ok(warp::reply::with_status(
            warp::reply::json(&unhealthy),
            StatusCode::UNAUTHORIZED,
        ));
    }

    let (tx, rx) = oneshot::channel();
    if state.tx.send(RpcCall::SystemHealth(tx)).is_err() {
        return Ok(warp::reply::with_status(
            warp::reply::json(&unhealthy),
            StatusCode::SERVICE_UNAVAILABLE,
        ));
    }
    match rx.await {
        Ok(health) => Ok(warp::reply::with_status(warp::reply::json(&health), StatusCode::OK)),
        Err(_) => Ok(warp::reply::with_status(
            warp::reply::json(&unhealthy),
            StatusCode::SERVICE_UNAVAILABLE,
        )),
    }
}

// =============================================================================
// RPC SERVER ERROR
// =============================================================================

/// RPC Server errors
#[derive(Debug, thiserror::Error)]
pub enum RpcServerError {
    #[error("Bind error: {0}")]
    BindError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::auth::create_token;

    fn request(method: &str, params: serde_json::Value) -> JsonRpcRequest {
        JsonRpcRequest::new(method, params, 1)
    }

    #[tokio::test]
    async fn test_version_answered_without_node() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let state = RpcState::new(tx);

        let response = route_request(request("system_version", serde_json::Value::Null), &state).await;
        assert_eq!(response.result.unwrap(), env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_admin_methods_hidden_on_public_endpoint() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let state = RpcState::new(tx);

        let response = route_request(
            request("admin_addPeer", serde_json::json!(["/ip4/127.0.0.1/tcp/1"])),
            &state,
        )
        .await;
        assert_eq!(response.error.unwrap().code, -32601);
    }

    #[tokio::test]
    async fn test_add_peer_routed_to_node() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = RpcState::with_secret(tx, [1u8; 32]);

        tokio::spawn(async move {
            if let Some(RpcCall::AddPeer(addr, resp)) = rx.recv().await {
                let _ = resp.send(if addr.is_empty() { Err("empty".to_string()) } else { Ok(()) });
            }
        });

        let response = route_request(
            request("admin_addPeer", serde_json::json!(["/ip4/127.0.0.1/tcp/1"])),
            &state,
        )
        .await;
        assert_eq!(response.result.unwrap(), true);
    }

    #[tokio::test]
    async fn test_add_peer_requires_params() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let state = RpcState::with_secret(tx, [1u8; 32]);

        let response = route_request(request("admin_addPeer", serde_json::Value::Null), &state).await;
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_node_gone_reports_internal_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let state = RpcState::new(tx);

        let response = route_request(request("system_peers", serde_json::Value::Null), &state).await;
        assert_eq!(response.error.unwrap().code, -32603);
    }

    #[test]
    fn test_authorize() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let public = RpcState::new(tx.clone());
        assert!(public.authorize(None).is_ok());

        let secret = [3u8; 32];
        let control = RpcState::with_secret(tx, secret);
        assert!(control.authorize(None).is_err());

        let token = create_token(&secret).unwrap();
        assert!(control.authorize(Some(&format!("Bearer {}", token))).is_ok());
    }
}
