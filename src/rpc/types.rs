// Types RPC - Structures for JSON-RPC 2.0 requests and responses
use serde::{Deserialize, Serialize};

// =============================================================================
// JSON-RPC 2.0 PROTOCOL TYPES
// =============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0")
    pub jsonrpc: String,

    /// Method name (e.g., "system_peers")
    pub method: String,

    /// Method parameters
    #[serde(default)]
    pub params: serde_json::Value,

    /// Request ID
    pub id: JsonRpcId,
}

impl JsonRpcRequest {
    pub fn new(method: &str, params: serde_json::Value, id: i64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: JsonRpcId::Number(id),
        }
    }
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: String,

    /// Result (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    /// Request ID
    pub id: JsonRpcId,
}

impl JsonRpcResponse {
    pub fn success<T: Serialize>(id: JsonRpcId, result: T) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(serde_json::to_value(result).unwrap_or(serde_json::Value::Null)),
            error: None,
            id,
        }
    }

    pub fn error(id: JsonRpcId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// JSON-RPC Request ID (can be string, number, or null)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
    Null,
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    /// Invalid request (-32600)
    pub fn invalid_request(message: &str) -> Self {
        Self {
            code: -32600,
            message: format!("Invalid request: {}", message),
            data: None,
        }
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {}", method),
            data: None,
        }
    }

    /// Invalid params (-32602)
    pub fn invalid_params(message: &str) -> Self {
        Self {
            code: -32602,
            message: format!("Invalid params: {}", message),
            data: None,
        }
    }

    /// Internal error (-32603)
    pub fn internal_error(message: &str) -> Self {
        Self {
            code: -32603,
            message: format!("Internal error: {}", message),
            data: None,
        }
    }

    /// Missing or invalid bearer token on the control endpoint (-32001)
    pub fn unauthorized(reason: &str) -> Self {
        Self {
            code: -32001,
            message: format!("Unauthorized: {}", reason),
            data: None,
        }
    }
}

// =============================================================================
// NODE INFO TYPES
// =============================================================================

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Node event loop is answering
    pub healthy: bool,
    /// Has at least one peer
    pub has_peers: bool,
    /// Connected peer count
    pub peer_count: usize,
    /// Best known block height
    pub block_height: u64,
}

/// Connected peers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersInfo {
    pub count: usize,
    pub peers: Vec<String>,
}

/// Node identity and wiring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Chain name
    pub chain_name: String,
    /// libp2p peer ID
    pub peer_id: String,
    /// Multiaddr to dial this node
    pub p2p_address: String,
    /// Produces blocks
    pub is_producer: bool,
    /// Configured static peers
    pub static_peers: Vec<String>,
}

/// Current chain head
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainHead {
    pub number: u64,
    pub hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_success_shape() {
        let response = JsonRpcResponse::success(JsonRpcId::Number(7), "0.1.0");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["result"], "0.1.0");
        assert_eq!(json["id"], 7);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_request_without_params() {
        let request: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"system_version","id":"a"}"#).unwrap();
        assert_eq!(request.params, serde_json::Value::Null);
        assert_eq!(request.id, JsonRpcId::String("a".to_string()));
    }

    #[test]
    fn test_node_info_camel_case() {
        let info = NodeInfo {
            chain_name: "devnet".to_string(),
            peer_id: "12D3Koo".to_string(),
            p2p_address: "/ip4/127.0.0.1/tcp/1".to_string(),
            is_producer: true,
            static_peers: vec![],
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["peerId"], "12D3Koo");
        assert_eq!(json["isProducer"], true);
    }
}
