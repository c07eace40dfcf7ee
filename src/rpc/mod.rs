// RPC - JSON-RPC API for devnet nodes

pub mod auth;
pub mod client;
pub mod server;
pub mod types;

// Re-export commonly used types
pub use auth::{create_token, verify_bearer, AuthError};
pub use client::{RpcClient, RpcClientError};
pub use server::{RpcCall, RpcSender, RpcServer, RpcServerError, RpcServerHandle, RpcState};
pub use types::{
    ChainHead, HealthStatus, JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse, NodeInfo,
    PeersInfo,
};
