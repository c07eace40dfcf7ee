// Engine - Capability interface between the orchestrator and a node implementation
// Principle: The orchestrator never depends on a concrete engine

use super::identity::NodeIdentity;
use async_trait::async_trait;
use libp2p::PeerId;
use std::net::SocketAddr;

/// Something that can start nodes from an identity
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Live node handle type
    type Handle: NodeHandle;

    /// Start one node. Returns once the node's endpoints are bound; readiness
    /// is checked by the caller.
    async fn start(&self, identity: &NodeIdentity) -> Result<Self::Handle, EngineError>;
}

/// A running node
#[async_trait]
pub trait NodeHandle: Send + Sync + 'static {
    /// Peer ID of the node
    fn peer_id(&self) -> PeerId;

    /// Multiaddr other nodes dial to reach this one
    fn address(&self) -> String;

    /// JSON-RPC query endpoint
    fn query_endpoint(&self) -> SocketAddr;

    /// Authenticated control endpoint, if enabled
    fn control_endpoint(&self) -> Option<SocketAddr>;

    /// Ask the node's P2P layer to dial `address`. Does not wait for the
    /// handshake to complete.
    async fn add_peer(&self, address: &str) -> Result<(), EngineError>;

    /// Stop the node and release its ports. Calling it again is a no-op.
    async fn close(&self) -> Result<(), EngineError>;
}

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Node is closed")]
    Closed,
}
