// Node Service - Embedded devnet node and the engine that launches it
// Principle: A node is three kinds of task tied to one cancellation token; close() waits for all of them

use crate::config::DevnetConfig;
use crate::devnet::engine::{Engine, EngineError, NodeHandle};
use crate::devnet::identity::NodeIdentity;
use crate::devnet::secret::read_secret;
use crate::network::protocol::NetworkMessage;
use crate::network::service::{NetworkError, NetworkEvent, NetworkHandle, NetworkService};
use crate::node::producer::{BlockProducer, ImportResult};
use crate::rpc::server::{RpcCall, RpcServer, RpcServerError, RpcServerHandle};
use crate::rpc::types::{HealthStatus, NodeInfo, PeersInfo};
use async_trait::async_trait;
use libp2p::PeerId;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default interval between synthetic blocks
pub const DEFAULT_BLOCK_TIME: Duration = Duration::from_secs(1);

/// Default interval for redialing disconnected static peers
pub const DEFAULT_REDIAL_INTERVAL: Duration = Duration::from_millis(500);

// =============================================================================
// ENGINE
// =============================================================================

/// Launches embedded KratOs dev nodes
#[derive(Debug, Clone)]
pub struct DevEngine {
    chain_name: String,
    block_time: Duration,
    redial_interval: Duration,
}

impl DevEngine {
    pub fn new(chain_name: impl Into<String>) -> Self {
        Self {
            chain_name: chain_name.into(),
            block_time: DEFAULT_BLOCK_TIME,
            redial_interval: DEFAULT_REDIAL_INTERVAL,
        }
    }

    pub fn from_config(config: &DevnetConfig) -> Self {
        Self {
            chain_name: config.chain_name.clone(),
            block_time: config.block_time(),
            redial_interval: config.redial_interval(),
        }
    }

    pub fn with_block_time(mut self, block_time: Duration) -> Self {
        self.block_time = block_time;
        self
    }

    pub fn with_redial_interval(mut self, redial_interval: Duration) -> Self {
        self.redial_interval = redial_interval;
        self
    }
}

#[async_trait]
impl Engine for DevEngine {
    type Handle = DevNode;

    async fn start(&self, identity: &NodeIdentity) -> Result<DevNode, EngineError> {
        DevNode::launch(self, identity).await
    }
}

// =============================================================================
// NODE HANDLE
// =============================================================================

/// Servers and tasks of a running node
#[derive(Default)]
struct NodeTasks {
    servers: Vec<RpcServerHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeTasks {
    /// Cancel everything and wait until every listener is released
    async fn shutdown(self, token: &CancellationToken) {
        token.cancel();

        for server in self.servers {
            server.stop().await;
        }

        for task in self.tasks {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!("Node task panicked: {}", e);
                }
            }
        }
    }
}

/// Handle to a running dev node
pub struct DevNode {
    index: usize,
    peer_id: PeerId,
    address: String,
    query_addr: SocketAddr,
    control_addr: Option<SocketAddr>,
    network: NetworkHandle,
    shutdown: CancellationToken,
    tasks: Mutex<Option<NodeTasks>>,
}

impl std::fmt::Debug for DevNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevNode")
            .field("index", &self.index)
            .field("peer_id", &self.peer_id)
            .field("query_addr", &self.query_addr)
            .field("control_addr", &self.control_addr)
            .finish_non_exhaustive()
    }
}

impl DevNode {
    async fn launch(engine: &DevEngine, identity: &NodeIdentity) -> Result<Self, EngineError> {
        let shutdown = CancellationToken::new();
        let mut tasks = NodeTasks::default();

        match Self::spawn_tasks(engine, identity, &shutdown, &mut tasks).await {
            Ok((network, query_addr, control_addr)) => {
                info!(
                    "🚀 Node {} started: peer {} rpc {}",
                    identity.index, identity.id, query_addr
                );

                Ok(Self {
                    index: identity.index,
                    peer_id: identity.id,
                    address: identity.p2p_address(),
                    query_addr,
                    control_addr,
                    network,
                    shutdown,
                    tasks: Mutex::new(Some(tasks)),
                })
            }
            Err(e) => {
                tasks.shutdown(&shutdown).await;
                Err(e)
            }
        }
    }

    /// Start every component, recording each one in `tasks` as soon as it runs
    async fn spawn_tasks(
        engine: &DevEngine,
        identity: &NodeIdentity,
        shutdown: &CancellationToken,
        tasks: &mut NodeTasks,
    ) -> Result<(NetworkHandle, SocketAddr, Option<SocketAddr>), EngineError> {
        std::fs::create_dir_all(&identity.data_dir)?;

        let keypair = identity
            .keypair()
            .map_err(|e| EngineError::Key(e.to_string()))?;

        // P2P
        let (mut service, network_events) =
            NetworkService::new(keypair, &identity.listen_address()).map_err(network_error)?;
        for peer in &identity.static_peers {
            service.add_static_peer(peer).map_err(network_error)?;
        }

        let (network, network_task) = service.spawn(shutdown.child_token(), engine.redial_interval);
        tasks.tasks.push(network_task);

        // RPC
        let (rpc_tx, rpc_rx) = mpsc::unbounded_channel();

        let query_server = RpcServer::new(identity.rpc_addr())
            .start_background(rpc_tx.clone())
            .await
            .map_err(rpc_error)?;
        let query_addr = query_server.address();
        tasks.servers.push(query_server);

        let control_addr = match (&identity.control_secret_path, identity.control_addr()) {
            (Some(path), Some(addr)) => {
                let secret = read_secret(path).map_err(|e| EngineError::Key(e.to_string()))?;
                let control_server = RpcServer::with_secret(addr, secret)
                    .start_background(rpc_tx)
                    .await
                    .map_err(rpc_error)?;
                let bound = control_server.address();
                tasks.servers.push(control_server);
                Some(bound)
            }
            (Some(_), None) => {
                return Err(EngineError::Rpc(
                    "control secret configured without a control port".to_string(),
                ))
            }
            _ => None,
        };

        // Node loop
        let node_loop = NodeLoop {
            info: NodeInfo {
                chain_name: engine.chain_name.clone(),
                peer_id: identity.id.to_string(),
                p2p_address: identity.p2p_address(),
                is_producer: identity.is_producer,
                static_peers: identity.static_peers.clone(),
            },
            network: network.clone(),
            chain: BlockProducer::new(identity.id.to_string()),
        };
        tasks.tasks.push(tokio::spawn(node_loop.run(
            rpc_rx,
            network_events,
            shutdown.child_token(),
            engine.block_time,
        )));

        Ok((network, query_addr, control_addr))
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

#[async_trait]
impl NodeHandle for DevNode {
    fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn query_endpoint(&self) -> SocketAddr {
        self.query_addr
    }

    fn control_endpoint(&self) -> Option<SocketAddr> {
        self.control_addr
    }

    async fn add_peer(&self, address: &str) -> Result<(), EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        self.network.add_peer(address).await.map_err(network_error)
    }

    async fn close(&self) -> Result<(), EngineError> {
        // Held across shutdown so concurrent callers return only once ports are free
        let mut tasks = self.tasks.lock().await;

        if let Some(running) = tasks.take() {
            running.shutdown(&self.shutdown).await;
            info!("🛑 Node {} stopped", self.index);
        }

        Ok(())
    }
}

impl Drop for DevNode {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn network_error(e: NetworkError) -> EngineError {
    match e {
        NetworkError::InvalidAddress(addr) => EngineError::InvalidAddress(addr),
        NetworkError::ServiceStopped => EngineError::Closed,
        other => EngineError::Network(other.to_string()),
    }
}

fn rpc_error(e: RpcServerError) -> EngineError {
    EngineError::Rpc(e.to_string())
}

// =============================================================================
// NODE EVENT LOOP
// =============================================================================

/// Answers RPC calls, follows gossip and produces blocks
struct NodeLoop {
    info: NodeInfo,
    network: NetworkHandle,
    chain: BlockProducer,
}

impl NodeLoop {
    async fn run(
        mut self,
        mut rpc_rx: mpsc::UnboundedReceiver<RpcCall>,
        mut network_events: mpsc::UnboundedReceiver<NetworkEvent>,
        shutdown: CancellationToken,
        block_time: Duration,
    ) {
        let block_time = block_time.max(Duration::from_millis(1));
        let mut block_timer =
            tokio::time::interval_at(tokio::time::Instant::now() + block_time, block_time);
        block_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(call) = rpc_rx.recv() => {
                    self.handle_rpc_call(call).await;
                }
                Some(event) = network_events.recv() => {
                    self.handle_network_event(event);
                }
                _ = block_timer.tick(), if self.info.is_producer => {
                    self.produce_block();
                }
            }
        }

        debug!("Node loop for {} stopped", self.info.peer_id);
    }

    async fn connected_peers(&self) -> Vec<PeerId> {
        match self.network.connected_peers().await {
            Ok(peers) => peers,
            Err(e) => {
                debug!("Peer query failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn handle_rpc_call(&mut self, call: RpcCall) {
        match call {
            RpcCall::SystemHealth(reply) => {
                let peer_count = self.connected_peers().await.len();
                let _ = reply.send(HealthStatus {
                    healthy: true,
                    has_peers: peer_count > 0,
                    peer_count,
                    block_height: self.chain.height(),
                });
            }
            RpcCall::SystemPeers(reply) => {
                let peers: Vec<String> = self
                    .connected_peers()
                    .await
                    .iter()
                    .map(|peer| peer.to_string())
                    .collect();
                let _ = reply.send(PeersInfo {
                    count: peers.len(),
                    peers,
                });
            }
            RpcCall::NodeInfo(reply) => {
                let _ = reply.send(self.info.clone());
            }
            RpcCall::ChainHead(reply) => {
                let _ = reply.send(self.chain.head());
            }
            RpcCall::AddPeer(address, reply) => {
                let result = self
                    .network
                    .add_peer(&address)
                    .await
                    .map_err(|e| e.to_string());
                if result.is_ok() {
                    info!("Added peer {} via control endpoint", address);
                }
                let _ = reply.send(result);
            }
        }
    }

    fn handle_network_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::PeerConnected(peer_id) => {
                debug!("{} connected to {}", self.info.peer_id, peer_id);
            }
            NetworkEvent::PeerDisconnected(peer_id) => {
                debug!("{} disconnected from {}", self.info.peer_id, peer_id);
            }
            NetworkEvent::BlockReceived { from, block } => match self.chain.import(&block) {
                ImportResult::Imported | ImportResult::Stale => {}
                ImportResult::Invalid => {
                    warn!("Invalid block #{} from {}", block.number, from);
                }
            },
        }
    }

    fn produce_block(&mut self) {
        let Some(block) = self.chain.produce(chrono::Utc::now().timestamp()) else {
            warn!("Chain head #{} cannot be extended", self.chain.height());
            return;
        };
        debug!("Produced block #{} {}", block.number, block.hash_hex());

        if let Err(e) = self.network.publish(NetworkMessage::NewBlock(block)) {
            debug!("Failed to gossip block: {}", e);
        }
    }
}
