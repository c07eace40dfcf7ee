// Service - Swarm event loop for a devnet node
// Principle: Only configured peers are dialed; the loop owns the swarm, everyone else sends commands

use super::{
    behaviour::{DevnetBehaviour, DevnetBehaviourEvent},
    peer::{parse_peer_address, PeerManager},
    protocol::{BlockAnnouncement, NetworkMessage},
};
use futures::StreamExt;
use libp2p::{
    gossipsub::{Event as GossipsubEvent, PublishError},
    identity::Keypair,
    swarm::{dial_opts::DialOpts, DialError, SwarmEvent},
    Multiaddr, PeerId, Swarm, SwarmBuilder,
};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Connections between devnet nodes are long-lived
const IDLE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// EVENTS & COMMANDS
// =============================================================================

/// Network events for the node
#[derive(Debug)]
pub enum NetworkEvent {
    /// First connection to a peer established
    PeerConnected(PeerId),

    /// Last connection to a peer closed
    PeerDisconnected(PeerId),

    /// Block announcement received via gossip
    BlockReceived {
        from: PeerId,
        block: BlockAnnouncement,
    },
}

/// Commands accepted by the swarm loop
#[derive(Debug)]
enum NetworkCommand {
    AddPeer {
        peer_id: PeerId,
        address: Multiaddr,
        reply: oneshot::Sender<Result<(), NetworkError>>,
    },
    ConnectedPeers(oneshot::Sender<Vec<PeerId>>),
    Publish(NetworkMessage),
}

// =============================================================================
// SERVICE
// =============================================================================

/// Network service owning the libp2p swarm
pub struct NetworkService {
    swarm: Swarm<DevnetBehaviour>,
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    peer_manager: PeerManager,
    local_peer_id: PeerId,
}

impl NetworkService {
    /// Build the swarm and start listening on `listen_addr`
    pub fn new(
        keypair: Keypair,
        listen_addr: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NetworkEvent>), NetworkError> {
        let local_peer_id = PeerId::from(keypair.public());
        let behaviour = DevnetBehaviour::new(&keypair).map_err(NetworkError::Behaviour)?;

        let mut swarm = SwarmBuilder::with_existing_identity(keypair)
            .with_tokio()
            .with_tcp(
                libp2p::tcp::Config::default().nodelay(true),
                libp2p::noise::Config::new,
                libp2p::yamux::Config::default,
            )
            .map_err(|e| NetworkError::Transport(e.to_string()))?
            .with_behaviour(|_| behaviour)
            .map_err(|e| NetworkError::Behaviour(e.to_string()))?
            .with_swarm_config(|c| c.with_idle_connection_timeout(IDLE_CONNECTION_TIMEOUT))
            .build();

        let listen: Multiaddr = listen_addr
            .parse()
            .map_err(|e| NetworkError::InvalidAddress(format!("{}: {}", listen_addr, e)))?;
        swarm
            .listen_on(listen)
            .map_err(|e| NetworkError::Listen(format!("{}: {}", listen_addr, e)))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok((
            Self {
                swarm,
                event_tx,
                peer_manager: PeerManager::new(),
                local_peer_id,
            },
            event_rx,
        ))
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Register a peer to keep connected and dial it
    pub fn add_static_peer(&mut self, address: &str) -> Result<(), NetworkError> {
        let (peer_id, addr) = parse_peer_address(address)?;
        self.add_parsed_peer(peer_id, addr)
    }

    fn add_parsed_peer(&mut self, peer_id: PeerId, address: Multiaddr) -> Result<(), NetworkError> {
        if peer_id == self.local_peer_id {
            return Err(NetworkError::InvalidAddress(format!(
                "{} is this node",
                peer_id
            )));
        }

        if self.peer_manager.add_static_peer(peer_id, address.clone()) {
            debug!("Added static peer {} at {}", peer_id, address);
        }

        self.dial(peer_id, address)
    }

    fn dial(&mut self, peer_id: PeerId, address: Multiaddr) -> Result<(), NetworkError> {
        let opts = DialOpts::peer_id(peer_id).addresses(vec![address]).build();

        match self.swarm.dial(opts) {
            Ok(()) => Ok(()),
            // Already connected or dialing
            Err(DialError::DialPeerConditionFalse(_)) => Ok(()),
            Err(e) => Err(NetworkError::Dial(format!("{}: {}", peer_id, e))),
        }
    }

    /// Move the service onto its own task
    pub fn spawn(
        self,
        shutdown: CancellationToken,
        redial_interval: Duration,
    ) -> (NetworkHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let handle = NetworkHandle {
            cmd_tx,
            local_peer_id: self.local_peer_id,
        };

        let task = tokio::spawn(self.run(cmd_rx, shutdown, redial_interval));
        (handle, task)
    }

    /// Run the network event loop until shutdown
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<NetworkCommand>,
        shutdown: CancellationToken,
        redial_interval: Duration,
    ) {
        // interval() panics on a zero period
        let redial_interval = redial_interval.max(Duration::from_millis(1));
        let mut maintenance_interval = tokio::time::interval(redial_interval);
        maintenance_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.swarm.select_next_some() => {
                    self.handle_swarm_event(event);
                }
                command = cmd_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = maintenance_interval.tick() => {
                    self.perform_maintenance();
                }
            }
        }

        debug!("Network service for {} stopped", self.local_peer_id);
    }

    fn perform_maintenance(&mut self) {
        let redial = self.peer_manager.peers_to_redial();
        if !redial.is_empty() {
            debug!(
                "Redialing {}/{} static peer(s)",
                redial.len(),
                self.peer_manager.static_peer_count()
            );
        }

        for (peer_id, address) in redial {
            if let Err(e) = self.dial(peer_id, address) {
                debug!("Redial failed: {}", e);
            }
        }
    }

    fn handle_command(&mut self, command: NetworkCommand) {
        match command {
            NetworkCommand::AddPeer {
                peer_id,
                address,
                reply,
            } => {
                let _ = reply.send(self.add_parsed_peer(peer_id, address));
            }
            NetworkCommand::ConnectedPeers(reply) => {
                let _ = reply.send(self.peer_manager.connected_peers());
            }
            NetworkCommand::Publish(message) => {
                self.publish(message);
            }
        }
    }

    fn publish(&mut self, message: NetworkMessage) {
        let data = match message.encode() {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to encode message: {}", e);
                return;
            }
        };

        match self.swarm.behaviour_mut().publish(message.topic(), data) {
            Ok(_) => {}
            // Nobody to gossip to yet
            Err(PublishError::InsufficientPeers) => {}
            Err(e) => warn!("Failed to publish message: {:?}", e),
        }
    }

    /// Handle swarm events
    fn handle_swarm_event(&mut self, event: SwarmEvent<DevnetBehaviourEvent>) {
        match event {
            SwarmEvent::Behaviour(behaviour_event) => {
                self.handle_behaviour_event(behaviour_event);
            }
            SwarmEvent::NewListenAddr { address, .. } => {
                info!("Listening on {}", address);
            }
            SwarmEvent::ConnectionEstablished {
                peer_id,
                num_established,
                ..
            } => {
                if num_established.get() == 1 {
                    self.peer_manager.peer_connected(peer_id);
                    debug!(
                        "Connection established with {} peer {} ({} connected)",
                        if self.peer_manager.is_static(&peer_id) { "static" } else { "inbound" },
                        peer_id,
                        self.peer_manager.connected_count()
                    );
                    let _ = self.event_tx.send(NetworkEvent::PeerConnected(peer_id));
                }
            }
            SwarmEvent::ConnectionClosed {
                peer_id,
                num_established,
                ..
            } => {
                if num_established == 0 {
                    debug!("Connection closed with peer: {}", peer_id);
                    self.peer_manager.peer_disconnected(&peer_id);
                    let _ = self.event_tx.send(NetworkEvent::PeerDisconnected(peer_id));
                }
            }
            SwarmEvent::OutgoingConnectionError { peer_id, error, .. } => {
                // Expected while the other nodes are still starting
                if let Some(peer_id) = peer_id {
                    debug!("Failed to connect to {}: {}", peer_id, error);
                }
            }
            _ => {}
        }
    }

    /// Handle behaviour events
    fn handle_behaviour_event(&mut self, event: DevnetBehaviourEvent) {
        match event {
            DevnetBehaviourEvent::Gossipsub(GossipsubEvent::Message {
                propagation_source,
                message,
                ..
            }) => match NetworkMessage::decode(&message.data) {
                Ok(NetworkMessage::NewBlock(block)) => {
                    let _ = self.event_tx.send(NetworkEvent::BlockReceived {
                        from: propagation_source,
                        block,
                    });
                }
                Err(e) => {
                    warn!("Invalid gossip message from {}: {}", propagation_source, e);
                }
            },
            DevnetBehaviourEvent::Gossipsub(_) | DevnetBehaviourEvent::Ping(_) => {}
        }
    }
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable handle to a running network service
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    cmd_tx: mpsc::UnboundedSender<NetworkCommand>,
    local_peer_id: PeerId,
}

impl NetworkHandle {
    pub fn local_peer_id(&self) -> PeerId {
        self.local_peer_id
    }

    /// Register and dial a peer given as `/ip4/.../tcp/.../p2p/<id>`
    pub async fn add_peer(&self, address: &str) -> Result<(), NetworkError> {
        let (peer_id, address) = parse_peer_address(address)?;
        let (reply, rx) = oneshot::channel();

        self.cmd_tx
            .send(NetworkCommand::AddPeer {
                peer_id,
                address,
                reply,
            })
            .map_err(|_| NetworkError::ServiceStopped)?;

        rx.await.map_err(|_| NetworkError::ServiceStopped)?
    }

    /// Peers with at least one live connection
    pub async fn connected_peers(&self) -> Result<Vec<PeerId>, NetworkError> {
        let (reply, rx) = oneshot::channel();

        self.cmd_tx
            .send(NetworkCommand::ConnectedPeers(reply))
            .map_err(|_| NetworkError::ServiceStopped)?;

        rx.await.map_err(|_| NetworkError::ServiceStopped)
    }

    /// Gossip a message to connected peers
    pub fn publish(&self, message: NetworkMessage) -> Result<(), NetworkError> {
        self.cmd_tx
            .send(NetworkCommand::Publish(message))
            .map_err(|_| NetworkError::ServiceStopped)
    }
}

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Behaviour error: {0}")]
    Behaviour(String),

    #[error("Failed to listen on {0}")]
    Listen(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Dial failed: {0}")]
    Dial(String),

    #[error("Network service stopped")]
    ServiceStopped,
}
