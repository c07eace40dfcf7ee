// Behaviour - Network behaviour for devnet nodes using libp2p
// Principle: Gossip for block announcements, ping for liveness, no discovery

use libp2p::{
    gossipsub::{self, IdentTopic, MessageAuthenticity, ValidationMode},
    identity::Keypair,
    ping,
    swarm::NetworkBehaviour,
};
use std::time::Duration;

use super::protocol::GossipTopic;

/// Maximum message size for gossipsub
pub const MAX_GOSSIP_MESSAGE_SIZE: usize = 64 * 1024;

/// Gossipsub heartbeat
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

/// Network behaviour for devnet nodes.
///
/// There is deliberately no Kademlia or mDNS here: a node only ever talks to
/// the peers it was told about.
#[derive(NetworkBehaviour)]
pub struct DevnetBehaviour {
    /// Gossipsub for block propagation
    pub gossipsub: gossipsub::Behaviour,

    /// Ping for connection liveness
    pub ping: ping::Behaviour,
}

impl DevnetBehaviour {
    pub fn new(keypair: &Keypair) -> Result<Self, String> {
        let gossipsub_config = gossipsub::ConfigBuilder::default()
            .heartbeat_interval(HEARTBEAT_INTERVAL)
            .validation_mode(ValidationMode::Strict)
            .max_transmit_size(MAX_GOSSIP_MESSAGE_SIZE)
            .build()
            .map_err(|e| format!("Invalid gossipsub config: {}", e))?;

        let mut gossipsub = gossipsub::Behaviour::new(
            MessageAuthenticity::Signed(keypair.clone()),
            gossipsub_config,
        )
        .map_err(|e| format!("Failed to create gossipsub: {}", e))?;

        gossipsub
            .subscribe(&IdentTopic::new(GossipTopic::Blocks.as_str()))
            .map_err(|e| format!("Failed to subscribe: {:?}", e))?;

        Ok(Self {
            gossipsub,
            ping: ping::Behaviour::new(ping::Config::new()),
        })
    }

    /// Publish a message to a topic
    pub fn publish(
        &mut self,
        topic: GossipTopic,
        data: Vec<u8>,
    ) -> Result<gossipsub::MessageId, gossipsub::PublishError> {
        self.gossipsub.publish(IdentTopic::new(topic.as_str()), data)
    }
}
