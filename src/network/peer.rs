// Peer - Static peer bookkeeping for devnet nodes
// Principle: Peers are configured, never discovered; keep redialing until connected

use libp2p::{multiaddr::Protocol, Multiaddr, PeerId};
use std::collections::{HashMap, HashSet};

use super::service::NetworkError;

/// Parse a `/ip4/.../tcp/.../p2p/<id>` address into its peer ID and the
/// dialable address without the `/p2p` component
pub fn parse_peer_address(address: &str) -> Result<(PeerId, Multiaddr), NetworkError> {
    let mut multiaddr: Multiaddr = address
        .parse()
        .map_err(|e| NetworkError::InvalidAddress(format!("{}: {}", address, e)))?;

    let peer_id = match multiaddr.pop() {
        Some(Protocol::P2p(peer_id)) => peer_id,
        _ => {
            return Err(NetworkError::InvalidAddress(format!(
                "{}: missing /p2p/<peer id> suffix",
                address
            )))
        }
    };

    if multiaddr.is_empty() {
        return Err(NetworkError::InvalidAddress(format!(
            "{}: missing transport address",
            address
        )));
    }

    Ok((peer_id, multiaddr))
}

/// Tracks configured peers and live connections
#[derive(Debug, Default)]
pub struct PeerManager {
    /// Peers we keep dialing, with their dial address
    static_peers: HashMap<PeerId, Multiaddr>,

    /// Peers with at least one established connection
    connected: HashSet<PeerId>,
}

impl PeerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer to keep connected. Returns false if it was already known
    /// at the same address.
    pub fn add_static_peer(&mut self, peer_id: PeerId, address: Multiaddr) -> bool {
        match self.static_peers.insert(peer_id, address.clone()) {
            Some(previous) => previous != address,
            None => true,
        }
    }

    pub fn is_static(&self, peer_id: &PeerId) -> bool {
        self.static_peers.contains_key(peer_id)
    }

    pub fn static_peer_count(&self) -> usize {
        self.static_peers.len()
    }

    pub fn peer_connected(&mut self, peer_id: PeerId) -> bool {
        self.connected.insert(peer_id)
    }

    pub fn peer_disconnected(&mut self, peer_id: &PeerId) -> bool {
        self.connected.remove(peer_id)
    }

    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    /// Connected peers, sorted for stable output
    pub fn connected_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.connected.iter().copied().collect();
        peers.sort();
        peers
    }

    /// Static peers that currently have no connection
    pub fn peers_to_redial(&self) -> Vec<(PeerId, Multiaddr)> {
        self.static_peers
            .iter()
            .filter(|(peer_id, _)| !self.connected.contains(peer_id))
            .map(|(peer_id, addr)| (*peer_id, addr.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer_address(port: u16) -> (PeerId, String) {
        let peer_id = PeerId::random();
        (peer_id, format!("/ip4/127.0.0.1/tcp/{}/p2p/{}", port, peer_id))
    }

    #[test]
    fn test_parse_peer_address() {
        let (peer_id, address) = peer_address(30333);
        let (parsed_id, dial_addr) = parse_peer_address(&address).unwrap();

        assert_eq!(parsed_id, peer_id);
        assert_eq!(dial_addr.to_string(), "/ip4/127.0.0.1/tcp/30333");
    }

    #[test]
    fn test_parse_rejects_missing_peer_id() {
        assert!(matches!(
            parse_peer_address("/ip4/127.0.0.1/tcp/30333"),
            Err(NetworkError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_peer_address("not-a-multiaddr").is_err());
        assert!(parse_peer_address(&format!("/p2p/{}", PeerId::random())).is_err());
    }

    #[test]
    fn test_redial_only_disconnected() {
        let mut manager = PeerManager::new();
        let (a, addr_a) = peer_address(1000);
        let (b, addr_b) = peer_address(1001);

        for addr in [&addr_a, &addr_b] {
            let (id, dial) = parse_peer_address(addr).unwrap();
            assert!(manager.add_static_peer(id, dial));
        }

        assert_eq!(manager.peers_to_redial().len(), 2);

        manager.peer_connected(a);
        let redial = manager.peers_to_redial();
        assert_eq!(redial.len(), 1);
        assert_eq!(redial[0].0, b);

        manager.peer_disconnected(&a);
        assert_eq!(manager.peers_to_redial().len(), 2);
    }

    #[test]
    fn test_re_adding_same_peer_is_noop() {
        let mut manager = PeerManager::new();
        let (_, address) = peer_address(1000);
        let (id, dial) = parse_peer_address(&address).unwrap();

        assert!(manager.add_static_peer(id, dial.clone()));
        assert!(!manager.add_static_peer(id, dial));
        assert_eq!(manager.static_peer_count(), 1);
    }

    #[test]
    fn test_connected_count_includes_non_static() {
        let mut manager = PeerManager::new();
        let inbound = PeerId::random();

        assert!(manager.peer_connected(inbound));
        assert!(!manager.peer_connected(inbound));
        assert_eq!(manager.connected_count(), 1);
        assert!(!manager.is_static(&inbound));
        assert_eq!(manager.connected_peers(), vec![inbound]);
    }
}
