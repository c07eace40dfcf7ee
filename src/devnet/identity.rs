// Identity - Per-node keys, ports and directories for a devnet
// Principle: Everything a node needs to start is decided before any node starts

use super::ports::{allocate_port, AllocationError};
use ed25519_dalek::SigningKey;
use libp2p::{identity::Keypair, PeerId};
use rand::rngs::OsRng;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

/// Identity and configuration of one devnet node
#[derive(Clone)]
pub struct NodeIdentity {
    /// Position in launch order
    pub index: usize,
    /// Peer ID derived from the node's public key
    pub id: PeerId,
    /// Node private key (also the libp2p identity)
    pub signing_key: SigningKey,
    /// Exclusive data directory
    pub data_dir: PathBuf,
    /// P2P listen port
    pub p2p_port: u16,
    /// Query (JSON-RPC) port
    pub rpc_port: u16,
    /// Authenticated control port
    pub control_port: Option<u16>,
    /// Whether this node produces blocks
    pub is_producer: bool,
    /// Multiaddrs of every other node, filled by the topology builder
    pub static_peers: Vec<String>,
    /// Control channel secret file
    pub control_secret_path: Option<PathBuf>,
}

impl NodeIdentity {
    /// Multiaddr other nodes dial to reach this one
    pub fn p2p_address(&self) -> String {
        format!("/ip4/127.0.0.1/tcp/{}/p2p/{}", self.p2p_port, self.id)
    }

    /// Multiaddr this node listens on
    pub fn listen_address(&self) -> String {
        format!("/ip4/127.0.0.1/tcp/{}", self.p2p_port)
    }

    pub fn rpc_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.rpc_port))
    }

    pub fn control_addr(&self) -> Option<SocketAddr> {
        self.control_port
            .map(|port| SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    /// libp2p keypair built from the node's secret key
    pub fn keypair(&self) -> Result<Keypair, AllocationError> {
        keypair_from_signing_key(&self.signing_key)
    }
}

impl fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("data_dir", &self.data_dir)
            .field("p2p_port", &self.p2p_port)
            .field("rpc_port", &self.rpc_port)
            .field("control_port", &self.control_port)
            .field("is_producer", &self.is_producer)
            .field("static_peers", &self.static_peers)
            .field("control_secret_path", &self.control_secret_path)
            .finish_non_exhaustive()
    }
}

/// Options that shape identity generation
#[derive(Debug, Clone, Default)]
pub struct IdentityOptions {
    /// Reserve a control port for every node
    pub enable_control: bool,
    /// Indexes of nodes that produce blocks
    pub producers: Vec<usize>,
}

fn keypair_from_signing_key(signing_key: &SigningKey) -> Result<Keypair, AllocationError> {
    Keypair::ed25519_from_bytes(signing_key.to_bytes())
        .map_err(|e| AllocationError::Key(format!("Invalid ed25519 key: {}", e)))
}

/// Generate `count` identities with fresh keys and unique ports
pub fn generate_identities(
    base_dir: &Path,
    count: usize,
    options: &IdentityOptions,
) -> Result<Vec<NodeIdentity>, AllocationError> {
    let mut identities = Vec::with_capacity(count);

    for index in 0..count {
        let signing_key = SigningKey::generate(&mut OsRng);
        let id = PeerId::from(keypair_from_signing_key(&signing_key)?.public());

        let p2p_port = allocate_port()?;
        let rpc_port = allocate_port()?;
        let control_port = if options.enable_control {
            Some(allocate_port()?)
        } else {
            None
        };

        identities.push(NodeIdentity {
            index,
            id,
            signing_key,
            data_dir: base_dir.join(format!("node-{}", index)),
            p2p_port,
            rpc_port,
            control_port,
            is_producer: options.producers.contains(&index),
            static_peers: Vec::new(),
            control_secret_path: None,
        });
    }

    Ok(identities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identities_are_unique() {
        let options = IdentityOptions {
            enable_control: true,
            producers: vec![0],
        };
        let ids = generate_identities(Path::new("/tmp/devnet"), 5, &options).unwrap();

        let peer_ids: HashSet<_> = ids.iter().map(|i| i.id).collect();
        assert_eq!(peer_ids.len(), 5);

        let mut ports = HashSet::new();
        for identity in &ids {
            assert!(ports.insert(identity.p2p_port));
            assert!(ports.insert(identity.rpc_port));
            assert!(ports.insert(identity.control_port.unwrap()));
        }
        assert_eq!(ports.len(), 15);
    }

    #[test]
    fn test_peer_id_matches_keypair() {
        let ids = generate_identities(Path::new("/tmp/devnet"), 1, &IdentityOptions::default()).unwrap();
        let identity = &ids[0];
        let keypair = identity.keypair().unwrap();
        assert_eq!(PeerId::from(keypair.public()), identity.id);
    }

    #[test]
    fn test_producer_flags_and_dirs() {
        let options = IdentityOptions {
            enable_control: false,
            producers: vec![1],
        };
        let ids = generate_identities(Path::new("/data"), 3, &options).unwrap();

        assert!(!ids[0].is_producer);
        assert!(ids[1].is_producer);
        assert!(!ids[2].is_producer);
        assert!(ids.iter().all(|i| i.control_port.is_none()));
        assert_eq!(ids[2].data_dir, PathBuf::from("/data/node-2"));
    }

    #[test]
    fn test_p2p_address_format() {
        let ids = generate_identities(Path::new("/tmp"), 1, &IdentityOptions::default()).unwrap();
        let addr = ids[0].p2p_address();
        assert!(addr.starts_with(&format!("/ip4/127.0.0.1/tcp/{}/p2p/", ids[0].p2p_port)));
        assert!(addr.ends_with(&ids[0].id.to_string()));
        assert!(addr.parse::<libp2p::Multiaddr>().is_ok());
    }

    #[test]
    fn test_debug_hides_key() {
        let ids = generate_identities(Path::new("/tmp"), 1, &IdentityOptions::default()).unwrap();
        let secret = hex::encode(ids[0].signing_key.to_bytes());
        let printed = format!("{:?}", ids[0]);
        assert!(!printed.contains(&secret));
    }
}
