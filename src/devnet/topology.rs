// Topology - Static peer lists for a fully meshed devnet
// Principle: Discovery is disabled, so every node must know every peer up front

use super::identity::NodeIdentity;

/// Give every identity the P2P address of every other identity (full mesh).
///
/// Must run after ports are allocated and before any node is launched.
pub fn build_peer_lists(identities: &mut [NodeIdentity]) {
    let addresses: Vec<String> = identities.iter().map(|i| i.p2p_address()).collect();

    for (index, identity) in identities.iter_mut().enumerate() {
        identity.static_peers = addresses
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != index)
            .map(|(_, addr)| addr.clone())
            .collect();
    }
}

/// Number of directed peer entries across all identities
pub fn connection_count(identities: &[NodeIdentity]) -> usize {
    identities.iter().map(|i| i.static_peers.len()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devnet::identity::{generate_identities, IdentityOptions};
    use proptest::prelude::*;
    use std::path::Path;

    fn identities(count: usize) -> Vec<NodeIdentity> {
        generate_identities(Path::new("/tmp/devnet"), count, &IdentityOptions::default()).unwrap()
    }

    #[test]
    fn test_single_node_has_no_peers() {
        let mut ids = identities(1);
        build_peer_lists(&mut ids);
        assert!(ids[0].static_peers.is_empty());
        assert_eq!(connection_count(&ids), 0);
    }

    #[test]
    fn test_peer_order_follows_identity_order() {
        let mut ids = identities(4);
        build_peer_lists(&mut ids);

        let expected: Vec<String> = [0, 2, 3].iter().map(|i| ids[*i].p2p_address()).collect();
        assert_eq!(ids[1].static_peers, expected);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_full_mesh(count in 1usize..12) {
            let mut ids = identities(count);
            build_peer_lists(&mut ids);

            prop_assert_eq!(connection_count(&ids), count * (count - 1));
            for identity in &ids {
                prop_assert_eq!(identity.static_peers.len(), count - 1);
                prop_assert!(!identity.static_peers.contains(&identity.p2p_address()));
                for other in ids.iter().filter(|o| o.index != identity.index) {
                    prop_assert!(identity.static_peers.contains(&other.p2p_address()));
                }
            }
        }
    }
}
