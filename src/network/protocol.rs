// Protocol - Gossip topics and messages for devnet nodes
use serde::{Deserialize, Serialize};

/// Maximum allowed message size for network deserialization
pub const MAX_NETWORK_MESSAGE_SIZE: usize = 64 * 1024;

/// Error type for protocol operations
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

/// Gossip topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GossipTopic {
    /// Synthetic block announcements
    Blocks,
}

impl GossipTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            GossipTopic::Blocks => "/kratos/devnet/blocks/1.0.0",
        }
    }
}

/// Announcement of a synthetic block. Carries no transactions, only enough
/// to let followers track the producer's head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAnnouncement {
    pub number: u64,
    pub hash: [u8; 32],
    pub parent_hash: [u8; 32],
    /// Producer peer ID
    pub author: String,
    /// Unix seconds
    pub timestamp: i64,
}

impl BlockAnnouncement {
    /// Hash over every other field
    pub fn compute_hash(number: u64, parent_hash: &[u8; 32], author: &str, timestamp: i64) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&number.to_le_bytes());
        hasher.update(parent_hash);
        hasher.update(author.as_bytes());
        hasher.update(&timestamp.to_le_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Check the announced hash matches the contents
    pub fn is_consistent(&self) -> bool {
        Self::compute_hash(self.number, &self.parent_hash, &self.author, self.timestamp) == self.hash
    }

    pub fn hash_hex(&self) -> String {
        format!("0x{}", hex::encode(self.hash))
    }
}

/// Network messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NetworkMessage {
    /// New block produced
    NewBlock(BlockAnnouncement),
}

impl NetworkMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(self).map_err(|e| ProtocolError::SerializationFailed(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_NETWORK_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: bytes.len(),
                max: MAX_NETWORK_MESSAGE_SIZE,
            });
        }

        bincode::deserialize(bytes).map_err(|e| ProtocolError::DeserializationFailed(e.to_string()))
    }

    pub fn topic(&self) -> GossipTopic {
        match self {
            NetworkMessage::NewBlock(_) => GossipTopic::Blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announcement(number: u64) -> BlockAnnouncement {
        let parent = [0u8; 32];
        let author = "12D3KooWTest".to_string();
        BlockAnnouncement {
            number,
            hash: BlockAnnouncement::compute_hash(number, &parent, &author, 1_700_000_000),
            parent_hash: parent,
            author,
            timestamp: 1_700_000_000,
        }
    }

    #[test]
    fn test_block_message_decodes() {
        let msg = NetworkMessage::NewBlock(announcement(3));
        let decoded = NetworkMessage::decode(&msg.encode().unwrap()).unwrap();

        let NetworkMessage::NewBlock(block) = decoded;
        assert_eq!(block.number, 3);
        assert!(block.is_consistent());
    }

    #[test]
    fn test_tampered_block_inconsistent() {
        let mut block = announcement(1);
        block.number = 2;
        assert!(!block.is_consistent());
    }

    #[test]
    fn test_oversized_message_rejected() {
        let bytes = vec![0u8; MAX_NETWORK_MESSAGE_SIZE + 1];
        assert!(matches!(
            NetworkMessage::decode(&bytes),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_topic_strings() {
        assert_eq!(GossipTopic::Blocks.as_str(), "/kratos/devnet/blocks/1.0.0");
        assert_eq!(NetworkMessage::NewBlock(announcement(0)).topic(), GossipTopic::Blocks);
    }
}
