// Block Producer - Synthetic chain for devnet nodes
//
// Features:
// - Empty blocks chained by hash, one per tick on producer nodes
// - Followers adopt any consistent announcement that extends past their head
// - No transactions, no state, no finality

use crate::network::protocol::BlockAnnouncement;
use crate::rpc::types::ChainHead;
use tracing::debug;

/// Hash of the implicit genesis block
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Result of importing an announced block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportResult {
    /// Block became the new head
    Imported,
    /// Block is at or below the current head
    Stale,
    /// Hash does not match the block contents, or the chain could not grow past it
    Invalid,
}

/// Head of the synthetic chain, plus block production for producer nodes
#[derive(Debug, Clone)]
pub struct BlockProducer {
    author: String,
    number: u64,
    hash: [u8; 32],
}

impl BlockProducer {
    /// Start at genesis; `author` is the local peer ID
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            number: 0,
            hash: GENESIS_HASH,
        }
    }

    pub fn height(&self) -> u64 {
        self.number
    }

    pub fn head(&self) -> ChainHead {
        ChainHead {
            number: self.number,
            hash: format!("0x{}", hex::encode(self.hash)),
        }
    }

    /// Produce the next block on top of the current head.
    /// Returns `None` once the head number is exhausted.
    pub fn produce(&mut self, timestamp: i64) -> Option<BlockAnnouncement> {
        let number = self.number.checked_add(1)?;
        let parent_hash = self.hash;
        let hash = BlockAnnouncement::compute_hash(number, &parent_hash, &self.author, timestamp);

        self.number = number;
        self.hash = hash;

        Some(BlockAnnouncement {
            number,
            hash,
            parent_hash,
            author: self.author.clone(),
            timestamp,
        })
    }

    /// Adopt an announced block if it is consistent and higher than our head
    pub fn import(&mut self, block: &BlockAnnouncement) -> ImportResult {
        // u64::MAX would leave no room for the next block
        if !block.is_consistent() || block.number == u64::MAX {
            return ImportResult::Invalid;
        }

        if block.number <= self.number {
            return ImportResult::Stale;
        }

        debug!(
            "Imported block #{} {} from {}",
            block.number,
            block.hash_hex(),
            block.author
        );
        self.number = block.number;
        self.hash = block.hash;
        ImportResult::Imported
    }
}
