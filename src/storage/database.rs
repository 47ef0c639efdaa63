use crate::core::Block;
use crate::{LedgerError, Result};
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;

// Database tree names
const TREE_BLOCKS: &str = "blocks";

/// Ordered block-list snapshot. Blocks are keyed by big-endian index so the
/// tree iterates in chain order. The UTXO set is never stored; it is rebuilt
/// by replaying the blocks.
#[derive(Debug, Clone)]
pub struct Database {
    db: Arc<Db>,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| LedgerError::Storage(format!("Failed to open database: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
        })
    }

    fn get_tree(&self, tree_name: &str) -> Result<Tree> {
        self.db.open_tree(tree_name)
            .map_err(|e| LedgerError::Storage(format!("Failed to open tree {}: {}", tree_name, e)))
    }

    pub fn save_block(&self, block: &Block) -> Result<()> {
        let blocks_tree = self.get_tree(TREE_BLOCKS)?;
        let block_data = bincode::serialize(block)
            .map_err(|e| LedgerError::Storage(format!("Failed to serialize block: {}", e)))?;

        blocks_tree.insert(block.index().to_be_bytes(), block_data)
            .map_err(|e| LedgerError::Storage(format!("Failed to save block: {}", e)))?;
        blocks_tree.flush()?;

        log::debug!("Saved block {} at index {}", block.hash, block.index());
        Ok(())
    }

    /// Every stored block in index order.
    pub fn load_chain(&self) -> Result<Vec<Block>> {
        let blocks_tree = self.get_tree(TREE_BLOCKS)?;
        let mut blocks = Vec::new();

        for item in blocks_tree.iter() {
            let (_, value) = item
                .map_err(|e| LedgerError::Storage(format!("Failed to read block: {}", e)))?;
            blocks.push(Self::decode_block(&value)?);
        }

        Ok(blocks)
    }

    /// Replaces the stored chain with `blocks` as a single batch.
    pub fn replace_chain(&self, blocks: &[Block]) -> Result<()> {
        let blocks_tree = self.get_tree(TREE_BLOCKS)?;

        let mut batch = sled::Batch::default();
        for item in blocks_tree.iter().keys() {
            let key = item.map_err(|e| LedgerError::Storage(format!("Failed to read block key: {}", e)))?;
            batch.remove(key);
        }
        for block in blocks {
            let block_data = bincode::serialize(block)
                .map_err(|e| LedgerError::Storage(format!("Failed to serialize block: {}", e)))?;
            batch.insert(block.index().to_be_bytes().to_vec(), block_data);
        }

        blocks_tree.apply_batch(batch)
            .map_err(|e| LedgerError::Storage(format!("Failed to replace chain: {}", e)))?;
        blocks_tree.flush()?;

        log::debug!("Rewrote snapshot with {} blocks", blocks.len());
        Ok(())
    }

    fn decode_block(data: &[u8]) -> Result<Block> {
        bincode::deserialize(data)
            .map_err(|e| LedgerError::Storage(format!("Failed to deserialize block: {}", e)))
    }
}
