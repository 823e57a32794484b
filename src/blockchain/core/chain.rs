use crate::crypto::{digest_block, HexDigest};
use crate::error::ChainError;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};

/// `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "1";
/// Proof carried by the genesis block; the first mined block solves against it.
pub const GENESIS_PROOF: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// 1-based position in the chain.
    pub index: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: HexDigest,
}

impl Block {
    pub fn hash(&self) -> Result<HexDigest, ChainError> {
        digest_block(self)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 1
    }
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// The ordered block sequence plus the pool of transactions awaiting a block.
///
/// Never empty: construction seals the genesis block, and `replace_chain`
/// refuses an empty replacement.
#[derive(Debug, Clone)]
pub struct Blockchain {
    blocks: Vec<Block>,
    pending: Vec<Transaction>,
}

impl Default for Blockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl Blockchain {
    /// Create a ledger holding only the genesis block.
    pub fn new() -> Self {
        let mut blockchain = Blockchain {
            blocks: Vec::new(),
            pending: Vec::new(),
        };
        blockchain.seal(GENESIS_PROOF, GENESIS_PREVIOUS_HASH.to_string());
        blockchain
    }

    /// Queue a transaction; returns the index of the block that will contain it.
    pub fn new_transaction(&mut self, transaction: Transaction) -> Result<u64, ChainError> {
        let next_index = self.last_block()?.index + 1;
        self.pending.push(transaction);
        Ok(next_index)
    }

    /// Seal the pending pool into a new block and append it.
    ///
    /// Without an explicit `previous_hash` the digest of the current last block is used.
    pub fn new_block(
        &mut self,
        proof: u64,
        previous_hash: Option<HexDigest>,
    ) -> Result<Block, ChainError> {
        let previous_hash = match previous_hash {
            Some(hash) => hash,
            None => self.last_block()?.hash()?,
        };
        Ok(self.seal(proof, previous_hash))
    }

    fn seal(&mut self, proof: u64, previous_hash: HexDigest) -> Block {
        let block = Block {
            index: self.blocks.len() as u64 + 1,
            timestamp: now_seconds(),
            transactions: std::mem::take(&mut self.pending),
            proof,
            previous_hash,
        };
        self.blocks.push(block.clone());
        block
    }

    pub fn last_block(&self) -> Result<&Block, ChainError> {
        self.blocks.last().ok_or(ChainError::EmptyChain)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn pending_transactions(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Swap in a whole chain. The caller is responsible for having validated it.
    ///
    /// The pending pool is left untouched.
    pub fn replace_chain(&mut self, blocks: Vec<Block>) -> Result<(), ChainError> {
        if blocks.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        self.blocks = blocks;
        Ok(())
    }
}
