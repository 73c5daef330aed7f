use crate::blockchain::core::validation::is_valid_chain;
use crate::crypto::hash_block;
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::miner::PowTarget;
use crate::transaction::Transaction;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use tracing::info;

/// `previous_hash` carried by the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str = "1";
/// Proof carried by the genesis block.
pub const GENESIS_PROOF: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Block {
    pub index: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub transactions: Vec<Transaction>,
    pub proof: u64,
    pub previous_hash: String,
}

impl Block {
    /// Hex SHA-256 over the canonical serialization of every field.
    pub fn hash(&self) -> Result<String> {
        hash_block(self)
    }
}

/// Read-only copy of a chain, also the body of `GET /chain`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub length: usize,
    pub chain: Vec<Block>,
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// The block sequence plus the pool of transactions waiting for the next block.
///
/// Blocks only enter the chain through [`Ledger::seal_block`], or all at once
/// through [`Ledger::replace_chain`]. The chain always holds the genesis block.
#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    mempool: Mempool,
    target: PowTarget,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Create a ledger using the reference puzzle target.
    pub fn new() -> Self {
        Self::with_target(PowTarget::default())
    }

    pub fn with_target(target: PowTarget) -> Self {
        let mut ledger = Ledger {
            chain: Vec::new(),
            mempool: Mempool::new(),
            target,
        };
        ledger.append_block(GENESIS_PROOF, GENESIS_PREVIOUS_HASH.to_string());
        ledger
    }

    pub fn target(&self) -> &PowTarget {
        &self.target
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Never true: the chain always holds the genesis block.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn pending(&self) -> &[Transaction] {
        self.mempool.get_all_transactions()
    }

    pub fn last_block(&self) -> &Block {
        self.chain
            .last()
            .expect("ledger invariant: chain always holds the genesis block")
    }

    /// Stage a transfer; returns the index of the block that will carry it.
    pub fn stage_transaction(
        &mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: impl Into<Number>,
    ) -> u64 {
        self.add_transaction(Transaction::new(sender, recipient, amount))
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> u64 {
        self.mempool.add_transaction(tx);
        self.last_block().index + 1
    }

    /// Seal the pending pool into a new block and append it.
    ///
    /// `previous_hash` defaults to the digest of the current last block.
    pub fn seal_block(&mut self, proof: u64, previous_hash: Option<String>) -> Result<Block> {
        let previous_hash = match previous_hash {
            Some(hash) => hash,
            None => self.last_block().hash()?,
        };
        let block = self.append_block(proof, previous_hash);
        info!(
            index = block.index,
            proof = block.proof,
            transactions = block.transactions.len(),
            "sealed block"
        );
        Ok(block)
    }

    fn append_block(&mut self, proof: u64, previous_hash: String) -> Block {
        let block = Block {
            index: self.chain.len() as u64 + 1,
            timestamp: now_seconds(),
            transactions: self.mempool.take_all(),
            proof,
            previous_hash,
        };
        self.chain.push(block.clone());
        block
    }

    /// Swap in a whole new chain. The caller has already validated it and
    /// checked that it is strictly longer.
    pub fn replace_chain(&mut self, candidate: Vec<Block>) -> Result<()> {
        if candidate.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        info!(old_length = self.chain.len(), new_length = candidate.len(), "replacing chain");
        self.chain = candidate;
        Ok(())
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            length: self.chain.len(),
            chain: self.chain.clone(),
        }
    }

    /// Validate the ledger's own chain.
    pub fn is_valid(&self) -> bool {
        is_valid_chain(&self.chain, &self.target)
    }
}
