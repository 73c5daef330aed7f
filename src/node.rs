//! Node composition root
//!
//! Owns the ledger, the peer registry and the peer fetcher, and exposes the
//! operations the service layer calls. Every ledger mutation runs under the
//! write half of one `RwLock`; proof search and peer fetching run with no
//! lock held.

use crate::blockchain::{Block, ChainSnapshot, Ledger};
use crate::config::Config;
use crate::consensus::resolve_longest_chain;
use crate::error::{ChainError, Result};
use crate::miner::{solve_parallel, PowTarget};
use crate::network::{ChainFetcher, HttpChainFetcher, NodeRegistry};
use crate::transaction::Transaction;
use serde_json::Number;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

/// Sender used for mining reward transactions.
pub const REWARD_SENDER: &str = "0";

pub struct Node {
    ledger: Arc<RwLock<Ledger>>,
    registry: NodeRegistry,
    fetcher: Arc<dyn ChainFetcher>,
    target: PowTarget,
    threads: usize,
    peer_timeout: Duration,
    reward: i64,
    identifier: String,
    /// Bumped whenever the chain tip changes; in-flight proof searches abort
    /// when it moves.
    tip_epoch: Arc<AtomicU64>,
    /// Proof searches currently running on the blocking pool.
    active_searches: Arc<AtomicUsize>,
}

/// Raises its flag when dropped, so a blocking search outlives no caller.
#[derive(Default)]
struct CancelOnDrop(Arc<AtomicBool>);

impl CancelOnDrop {
    fn flag(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Node {
    /// Build a node that fetches peer chains over HTTP.
    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = HttpChainFetcher::new(config.peer_timeout()?)?;
        Self::with_fetcher(config, Arc::new(fetcher))
    }

    pub fn with_fetcher(config: &Config, fetcher: Arc<dyn ChainFetcher>) -> Result<Self> {
        config.validate()?;
        let target = config.pow_target()?;
        let identifier = if config.miner.node_identifier.is_empty() {
            hex::encode(rand::random::<[u8; 16]>())
        } else {
            config.miner.node_identifier.clone()
        };

        let node = Self {
            ledger: Arc::new(RwLock::new(Ledger::with_target(target.clone()))),
            registry: NodeRegistry::new(),
            fetcher,
            target,
            threads: config.miner.threads,
            peer_timeout: config.peer_timeout()?,
            reward: config.miner.reward,
            identifier,
            tip_epoch: Arc::new(AtomicU64::new(0)),
            active_searches: Arc::new(AtomicUsize::new(0)),
        };

        for peer in &config.network.bootstrap_peers {
            if let Err(e) = node.register_peer(peer) {
                warn!(peer = %peer, "ignoring bootstrap peer: {}", e);
            }
        }

        info!(
            node_id = %node.identifier,
            difficulty = %node.target,
            peers = node.registry.len(),
            "node initialised"
        );
        Ok(node)
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn target(&self) -> &PowTarget {
        &self.target
    }

    /// Stage a transaction; returns the index of the block that will hold it.
    pub async fn stage_transaction(
        &self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: impl Into<Number>,
    ) -> u64 {
        self.submit_transaction(Transaction::new(sender, recipient, amount)).await
    }

    pub async fn submit_transaction(&self, tx: Transaction) -> u64 {
        self.ledger.write().await.add_transaction(tx)
    }

    pub async fn pending_transactions(&self) -> Vec<Transaction> {
        self.ledger.read().await.pending().to_vec()
    }

    /// Solve the puzzle against the current tip and seal the pending pool.
    ///
    /// If the tip moves while searching (another block sealed, or the chain
    /// replaced by consensus) the search is abandoned and restarted on the
    /// new tip. Dropping the returned future stops the search.
    pub async fn mine(&self) -> Result<Block> {
        let cancel = CancelOnDrop::default();
        loop {
            let (last_proof, tip_hash, epoch) = self.current_tip().await?;

            let proof = self
                .search_proof(last_proof, self.target.clone(), epoch, cancel.flag())
                .await?;
            let Some(proof) = proof else {
                info!(last_proof, "tip moved during proof search, restarting");
                continue;
            };

            match self.seal_if_tip(proof, tip_hash).await? {
                Some(block) => return Ok(block),
                None => info!(last_proof, "tip moved before sealing, restarting"),
            }
        }
    }

    /// Proof and hash of the tip, with the epoch they were read at.
    async fn current_tip(&self) -> Result<(u64, String, u64)> {
        let ledger = self.ledger.read().await;
        let last = ledger.last_block();
        Ok((last.proof, last.hash()?, self.tip_epoch.load(Ordering::SeqCst)))
    }

    /// Run the proof search off the async runtime.
    ///
    /// Returns `None` once the tip epoch moves past `epoch` or `cancelled`
    /// is set.
    async fn search_proof(
        &self,
        last_proof: u64,
        target: PowTarget,
        epoch: u64,
        cancelled: Arc<AtomicBool>,
    ) -> Result<Option<u64>> {
        let threads = self.threads;
        let tip_epoch = self.tip_epoch.clone();
        let active = self.active_searches.clone();
        tokio::task::spawn_blocking(move || {
            active.fetch_add(1, Ordering::SeqCst);
            let proof = solve_parallel(last_proof, &target, threads, || {
                cancelled.load(Ordering::SeqCst) || tip_epoch.load(Ordering::SeqCst) != epoch
            });
            active.fetch_sub(1, Ordering::SeqCst);
            proof
        })
        .await
        .map_err(|e| {
            error!("proof search task failed: {}", e);
            ChainError::MiningAborted
        })
    }

    /// Seal the pending pool with `proof` unless the tip is no longer `tip_hash`.
    async fn seal_if_tip(&self, proof: u64, tip_hash: String) -> Result<Option<Block>> {
        let mut ledger = self.ledger.write().await;
        if ledger.last_block().hash()? != tip_hash {
            return Ok(None);
        }
        let block = ledger.seal_block(proof, Some(tip_hash))?;
        self.tip_epoch.fetch_add(1, Ordering::SeqCst);
        Ok(Some(block))
    }

    /// Stage the reward transaction for this node, then mine.
    pub async fn mine_with_reward(&self) -> Result<Block> {
        self.stage_transaction(REWARD_SENDER, self.identifier.clone(), self.reward)
            .await;
        self.mine().await
    }

    pub async fn chain_snapshot(&self) -> ChainSnapshot {
        self.ledger.read().await.snapshot()
    }

    pub async fn chain_length(&self) -> usize {
        self.ledger.read().await.len()
    }

    pub async fn is_chain_valid(&self) -> bool {
        self.ledger.read().await.is_valid()
    }

    pub fn register_peer(&self, address: &str) -> Result<String> {
        self.registry.register(address)
    }

    pub fn peers(&self) -> Vec<String> {
        self.registry.list_peers()
    }

    /// Adopt the longest valid peer chain if one is strictly longer than ours.
    ///
    /// Peers are queried without holding the ledger lock; only the final swap
    /// is exclusive.
    pub async fn resolve_consensus(&self) -> bool {
        let local_len = self.chain_length().await;
        let resolution = resolve_longest_chain(
            local_len,
            self.registry.list_peers(),
            self.fetcher.clone(),
            &self.target,
            self.peer_timeout,
        )
        .await;

        let Some(resolution) = resolution else {
            info!(length = local_len, "local chain is authoritative");
            return false;
        };

        let mut ledger = self.ledger.write().await;
        if resolution.chain.len() <= ledger.len() {
            info!(
                peer = %resolution.peer,
                local = ledger.len(),
                candidate = resolution.chain.len(),
                "local chain grew during resolution, keeping it"
            );
            return false;
        }
        match ledger.replace_chain(resolution.chain) {
            Ok(()) => {
                self.tip_epoch.fetch_add(1, Ordering::SeqCst);
                info!(peer = %resolution.peer, length = ledger.len(), "adopted peer chain");
                true
            }
            Err(e) => {
                error!(peer = %resolution.peer, "chain replacement failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::{solve, valid_proof};
    use crate::network::FetchFuture;
    use std::collections::HashMap;

    struct MapFetcher(HashMap<String, ChainSnapshot>);

    impl ChainFetcher for MapFetcher {
        fn fetch_chain<'a>(&'a self, peer: &'a str) -> FetchFuture<'a> {
            Box::pin(async move {
                self.0
                    .get(peer)
                    .cloned()
                    .ok_or_else(|| ChainError::PeerUnreachable(peer.to_string()))
            })
        }
    }

    fn node_with(peers: Vec<(&str, ChainSnapshot)>) -> Node {
        let mut config = Config::default();
        config.miner.node_identifier = "miner-1".to_string();
        config.network.peer_timeout = "1s".to_string();
        let answers = peers
            .iter()
            .map(|(p, s)| (p.to_string(), s.clone()))
            .collect();
        let node = Node::with_fetcher(&config, Arc::new(MapFetcher(answers))).unwrap();
        for (peer, _) in peers {
            node.register_peer(peer).unwrap();
        }
        node
    }

    fn peer_chain(len: usize) -> ChainSnapshot {
        let mut ledger = Ledger::new();
        while ledger.len() < len {
            ledger.stage_transaction("P", "Q", 3);
            let proof = solve(ledger.last_block().proof, ledger.target());
            ledger.seal_block(proof, None).unwrap();
        }
        ledger.snapshot()
    }

    #[tokio::test]
    async fn test_mine_two_transactions() {
        let node = node_with(Vec::new());
        let genesis = node.chain_snapshot().await.chain[0].clone();

        assert_eq!(node.stage_transaction("A", "B", 10).await, 2);
        assert_eq!(node.stage_transaction("B", "C", 5).await, 2);
        let block = node.mine().await.unwrap();

        let snapshot = node.chain_snapshot().await;
        assert_eq!(snapshot.length, 2);
        assert_eq!(
            snapshot.chain[1].transactions,
            vec![Transaction::new("A", "B", 10), Transaction::new("B", "C", 5)]
        );
        assert_eq!(block.previous_hash, genesis.hash().unwrap());
        assert!(valid_proof(100, block.proof, node.target()));
        assert!(node.pending_transactions().await.is_empty());
        assert!(node.is_chain_valid().await);
    }

    #[tokio::test]
    async fn test_mine_with_reward() {
        let node = node_with(Vec::new());
        let block = node.mine_with_reward().await.unwrap();
        assert_eq!(block.transactions, vec![Transaction::new("0", "miner-1", 1)]);
    }

    #[tokio::test]
    async fn test_resolve_rejects_invalid_longer_chain() {
        let mut five = peer_chain(5);
        five.chain[3].previous_hash = "0".repeat(64);
        let node = node_with(vec![("10.0.0.1:5000", five)]);
        node.mine().await.unwrap();
        let before = node.chain_snapshot().await;

        assert!(!node.resolve_consensus().await);
        assert_eq!(node.chain_snapshot().await, before);
    }

    #[tokio::test]
    async fn test_resolve_adopts_longer_valid_chain() {
        let four = peer_chain(4);
        let node = node_with(vec![("10.0.0.1:5000", four.clone())]);
        node.mine().await.unwrap();

        assert!(node.resolve_consensus().await);
        assert_eq!(node.chain_snapshot().await, four);
        // Mining continues on top of the adopted chain.
        let block = node.mine().await.unwrap();
        assert_eq!(block.index, 5);
        assert!(node.is_chain_valid().await);
    }

    #[tokio::test]
    async fn test_resolve_keeps_chain_when_peers_unreachable() {
        let node = node_with(Vec::new());
        node.register_peer("http://10.255.255.1:5000").unwrap();
        assert!(!node.resolve_consensus().await);
        assert_eq!(node.chain_length().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_staging_and_mining_lose_nothing() {
        let node = Arc::new(node_with(Vec::new()));
        let mut tasks = Vec::new();
        for i in 0..50i64 {
            let node = node.clone();
            tasks.push(tokio::spawn(async move {
                node.stage_transaction(format!("s{}", i), "r", i).await;
            }));
        }
        for _ in 0..3 {
            let node = node.clone();
            tasks.push(tokio::spawn(async move {
                node.mine().await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let snapshot = node.chain_snapshot().await;
        assert_eq!(snapshot.length, 4);
        let sealed: usize = snapshot.chain.iter().map(|b| b.transactions.len()).sum();
        assert_eq!(sealed + node.pending_transactions().await.len(), 50);
        assert!(node.is_chain_valid().await);
    }

    #[tokio::test]
    async fn test_search_abandoned_when_consensus_replaces_tip() {
        let four = peer_chain(4);
        let node = Arc::new(node_with(vec![("10.0.0.1:5000", four.clone())]));
        let (last_proof, _, epoch) = node.current_tip().await.unwrap();
        // No digest starts with 64 zeros: only a tip change ends this search.
        let unsolvable = PowTarget::new(&"0".repeat(64)).unwrap();
        let search = {
            let node = node.clone();
            tokio::spawn(async move {
                node.search_proof(last_proof, unsolvable, epoch, Arc::new(AtomicBool::new(false)))
                    .await
            })
        };

        assert!(node.resolve_consensus().await);
        let outcome = tokio::time::timeout(Duration::from_secs(5), search)
            .await
            .expect("search ignored the tip change")
            .unwrap()
            .unwrap();
        assert_eq!(outcome, None);

        let block = node.mine().await.unwrap();
        assert_eq!(block.index, four.length as u64 + 1);
        assert_eq!(block.previous_hash, four.chain[3].hash().unwrap());
        assert!(node.is_chain_valid().await);
    }

    #[tokio::test]
    async fn test_proof_discarded_when_tip_replaced_before_sealing() {
        let four = peer_chain(4);
        let node = node_with(vec![("10.0.0.1:5000", four.clone())]);
        node.stage_transaction("A", "B", 10).await;
        let (last_proof, tip_hash, _) = node.current_tip().await.unwrap();
        let proof = solve(last_proof, node.target());

        assert!(node.resolve_consensus().await);
        assert_eq!(node.seal_if_tip(proof, tip_hash).await.unwrap(), None);
        assert_eq!(node.chain_snapshot().await, four);

        let block = node.mine().await.unwrap();
        assert_eq!(block.index, four.length as u64 + 1);
        assert_eq!(block.previous_hash, four.chain[3].hash().unwrap());
        assert_eq!(block.transactions, vec![Transaction::new("A", "B", 10)]);
        assert!(node.is_chain_valid().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_mine_stops_its_search() {
        let mut config = Config::default();
        config.miner.difficulty_prefix = "0".repeat(64);
        let node = Arc::new(Node::with_fetcher(&config, Arc::new(MapFetcher(HashMap::new()))).unwrap());

        let mining = {
            let node = node.clone();
            tokio::spawn(async move { node.mine().await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while node.active_searches.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("proof search never started");

        mining.abort();
        assert!(mining.await.unwrap_err().is_cancelled());
        tokio::time::timeout(Duration::from_secs(5), async {
            while node.active_searches.load(Ordering::SeqCst) != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("proof search kept running after mine was dropped");
        assert_eq!(node.chain_length().await, 1);
    }
}
