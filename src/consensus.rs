//! Longest-valid-chain consensus
//!
//! Every registered peer is asked for its chain concurrently. A peer chain
//! wins when it is strictly longer than the best seen so far (starting from
//! the local length) and passes validation. Peers that fail, time out or
//! answer with garbage are skipped.

use crate::blockchain::{check_chain, Block, ChainSnapshot};
use crate::miner::PowTarget;
use crate::network::ChainFetcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// The chain selected by [`resolve_longest_chain`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub peer: String,
    pub chain: Vec<Block>,
}

/// Query `peers` and return the longest valid chain that beats `local_len`.
pub async fn resolve_longest_chain(
    local_len: usize,
    peers: Vec<String>,
    fetcher: Arc<dyn ChainFetcher>,
    target: &PowTarget,
    fetch_timeout: Duration,
) -> Option<Resolution> {
    let mut fetches = JoinSet::new();
    for peer in peers {
        let fetcher = fetcher.clone();
        fetches.spawn(async move {
            let outcome = tokio::time::timeout(fetch_timeout, fetcher.fetch_chain(&peer)).await;
            (peer, outcome)
        });
    }

    let mut max_length = local_len;
    let mut winner: Option<Resolution> = None;

    while let Some(joined) = fetches.join_next().await {
        let (peer, outcome) = match joined {
            Ok(result) => result,
            Err(e) => {
                warn!("peer fetch task failed: {}", e);
                continue;
            }
        };

        let snapshot = match outcome {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                warn!(peer = %peer, "skipping peer: {}", e);
                continue;
            }
            Err(_) => {
                warn!(peer = %peer, timeout_ms = fetch_timeout.as_millis() as u64, "skipping peer: fetch timed out");
                continue;
            }
        };

        if let Some(chain) = accept_candidate(&peer, snapshot, max_length, target) {
            max_length = chain.len();
            winner = Some(Resolution { peer, chain });
        }
    }

    winner
}

fn accept_candidate(peer: &str, snapshot: ChainSnapshot, max_length: usize, target: &PowTarget) -> Option<Vec<Block>> {
    if snapshot.length <= max_length {
        debug!(peer, length = snapshot.length, max_length, "peer chain not longer");
        return None;
    }
    if snapshot.length != snapshot.chain.len() {
        warn!(
            peer,
            reported = snapshot.length,
            actual = snapshot.chain.len(),
            "peer reported a length that does not match its chain"
        );
        return None;
    }
    let verdict = check_chain(&snapshot.chain, target);
    if !verdict.is_valid() {
        warn!(peer, ?verdict, "peer chain failed validation");
        return None;
    }
    Some(snapshot.chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Ledger;
    use crate::error::ChainError;
    use crate::miner::solve;
    use crate::network::FetchFuture;
    use std::collections::HashMap;

    /// Serves canned answers; peers missing from the map are unreachable.
    struct StaticFetcher {
        answers: HashMap<String, ChainSnapshot>,
        hang: Vec<String>,
    }

    impl ChainFetcher for StaticFetcher {
        fn fetch_chain<'a>(&'a self, peer: &'a str) -> FetchFuture<'a> {
            Box::pin(async move {
                if self.hang.iter().any(|p| p == peer) {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
                self.answers
                    .get(peer)
                    .cloned()
                    .ok_or_else(|| ChainError::PeerUnreachable(peer.to_string()))
            })
        }
    }

    fn chain_of(len: usize) -> Vec<Block> {
        let mut ledger = Ledger::new();
        while ledger.len() < len {
            let amount = ledger.len() as u64;
            ledger.stage_transaction("A", "B", amount);
            let proof = solve(ledger.last_block().proof, ledger.target());
            ledger.seal_block(proof, None).unwrap();
        }
        ledger.chain().to_vec()
    }

    fn snapshot(chain: Vec<Block>) -> ChainSnapshot {
        ChainSnapshot { length: chain.len(), chain }
    }

    async fn run(local_len: usize, fetcher: StaticFetcher, peers: &[&str]) -> Option<Resolution> {
        tokio::time::timeout(Duration::from_secs(10), async {
            resolve_longest_chain(
                local_len,
                peers.iter().map(|p| p.to_string()).collect(),
                Arc::new(fetcher),
                &PowTarget::default(),
                Duration::from_millis(200),
            )
            .await
        })
        .await
        .expect("resolution timed out")
    }

    fn fetcher(answers: Vec<(&str, ChainSnapshot)>) -> StaticFetcher {
        StaticFetcher {
            answers: answers.into_iter().map(|(p, s)| (p.to_string(), s)).collect(),
            hang: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_adopts_longest_valid_chain() {
        let four = chain_of(4);
        let three = chain_of(3);
        let f = fetcher(vec![("a:1", snapshot(three)), ("b:1", snapshot(four.clone()))]);
        let resolution = run(2, f, &["a:1", "b:1"]).await.unwrap();
        assert_eq!(resolution.peer, "b:1");
        assert_eq!(resolution.chain, four);
    }

    #[tokio::test]
    async fn test_rejects_invalid_longer_chain() {
        let mut five = chain_of(5);
        five[3].previous_hash = "bad".to_string();
        let f = fetcher(vec![("a:1", snapshot(five))]);
        assert_eq!(run(2, f, &["a:1"]).await, None);
    }

    #[tokio::test]
    async fn test_equal_length_never_wins() {
        let f = fetcher(vec![("a:1", snapshot(chain_of(3)))]);
        assert_eq!(run(3, f, &["a:1"]).await, None);
    }

    #[tokio::test]
    async fn test_length_mismatch_rejected() {
        let mut lying = snapshot(chain_of(2));
        lying.length = 9;
        let f = fetcher(vec![("a:1", lying)]);
        assert_eq!(run(1, f, &["a:1"]).await, None);
    }

    #[tokio::test]
    async fn test_unreachable_and_hung_peers_are_skipped() {
        let three = chain_of(3);
        let mut f = fetcher(vec![("good:1", snapshot(three.clone())), ("slow:1", snapshot(chain_of(6)))]);
        f.hang.push("slow:1".to_string());
        let resolution = run(1, f, &["down:1", "slow:1", "good:1"]).await.unwrap();
        assert_eq!(resolution.chain, three);
    }

    #[tokio::test]
    async fn test_no_peers() {
        assert_eq!(run(1, fetcher(Vec::new()), &[]).await, None);
    }
}
