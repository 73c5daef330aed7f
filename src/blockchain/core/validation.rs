use crate::blockchain::core::chain::Block;
use crate::miner::{valid_proof, PowTarget};
use tracing::warn;

/// Outcome of walking a candidate chain. Malformed chains are a normal
/// result here, not an error, so callers can simply ignore the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainVerdict {
    Valid,
    /// No genesis block at all.
    Empty,
    /// `index` does not follow its predecessor's.
    IndexMismatch { position: usize },
    /// `previous_hash` is not the digest of the predecessor.
    BrokenLinkage { position: usize },
    /// `proof` does not solve the puzzle posed by the predecessor's proof.
    InvalidProof { position: usize },
}

impl ChainVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, ChainVerdict::Valid)
    }
}

/// Check index continuity, hash linkage and proof of work for every adjacent
/// pair. Stops at the first violation.
pub fn check_chain(chain: &[Block], target: &PowTarget) -> ChainVerdict {
    if chain.is_empty() {
        warn!("rejecting empty chain: a chain must contain the genesis block");
        return ChainVerdict::Empty;
    }

    for (position, pair) in chain.windows(2).enumerate().map(|(i, w)| (i + 1, w)) {
        let (prev, block) = (&pair[0], &pair[1]);

        if block.index != prev.index.wrapping_add(1) {
            return ChainVerdict::IndexMismatch { position };
        }

        match prev.hash() {
            Ok(hash) if hash == block.previous_hash => {}
            _ => return ChainVerdict::BrokenLinkage { position },
        }

        if !valid_proof(prev.proof, block.proof, target) {
            return ChainVerdict::InvalidProof { position };
        }
    }

    ChainVerdict::Valid
}

pub fn is_valid_chain(chain: &[Block], target: &PowTarget) -> bool {
    check_chain(chain, target).is_valid()
}
