//! Proof-of-work puzzle
//!
//! A proof `p` is valid against the previous block's proof `q` when the
//! SHA-256 hex digest of the decimal text `"{q}{p}"` starts with the
//! configured [`PowTarget`] prefix. The search always yields the smallest
//! valid proof, whether it runs sequentially or on the rayon pool.

use crate::crypto::sha256_hex;
use crate::error::{ChainError, Result};
use rayon::prelude::*;
use std::fmt;
use std::time::Instant;
use tracing::debug;

/// Reference puzzle target: the digest must start with a single `5` nibble.
pub const DEFAULT_TARGET_PREFIX: &str = "5";

/// Candidates examined per thread before the abort flag is polled again.
const BATCH_PER_THREAD: u64 = 4_096;

/// Hex prefix a proof digest has to start with.
///
/// The comparison length is the prefix length, so `""` accepts every proof
/// and each additional nibble makes the puzzle sixteen times harder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowTarget {
    prefix: String,
}

impl PowTarget {
    pub fn new(prefix: &str) -> Result<Self> {
        if !prefix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
            return Err(ChainError::Config(format!(
                "difficulty prefix must be lowercase hex, got {:?}",
                prefix
            )));
        }
        if prefix.len() > 64 {
            return Err(ChainError::Config(format!(
                "difficulty prefix longer than a SHA-256 digest: {} nibbles",
                prefix.len()
            )));
        }
        Ok(Self { prefix: prefix.to_string() })
    }

    /// Accepts every proof. Keeps test runtime bounded.
    pub fn trivial() -> Self {
        Self { prefix: String::new() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_met_by(&self, digest: &str) -> bool {
        digest.starts_with(&self.prefix)
    }
}

impl Default for PowTarget {
    fn default() -> Self {
        Self { prefix: DEFAULT_TARGET_PREFIX.to_string() }
    }
}

impl fmt::Display for PowTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.prefix)
    }
}

/// Checks whether `proof` solves the puzzle posed by `last_proof`.
pub fn valid_proof(last_proof: u64, proof: u64, target: &PowTarget) -> bool {
    let guess = format!("{}{}", last_proof, proof);
    target.is_met_by(&sha256_hex(guess.as_bytes()))
}

/// Sequential search: returns the smallest proof valid against `last_proof`.
pub fn solve(last_proof: u64, target: &PowTarget) -> u64 {
    let mut proof = 0u64;
    while !valid_proof(last_proof, proof, target) {
        proof += 1;
    }
    proof
}

/// Parallel search over consecutive batches.
///
/// Each batch is scanned with an ordered `find_first`, so the returned proof
/// is the same minimum [`solve`] finds. `should_abort` is polled between
/// batches; returns `None` once it reports true.
pub fn solve_parallel<F>(last_proof: u64, target: &PowTarget, threads: usize, should_abort: F) -> Option<u64>
where
    F: Fn() -> bool + Sync,
{
    let started = Instant::now();
    let workers = if threads == 0 { rayon::current_num_threads() } else { threads };
    let batch = BATCH_PER_THREAD * workers.max(1) as u64;

    let pool = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool,
        Err(e) => {
            debug!("rayon pool unavailable ({}), falling back to the global pool", e);
            return search_batches(last_proof, target, batch, &should_abort, started);
        }
    };
    pool.install(|| search_batches(last_proof, target, batch, &should_abort, started))
}

fn search_batches<F>(last_proof: u64, target: &PowTarget, batch: u64, should_abort: &F, started: Instant) -> Option<u64>
where
    F: Fn() -> bool + Sync,
{
    let mut start = 0u64;
    loop {
        if should_abort() {
            debug!(last_proof, examined = start, "proof search aborted");
            return None;
        }
        let end = start.saturating_add(batch);
        if let Some(proof) = (start..end)
            .into_par_iter()
            .find_first(|p| valid_proof(last_proof, *p, target))
        {
            debug!(
                last_proof,
                proof,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "proof found"
            );
            return Some(proof);
        }
        start = end;
    }
}
