//! Error types for LedgerChain

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ChainError {
    /// The ledger must always hold at least the genesis block.
    EmptyChain,
    Serialization(String),
    InvalidPeerAddress(String),
    PeerUnreachable(String),
    MiningAborted,
    Config(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChainError::EmptyChain => write!(f, "Chain contains no blocks"),
            ChainError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ChainError::InvalidPeerAddress(msg) => write!(f, "Invalid peer address: {}", msg),
            ChainError::PeerUnreachable(msg) => write!(f, "Peer unreachable: {}", msg),
            ChainError::MiningAborted => write!(f, "Mining aborted"),
            ChainError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
