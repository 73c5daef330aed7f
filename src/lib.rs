//! LedgerChain - a replicated proof-of-work transaction ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the ledger and chain validation
//! - [`transaction`] - Transaction record
//! - [`mempool`] - Pending transaction pool
//!
//! ## Consensus & Mining
//! - [`miner`] - Proof-of-work puzzle and proof search
//! - [`consensus`] - Longest-valid-chain resolution
//!
//! ## Hashing
//! - [`crypto`] - Canonical serialization and SHA-256 digests
//!
//! ## Networking & Integration
//! - [`network`] - Peer registry and peer chain fetching
//! - [`node`] - Node composition root
//! - `api` - HTTP endpoints (feature `api`)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod consensus;
pub mod miner;

// ============================================================================
// Hashing
// ============================================================================
pub mod crypto;

// ============================================================================
// Networking
// ============================================================================
pub mod network;
pub mod node;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
