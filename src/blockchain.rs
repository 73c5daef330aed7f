// Thin re-export module: the ledger lives in `blockchain/core/`, split into
// chain management and chain validation.

pub mod core;
pub use core::*;
