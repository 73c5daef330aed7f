//! Peer registry and peer chain fetching
//!
//! Peers are plain `host:port` strings; there is no discovery or liveness
//! tracking. Fetching a peer's chain goes through the [`ChainFetcher`] seam
//! so consensus can be exercised without sockets.

use crate::blockchain::ChainSnapshot;
use crate::error::{ChainError, Result};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Normalize a peer URL to `host:port`.
///
/// Addresses without a scheme (`192.168.0.5:5000`) are read as `http://`.
/// When no port is given the scheme's default port is used.
pub fn normalize_peer_address(address: &str) -> Result<String> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ChainError::InvalidPeerAddress("empty address".to_string()));
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let url = Url::parse(&with_scheme)
        .map_err(|e| ChainError::InvalidPeerAddress(format!("{}: {}", address, e)))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ChainError::InvalidPeerAddress(format!("{}: missing host", address)))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ChainError::InvalidPeerAddress(format!("{}: missing port", address)))?;

    Ok(format!("{}:{}", host, port))
}

/// Deduplicated set of peer locations.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    peers: RwLock<HashSet<String>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer; returns its normalized form. Registering the same
    /// peer twice is a no-op.
    pub fn register(&self, address: &str) -> Result<String> {
        let normalized = normalize_peer_address(address)?;
        if self.peers.write().insert(normalized.clone()) {
            info!(peer = %normalized, "registered peer");
        }
        Ok(normalized)
    }

    pub fn list_peers(&self) -> Vec<String> {
        self.peers.read().iter().cloned().collect()
    }

    pub fn contains(&self, peer: &str) -> bool {
        self.peers.read().contains(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<ChainSnapshot>> + Send + 'a>>;

/// Source of peer chains.
pub trait ChainFetcher: Send + Sync {
    /// Fetch `{length, chain}` from `peer` (`host:port`).
    fn fetch_chain<'a>(&'a self, peer: &'a str) -> FetchFuture<'a>;
}

/// Fetches `GET http://{peer}/chain` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChainFetcher {
    client: reqwest::Client,
}

impl HttpChainFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl ChainFetcher for HttpChainFetcher {
    fn fetch_chain<'a>(&'a self, peer: &'a str) -> FetchFuture<'a> {
        Box::pin(async move {
            let url = format!("http://{}/chain", peer);
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| ChainError::PeerUnreachable(format!("{}: {}", peer, e)))?;

            if !response.status().is_success() {
                return Err(ChainError::PeerUnreachable(format!(
                    "{} returned status {}",
                    peer,
                    response.status()
                )));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| ChainError::PeerUnreachable(format!("{}: {}", peer, e)))?;
            serde_json::from_slice::<ChainSnapshot>(&bytes)
                .map_err(|e| ChainError::Serialization(format!("{}: {}", peer, e)))
        })
    }
}
