//! Peer registry and the chain-fetch capability used by consensus.

use crate::blockchain::Block;
use crate::error::{ChainError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use url::Url;

/// A peer's network address, normalized to scheme, host, and port.
///
/// Equality and hashing use the normalized form, so `HTTP://Node:80/` and
/// `http://node` are the same peer. An address without a scheme is taken to
/// be `http`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddress {
    scheme: String,
    host: String,
    port: u16,
}

impl PeerAddress {
    pub fn parse(address: &str) -> Result<Self> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(ChainError::InvalidPeerAddress("empty address".to_string()));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };
        let url = Url::parse(&with_scheme)?;

        let scheme = url.scheme().to_string();
        if scheme != "http" && scheme != "https" {
            return Err(ChainError::InvalidPeerAddress(format!(
                "unsupported scheme {:?} in {}",
                scheme, address
            )));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ChainError::InvalidPeerAddress(format!("no host in {}", address)))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ChainError::InvalidPeerAddress(format!("no port in {}", address)))?;

        Ok(Self { scheme, host, port })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, the form peers are listed in.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL for requests to this peer, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

impl std::str::FromStr for PeerAddress {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for PeerAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.base_url())
    }
}

impl<'de> Deserialize<'de> for PeerAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PeerAddress::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Deduplicated set of known peers.
#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    peers: BTreeSet<PeerAddress>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and insert `address`. Returns `true` if the peer was not known yet.
    pub fn register(&mut self, address: &str) -> Result<bool> {
        let peer = PeerAddress::parse(address)?;
        Ok(self.insert(peer))
    }

    pub fn insert(&mut self, peer: PeerAddress) -> bool {
        self.peers.insert(peer)
    }

    pub fn contains(&self, peer: &PeerAddress) -> bool {
        self.peers.contains(peer)
    }

    pub fn list(&self) -> Vec<PeerAddress> {
        self.peers.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Full chain as served by a node's `/chain` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub length: usize,
}

/// Retrieves the full chain held by a peer.
///
/// Every failure (unreachable peer, timeout, malformed body) is an `Err`;
/// implementations never panic on bad peer input.
#[async_trait]
pub trait ChainFetcher: Send + Sync {
    async fn fetch_chain(&self, peer: &PeerAddress) -> Result<Vec<Block>>;
}

/// Fetches `GET {peer}/chain` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChainFetcher {
    client: reqwest::Client,
}

impl HttpChainFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ChainFetcher for HttpChainFetcher {
    async fn fetch_chain(&self, peer: &PeerAddress) -> Result<Vec<Block>> {
        let url = format!("{}/chain", peer.base_url());
        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ChainError::NetworkError(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }

        let body: ChainResponse = response.json().await?;
        if body.length != body.chain.len() {
            return Err(ChainError::NetworkError(format!(
                "{} reported length {} for a chain of {} blocks",
                url,
                body.length,
                body.chain.len()
            )));
        }
        Ok(body.chain)
    }
}
