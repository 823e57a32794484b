//! Longest-valid-chain conflict resolution
//!
//! Every known peer's chain is fetched in turn. A candidate is adopted only
//! when it is strictly longer than the best chain seen so far and passes full
//! validation; on a tie the local chain wins. Fork choice is by length alone.

use crate::blockchain::{validate_chain, Block, Blockchain};
use crate::error::Result;
use crate::miner::Difficulty;
use crate::network::{ChainFetcher, PeerAddress};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Outcome of one resolution round.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub replaced: bool,
    /// The local chain after resolution.
    pub chain: Vec<Block>,
    pub peers_contacted: usize,
    pub peers_failed: usize,
    pub chains_rejected: usize,
}

#[derive(Debug, Clone)]
pub struct ConsensusResolver {
    difficulty: Difficulty,
    fetch_timeout: Duration,
}

impl ConsensusResolver {
    pub fn new(difficulty: Difficulty, fetch_timeout: Duration) -> Self {
        Self {
            difficulty,
            fetch_timeout,
        }
    }

    /// Fetch one peer's chain, folding timeouts into the error path.
    async fn fetch(&self, fetcher: &dyn ChainFetcher, peer: &PeerAddress) -> Option<Vec<Block>> {
        match tokio::time::timeout(self.fetch_timeout, fetcher.fetch_chain(peer)).await {
            Ok(Ok(chain)) => Some(chain),
            Ok(Err(e)) => {
                warn!(peer = %peer, error = %e, "peer chain fetch failed");
                None
            }
            Err(_) => {
                warn!(peer = %peer, timeout_ms = self.fetch_timeout.as_millis() as u64, "peer chain fetch timed out");
                None
            }
        }
    }

    /// Run one round against `peers`, replacing `ledger`'s chain if a longer valid one exists.
    ///
    /// No ledger lock is held while peers are contacted. The final swap
    /// re-checks the candidate against the chain as it is at that moment, so a
    /// local chain that grew in the meantime is never shortened.
    pub async fn resolve(
        &self,
        ledger: &RwLock<Blockchain>,
        peers: &[PeerAddress],
        fetcher: &dyn ChainFetcher,
    ) -> Result<Resolution> {
        self.resolve_with(ledger, peers, fetcher, || {}).await
    }

    /// Like [`resolve`](Self::resolve), calling `on_replace` after a swap
    /// while the write lock is still held.
    pub async fn resolve_with<F>(
        &self,
        ledger: &RwLock<Blockchain>,
        peers: &[PeerAddress],
        fetcher: &dyn ChainFetcher,
        on_replace: F,
    ) -> Result<Resolution>
    where
        F: FnOnce() + Send,
    {
        let mut best_length = ledger.read().await.len();
        let mut best: Option<Vec<Block>> = None;
        let mut peers_failed = 0;
        let mut chains_rejected = 0;

        for peer in peers {
            let Some(candidate) = self.fetch(fetcher, peer).await else {
                peers_failed += 1;
                continue;
            };

            if candidate.len() <= best_length {
                debug!(peer = %peer, length = candidate.len(), best_length, "peer chain not longer");
                continue;
            }

            match validate_chain(&candidate, &self.difficulty) {
                Ok(()) => {
                    debug!(peer = %peer, length = candidate.len(), "longer valid chain found");
                    best_length = candidate.len();
                    best = Some(candidate);
                }
                Err(e) => {
                    warn!(peer = %peer, length = candidate.len(), error = %e, "rejected peer chain");
                    chains_rejected += 1;
                }
            }
        }

        let mut ledger = ledger.write().await;
        let replaced = match best {
            Some(chain) if chain.len() > ledger.len() => {
                info!(old_length = ledger.len(), new_length = chain.len(), "replacing local chain");
                ledger.replace_chain(chain)?;
                on_replace();
                true
            }
            _ => false,
        };

        Ok(Resolution {
            replaced,
            chain: ledger.blocks().to_vec(),
            peers_contacted: peers.len(),
            peers_failed,
            chains_rejected,
        })
    }
}
