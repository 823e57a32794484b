//! The ledger context: one instance per process, shared by handle with every
//! request handler and background task.

use crate::blockchain::{Block, Blockchain};
use crate::config::Config;
use crate::error::{ChainError, Result};
use crate::miner::{mine_proof, CancelToken, Difficulty};
use crate::network::{ChainFetcher, HttpChainFetcher, PeerAddress, PeerSet};
use crate::sync::{ConsensusResolver, Resolution};
use crate::transaction::{NewTransactionRequest, Transaction};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Random 128-bit identifier, hex encoded.
pub fn generate_node_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

pub struct Node {
    node_id: String,
    config: Config,
    difficulty: Difficulty,
    /// Chain and pending pool, guarded together.
    blockchain: Arc<RwLock<Blockchain>>,
    peers: parking_lot::RwLock<PeerSet>,
    fetcher: Arc<dyn ChainFetcher>,
    resolver: ConsensusResolver,
    mining_cancel: parking_lot::Mutex<CancelToken>,
    blocks_mined: AtomicU64,
}

impl Node {
    /// Build a node with an explicit identifier and chain-fetch capability.
    ///
    /// Bootstrap peers from the configuration are registered immediately.
    pub fn new(config: Config, node_id: String, fetcher: Arc<dyn ChainFetcher>) -> Result<Self> {
        config.validate()?;
        if node_id.is_empty() {
            return Err(ChainError::ConfigError("node id must not be empty".to_string()));
        }

        let difficulty = config.miner.difficulty()?;
        let resolver = ConsensusResolver::new(difficulty.clone(), config.network.fetch_timeout());

        let mut peers = PeerSet::new();
        for address in &config.network.bootstrap_peers {
            peers.register(address)?;
        }

        Ok(Self {
            node_id,
            config,
            difficulty,
            blockchain: Arc::new(RwLock::new(Blockchain::new())),
            peers: parking_lot::RwLock::new(peers),
            fetcher,
            resolver,
            mining_cancel: parking_lot::Mutex::new(CancelToken::new()),
            blocks_mined: AtomicU64::new(0),
        })
    }

    /// Build a node that talks to peers over HTTP, generating an identifier if none is configured.
    pub fn from_config(config: Config) -> Result<Self> {
        let node_id = if config.miner.node_id.is_empty() {
            generate_node_id()
        } else {
            config.miner.node_id.clone()
        };
        let fetcher = Arc::new(HttpChainFetcher::new(config.network.fetch_timeout())?);
        Self::new(config, node_id, fetcher)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn difficulty(&self) -> &Difficulty {
        &self.difficulty
    }

    pub fn blocks_mined(&self) -> u64 {
        self.blocks_mined.load(Ordering::Relaxed)
    }

    /// Validate a submission and queue it; returns the index of the block it will land in.
    pub async fn submit_transaction(&self, request: NewTransactionRequest) -> Result<u64> {
        let transaction = request.validate()?;
        let index = self.blockchain.write().await.new_transaction(transaction)?;
        debug!(index, "transaction queued");
        Ok(index)
    }

    /// Snapshot of the full chain.
    pub async fn chain(&self) -> Vec<Block> {
        self.blockchain.read().await.blocks().to_vec()
    }

    pub async fn pending_transactions(&self) -> Vec<Transaction> {
        self.blockchain.read().await.pending_transactions().to_vec()
    }

    /// Register peers; either every address is accepted or none is.
    ///
    /// Returns the full peer list afterwards.
    pub fn register_peers<S: AsRef<str>>(&self, addresses: &[S]) -> Result<Vec<PeerAddress>> {
        let parsed = addresses
            .iter()
            .map(|a| PeerAddress::parse(a.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let mut peers = self.peers.write();
        for peer in parsed {
            if peers.insert(peer.clone()) {
                info!(peer = %peer, "registered peer");
            }
        }
        Ok(peers.list())
    }

    pub fn peers(&self) -> Vec<PeerAddress> {
        self.peers.read().list()
    }

    /// Abort any proof search in flight. Searches started afterwards are unaffected.
    pub fn cancel_mining(&self) {
        let previous = std::mem::take(&mut *self.mining_cancel.lock());
        previous.cancel();
    }

    /// Stop the search in flight so it restarts on the new tip. Must be
    /// called with the ledger write lock held.
    fn supersede_mining(&self) {
        let previous = std::mem::take(&mut *self.mining_cancel.lock());
        previous.supersede();
    }

    /// Solve the puzzle for the current last block and seal the pending pool
    /// together with the reward transaction.
    ///
    /// The search runs on a blocking worker without holding the ledger lock.
    /// If the last block changed meanwhile (another block was sealed or the
    /// chain was replaced), the proof is discarded and the search restarts
    /// against the new last block. Only [`cancel_mining`](Self::cancel_mining)
    /// makes it return [`ChainError::MiningCancelled`].
    pub async fn mine(&self) -> Result<Block> {
        loop {
            // The token is read under the same lock as the tip, so a
            // replacement supersedes exactly the searches built on the old tip.
            let (cancel, last_proof, last_hash) = {
                let chain = self.blockchain.read().await;
                let cancel = self.mining_cancel.lock().clone();
                let last = chain.last_block()?;
                (cancel, last.proof, last.hash()?)
            };

            let difficulty = self.difficulty.clone();
            let threads = self.config.miner.threads;
            let token = cancel.clone();
            let proof = tokio::task::spawn_blocking(move || {
                mine_proof(last_proof, &difficulty, threads, &token)
            })
            .await
            .map_err(|e| ChainError::MiningFailed(e.to_string()))??;

            if cancel.is_cancelled() && !cancel.is_superseded() {
                warn!("mining cancelled");
                return Err(ChainError::MiningCancelled);
            }

            let mut chain = self.blockchain.write().await;
            if chain.last_block()?.hash()? != last_hash {
                info!("last block changed while mining, restarting");
                continue;
            }

            let Some(proof) = proof else {
                if cancel.is_superseded() {
                    continue;
                }
                return Err(ChainError::MiningFailed(
                    "proof space exhausted".to_string(),
                ));
            };

            let miner = &self.config.miner;
            chain.new_transaction(Transaction::reward(
                &miner.reward_sender,
                &self.node_id,
                miner.reward,
            ))?;
            let block = chain.new_block(proof, Some(last_hash))?;
            self.blocks_mined.fetch_add(1, Ordering::Relaxed);
            info!(
                index = block.index,
                proof = block.proof,
                transactions = block.transactions.len(),
                "sealed new block"
            );
            return Ok(block);
        }
    }

    /// Run one longest-chain resolution round against every known peer.
    ///
    /// A replacement supersedes the search in flight before the new chain
    /// becomes visible to readers.
    pub async fn resolve(&self) -> Result<Resolution> {
        let peers = self.peers();
        let resolution = self
            .resolver
            .resolve_with(&self.blockchain, &peers, self.fetcher.as_ref(), || {
                self.supersede_mining()
            })
            .await?;

        info!(
            replaced = resolution.replaced,
            length = resolution.chain.len(),
            peers = resolution.peers_contacted,
            failed = resolution.peers_failed,
            rejected = resolution.chains_rejected,
            "consensus round finished"
        );
        Ok(resolution)
    }

    /// Resolve against peers every `interval` until the handle is aborted.
    pub fn spawn_periodic_resolver(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.resolve().await {
                    warn!(error = %e, "periodic resolution failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::is_valid_chain;
    use crate::miner::search_proof;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct NoPeers;

    #[async_trait]
    impl ChainFetcher for NoPeers {
        async fn fetch_chain(&self, peer: &PeerAddress) -> Result<Vec<Block>> {
            Err(ChainError::NetworkError(format!("{} unreachable", peer)))
        }
    }

    /// Mining from the genesis proof under this target takes more than eight
    /// million candidates, yet `FAST_TIP_PROOF` is a valid second block and
    /// mining on top of it succeeds within a few hundred.
    const SLOW_GENESIS_TARGET: &str = "9d7f3d";
    const FAST_TIP_PROOF: u64 = 50_006_385;

    struct FixedPeer {
        chain: Vec<Block>,
        calls: AtomicUsize,
    }

    impl FixedPeer {
        fn new(chain: Vec<Block>) -> Self {
            Self {
                chain,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChainFetcher for FixedPeer {
        async fn fetch_chain(&self, _peer: &PeerAddress) -> Result<Vec<Block>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.chain.clone())
        }
    }

    /// Two-block chain whose tip is cheap to extend under `SLOW_GENESIS_TARGET`.
    fn fast_tip_chain() -> Vec<Block> {
        let mut chain = Blockchain::new();
        chain.new_transaction(Transaction::new("peer", "X", 7)).unwrap();
        chain.new_block(FAST_TIP_PROOF, None).unwrap();
        chain.blocks().to_vec()
    }

    fn test_config(target: &str) -> Config {
        let mut config = Config::default();
        config.miner.difficulty_target = target.to_string();
        config
    }

    fn test_node() -> Node {
        Node::new(test_config("0"), "node-a".to_string(), Arc::new(NoPeers)).unwrap()
    }

    fn request(sender: &str, recipient: &str, amount: u64) -> NewTransactionRequest {
        NewTransactionRequest {
            sender: Some(sender.to_string()),
            recipient: Some(recipient.to_string()),
            amount: Some(amount),
        }
    }

    #[tokio::test]
    async fn test_mine_seals_submitted_transaction_and_reward() {
        let node = test_node();
        let genesis_hash = node.chain().await[0].hash().unwrap();

        let index = node.submit_transaction(request("A", "B", 5)).await.unwrap();
        assert_eq!(index, 2);

        let block = node.mine().await.unwrap();
        assert_eq!(block.index, 2);
        assert_eq!(
            block.transactions,
            vec![Transaction::new("A", "B", 5), Transaction::new("0", "node-a", 1)]
        );
        assert_eq!(block.previous_hash, genesis_hash);
        assert!(node.pending_transactions().await.is_empty());
        assert_eq!(node.blocks_mined(), 1);

        let chain = node.chain().await;
        assert_eq!(chain.len(), 2);
        assert!(is_valid_chain(&chain, node.difficulty()));
    }

    #[tokio::test]
    async fn test_invalid_submission_leaves_pool_untouched() {
        let node = test_node();
        let err = node
            .submit_transaction(NewTransactionRequest {
                sender: Some("A".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::MissingField("recipient")));
        assert!(node.pending_transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_submissions_are_never_lost_or_duplicated() {
        let node = Arc::new(test_node());
        let mut tasks = Vec::new();
        for i in 0..50u64 {
            let node = node.clone();
            tasks.push(tokio::spawn(async move {
                node.submit_transaction(request("A", "B", i)).await.unwrap();
                if i % 10 == 0 {
                    node.mine().await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        node.mine().await.unwrap();

        let mut amounts: Vec<u64> = node
            .chain()
            .await
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter(|tx| tx.sender == "A")
            .map(|tx| tx.amount)
            .collect();
        amounts.sort_unstable();
        assert_eq!(amounts, (0..50).collect::<Vec<_>>());
        assert!(is_valid_chain(&node.chain().await, node.difficulty()));
    }

    #[tokio::test]
    async fn test_cancel_mining_aborts_search() {
        let node = Arc::new(
            Node::new(
                test_config(&"f".repeat(64)),
                "node-a".to_string(),
                Arc::new(NoPeers),
            )
            .unwrap(),
        );

        let miner = {
            let node = node.clone();
            tokio::spawn(async move { node.mine().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        node.cancel_mining();

        let result = tokio::time::timeout(Duration::from_secs(5), miner)
            .await
            .expect("mining did not stop")
            .unwrap();
        assert!(matches!(result, Err(ChainError::MiningCancelled)));
        assert_eq!(node.chain().await.len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_during_mining_restarts_on_adopted_tip() {
        let adopted = fast_tip_chain();
        let node = Arc::new(
            Node::new(
                test_config(SLOW_GENESIS_TARGET),
                "node-a".to_string(),
                Arc::new(FixedPeer::new(adopted.clone())),
            )
            .unwrap(),
        );
        node.register_peers(&["http://10.0.0.9:5000"]).unwrap();
        node.submit_transaction(request("A", "B", 5)).await.unwrap();

        let miner = {
            let node = node.clone();
            tokio::spawn(async move { node.mine().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!miner.is_finished());

        let resolution = node.resolve().await.unwrap();
        assert!(resolution.replaced);

        let block = tokio::time::timeout(Duration::from_secs(30), miner)
            .await
            .expect("mining did not restart on the adopted tip")
            .unwrap()
            .unwrap();
        assert_eq!(block.index, 3);
        assert_eq!(block.previous_hash, adopted[1].hash().unwrap());
        assert_eq!(
            block.transactions,
            vec![Transaction::new("A", "B", 5), Transaction::new("0", "node-a", 1)]
        );

        let chain = node.chain().await;
        assert_eq!(chain.len(), 3);
        assert_eq!(&chain[..2], &adopted[..]);
        assert!(is_valid_chain(&chain, node.difficulty()));
    }

    #[tokio::test]
    async fn test_mine_started_during_replacement_builds_on_new_tip() {
        let adopted = fast_tip_chain();
        let node = Arc::new(
            Node::new(
                test_config(SLOW_GENESIS_TARGET),
                "node-a".to_string(),
                Arc::new(NoPeers),
            )
            .unwrap(),
        );

        let mut guard = node.blockchain.write().await;
        let miner = {
            let node = node.clone();
            tokio::spawn(async move { node.mine().await })
        };
        // The miner is now parked on the ledger lock.
        tokio::time::sleep(Duration::from_millis(20)).await;
        guard.replace_chain(adopted.clone()).unwrap();
        node.supersede_mining();
        drop(guard);

        let block = tokio::time::timeout(Duration::from_secs(30), miner)
            .await
            .expect("mining did not finish")
            .unwrap()
            .unwrap();
        assert_eq!(block.index, 3);
        assert_eq!(block.previous_hash, adopted[1].hash().unwrap());
    }

    #[tokio::test]
    async fn test_explicit_cancel_wins_over_chain_change() {
        let adopted = fast_tip_chain();
        let node = Arc::new(
            Node::new(
                test_config(SLOW_GENESIS_TARGET),
                "node-a".to_string(),
                Arc::new(NoPeers),
            )
            .unwrap(),
        );

        let miner = {
            let node = node.clone();
            tokio::spawn(async move { node.mine().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        {
            let mut chain = node.blockchain.write().await;
            node.cancel_mining();
            chain.replace_chain(adopted.clone()).unwrap();
            node.supersede_mining();
        }

        let result = tokio::time::timeout(Duration::from_secs(5), miner)
            .await
            .expect("mining did not stop")
            .unwrap();
        assert!(matches!(result, Err(ChainError::MiningCancelled)));
        assert_eq!(node.chain().await, adopted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_resolver_runs_every_interval() {
        let difficulty = Difficulty::new("0").unwrap();
        let mut remote = Blockchain::new();
        while remote.len() < 3 {
            let last_proof = remote.last_block().unwrap().proof;
            let proof = search_proof(last_proof, &difficulty, &CancelToken::new()).unwrap();
            remote.new_block(proof, None).unwrap();
        }

        let fetcher = Arc::new(FixedPeer::new(remote.blocks().to_vec()));
        let node = Arc::new(Node::new(test_config("0"), "node-a".to_string(), fetcher.clone()).unwrap());
        node.register_peers(&["http://10.0.0.9:5000"]).unwrap();

        let handle = node.clone().spawn_periodic_resolver(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(node.chain().await.len(), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(node.chain().await, remote.blocks());
        handle.abort();
    }

    #[tokio::test]
    async fn test_register_peers_is_idempotent_and_atomic() {
        let node = test_node();
        let peers = node
            .register_peers(&["http://10.0.0.1:5000", "10.0.0.1:5000", "http://10.0.0.2:5000"])
            .unwrap();
        assert_eq!(peers.len(), 2);

        assert!(node.register_peers(&["http://10.0.0.3:5000", "ftp://bad"]).is_err());
        assert_eq!(node.peers().len(), 2);
    }

    #[tokio::test]
    async fn test_resolve_with_unreachable_peers_keeps_chain() {
        let node = test_node();
        node.register_peers(&["http://10.0.0.1:5000"]).unwrap();
        node.mine().await.unwrap();

        let resolution = node.resolve().await.unwrap();
        assert!(!resolution.replaced);
        assert_eq!(resolution.peers_failed, 1);
        assert_eq!(resolution.chain.len(), 2);
    }

    #[test]
    fn test_bootstrap_peers_are_registered() {
        let mut config = test_config("0");
        config.network.bootstrap_peers = vec!["peer-1:5000".to_string(), "http://peer-1:5000".to_string()];
        let node = Node::new(config, "n".to_string(), Arc::new(NoPeers)).unwrap();
        assert_eq!(node.peers().len(), 1);
    }

    #[test]
    fn test_generated_node_ids_are_distinct() {
        let a = generate_node_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, generate_node_id());
    }
}
