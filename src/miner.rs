//! Proof-of-work search and verification
//!
//! A proof is valid when `sha256(previous_proof ++ candidate)`, rendered as
//! lowercase hex, starts with the configured difficulty target. Both integers
//! are concatenated in their decimal textual form.

use crate::crypto::sha256_hex;
use crate::error::{ChainError, Result};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// How many candidates the sequential search tries between cancellation checks.
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Hex prefix a proof digest must start with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difficulty {
    target: String,
}

impl Difficulty {
    pub fn new(target: &str) -> Result<Self> {
        if target.len() > 64 {
            return Err(ChainError::InvalidDifficulty(format!(
                "target is {} characters, a SHA-256 digest has 64",
                target.len()
            )));
        }
        if !target.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ChainError::InvalidDifficulty(format!(
                "target {:?} is not hexadecimal",
                target
            )));
        }
        Ok(Self {
            target: target.to_ascii_lowercase(),
        })
    }

    /// Target consisting of `count` zero nibbles.
    pub fn leading_zeros(count: usize) -> Result<Self> {
        Self::new(&"0".repeat(count))
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Number of hex characters compared (the `D` parameter).
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn is_satisfied_by(&self, digest: &str) -> bool {
        digest.starts_with(&self.target)
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self {
            target: "0000".to_string(),
        }
    }
}

const RUNNING: u8 = 0;
const CANCELLED: u8 = 1;
const SUPERSEDED: u8 = 2;

/// Cooperative stop flag shared between a miner and whoever may abort it.
///
/// A search stops on either [`cancel`](Self::cancel) or
/// [`supersede`](Self::supersede); the miner tells them apart afterwards. An
/// explicit cancel always wins over a supersede.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicU8>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(CANCELLED, Ordering::SeqCst);
    }

    /// Stop the search because the block it builds on is no longer the tip.
    pub fn supersede(&self) {
        let _ = self
            .0
            .compare_exchange(RUNNING, SUPERSEDED, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Whether the search should stop, for either reason.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed) != RUNNING
    }

    pub fn is_superseded(&self) -> bool {
        self.0.load(Ordering::SeqCst) == SUPERSEDED
    }
}

/// Check whether `candidate` solves the puzzle posed by `previous_proof`.
pub fn verify_proof(previous_proof: u64, candidate: u64, difficulty: &Difficulty) -> bool {
    let guess = format!("{}{}", previous_proof, candidate);
    difficulty.is_satisfied_by(&sha256_hex(guess))
}

/// Smallest valid proof for `previous_proof`, enumerating from zero.
///
/// Returns `None` when `cancel` fires or the integer space is exhausted.
pub fn search_proof(
    previous_proof: u64,
    difficulty: &Difficulty,
    cancel: &CancelToken,
) -> Option<u64> {
    let mut candidate = 0u64;
    loop {
        if candidate % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return None;
        }
        if verify_proof(previous_proof, candidate, difficulty) {
            return Some(candidate);
        }
        candidate = candidate.checked_add(1)?;
    }
}

/// Parallel variant of [`search_proof`] spread over the current rayon pool.
///
/// The result is *a* valid proof, not necessarily the smallest one.
pub fn search_proof_parallel(
    previous_proof: u64,
    difficulty: &Difficulty,
    cancel: &CancelToken,
) -> Option<u64> {
    let found = (0..u64::MAX)
        .into_par_iter()
        .find_any(|&candidate| {
            cancel.is_cancelled() || verify_proof(previous_proof, candidate, difficulty)
        })?;

    if cancel.is_cancelled() && !verify_proof(previous_proof, found, difficulty) {
        return None;
    }
    Some(found)
}

/// Run the search on a dedicated pool of `threads` workers (sequential when 1).
pub fn mine_proof(
    previous_proof: u64,
    difficulty: &Difficulty,
    threads: usize,
    cancel: &CancelToken,
) -> Result<Option<u64>> {
    if threads <= 1 {
        return Ok(search_proof(previous_proof, difficulty, cancel));
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| ChainError::ConfigError(format!("failed to build mining pool: {}", e)))?;
    Ok(pool.install(|| search_proof_parallel(previous_proof, difficulty, cancel)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Difficulty {
        Difficulty::new("00").unwrap()
    }

    #[test]
    fn test_difficulty_validation() {
        assert!(Difficulty::new("0010").is_ok());
        assert!(Difficulty::new("").is_ok());
        assert!(Difficulty::new("0x").is_err());
        assert!(Difficulty::new(&"0".repeat(65)).is_err());
        assert_eq!(Difficulty::new("ABC").unwrap().target(), "abc");
        assert_eq!(Difficulty::leading_zeros(3).unwrap().len(), 3);
        assert_eq!(Difficulty::default().target(), "0000");
    }

    #[test]
    fn test_search_returns_verified_smallest_proof() {
        let difficulty = cheap();
        for previous in [0u64, 1, 100, 35293, u64::MAX] {
            let proof = search_proof(previous, &difficulty, &CancelToken::new()).unwrap();
            assert!(verify_proof(previous, proof, &difficulty));
            assert!((0..proof).all(|c| !verify_proof(previous, c, &difficulty)));
        }
    }

    #[test]
    fn test_verify_is_pure() {
        let difficulty = cheap();
        let proof = search_proof(100, &difficulty, &CancelToken::new()).unwrap();
        for _ in 0..10 {
            assert!(verify_proof(100, proof, &difficulty));
        }
    }

    #[test]
    fn test_empty_target_accepts_zero() {
        let difficulty = Difficulty::new("").unwrap();
        assert_eq!(search_proof(7, &difficulty, &CancelToken::new()), Some(0));
    }

    #[test]
    fn test_verify_matches_digest_prefix() {
        let digest = sha256_hex("10042");
        let difficulty = Difficulty::new(&digest[..3]).unwrap();
        assert!(verify_proof(100, 42, &difficulty));
    }

    #[test]
    fn test_cancelled_search_stops() {
        // 64 `f`s is unsatisfiable in practice.
        let difficulty = Difficulty::new(&"f".repeat(64)).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert_eq!(search_proof(1, &difficulty, &cancel), None);
        assert_eq!(search_proof_parallel(1, &difficulty, &cancel), None);
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let difficulty = Difficulty::new(&"f".repeat(64)).unwrap();
        let cancel = CancelToken::new();
        let handle = {
            let cancel = cancel.clone();
            let difficulty = difficulty.clone();
            std::thread::spawn(move || search_proof(1, &difficulty, &cancel))
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        cancel.cancel();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn test_supersede_stops_search_but_not_an_explicit_cancel() {
        let difficulty = Difficulty::new(&"f".repeat(64)).unwrap();

        let superseded = CancelToken::new();
        superseded.supersede();
        assert!(superseded.is_cancelled());
        assert!(superseded.is_superseded());
        assert_eq!(search_proof(1, &difficulty, &superseded), None);

        let cancelled = CancelToken::new();
        cancelled.cancel();
        cancelled.supersede();
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_superseded());

        superseded.cancel();
        assert!(!superseded.is_superseded());
    }

    #[test]
    fn test_parallel_search_returns_valid_proof() {
        let difficulty = cheap();
        let proof = mine_proof(100, &difficulty, 4, &CancelToken::new())
            .unwrap()
            .unwrap();
        assert!(verify_proof(100, proof, &difficulty));
    }
}
