//! LinkChain - a minimal proof-of-work ledger node with longest-chain consensus
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, the ledger (chain + pending pool) and chain validation
//! - [`transaction`] - Transaction type and submission validation
//!
//! ## Consensus & Mining
//! - [`miner`] - Proof-of-work search and verification
//! - [`sync`] - Longest-valid-chain conflict resolution
//!
//! ## Cryptography
//! - [`crypto`] - Canonical block hashing (SHA-256)
//!
//! ## Networking & Integration
//! - [`network`] - Peer addresses, the peer set and chain fetching
//! - [`node`] - The shared ledger context every handler operates on
//! - [`api`] - HTTP endpoints (feature `api`)
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;
pub mod sync;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Networking & Integration
// ============================================================================
pub mod network;
pub mod node;

#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
