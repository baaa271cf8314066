//! # evave
//!
//! Bilateral impression channels between a demand and a supply party,
//! settled by an external authority.
//!
//! ## Overview
//!
//! Impressions are appended to an off-chain log kept by both parties. Each
//! append produces a signed update committing to the log's Merkle root.
//! Periodically one party proposes the latest root to the authority as a
//! checkpoint; the counterparty has a challenge window to cancel it with
//! newer signed evidence, after which the checkpoint finalizes lazily.
//!
//! ## Key Concepts
//!
//! - **Record**: The authority's nine-word snapshot of a channel. Never cached.
//! - **Update**: A signed root over the log after one more impression.
//! - **Checkpoint**: A root proposed to the authority, final after its window.
//! - **Audit**: Any impression can be proven against a root with no other state.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use evave::{ChannelManager, ManagerConfig};
//! use evave::authority::{AuthorityConfig, MemoryAuthority};
//! use evave::core::{Address, Keypair};
//! use evave::store::MemoryStore;
//!
//! async fn example() {
//!     let authority = Arc::new(MemoryAuthority::new(AuthorityConfig::default()));
//!     let keypair = Keypair::generate();
//!     let manager = ChannelManager::new(
//!         keypair,
//!         authority,
//!         MemoryStore::new(),
//!         ManagerConfig::default(),
//!     );
//!
//!     // Both parties must be registered by the authority's owner first.
//!     let supply = Address::from_bytes([0x0b; 20]);
//!     // let record = manager.open_channel(&supply).await?;
//!     // let update = manager.record_impression(&record.channel_id, id, 100).await?;
//!     let _ = (manager, supply);
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `evave::core` - Encoding, Merkle log, fingerprints and lifecycle rules
//! - `evave::store` - Local storage abstraction and SQLite
//! - `evave::authority` - Settlement authority interface

pub mod error;
pub mod manager;

// Re-export component crates
pub use evave_authority as authority;
pub use evave_core as core;
pub use evave_store as store;

// Re-export main types for convenience
pub use error::{EvaveError, Result};
pub use manager::{AcceptOutcome, ChannelManager, ManagerConfig};

// Re-export commonly used core types
pub use evave_core::{
    Address, BlockHeight, ChallengeEvidence, ChannelId, ChannelRecord, ChannelState, Hash32,
    ImpressionRecord, Keypair, MerkleProof, RecoverableSignature, SignedUpdate,
};
