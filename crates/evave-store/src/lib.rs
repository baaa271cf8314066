//! # evave Store
//!
//! Local persistence for a party's view of its channels. Provides a
//! trait-based interface with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The authority holds the canonical channel records. Everything else a party
//! needs to prove or dispute a checkpoint lives here: the ordered impression
//! log behind each root, the signed updates received from the counterparty,
//! and the last record observed on-chain.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting an impression or update
//! - [`ObservedChannel`] - A record together with the height it was read at
//!
//! ## Usage
//!
//! ```rust,no_run
//! use evave_store::{SqliteStore, Store, StoreExt};
//! use evave_core::{derive_channel_id, Hash32, ImpressionRecord};
//!
//! async fn example() {
//!     let store = SqliteStore::open("evave.db").unwrap();
//!     let channel = derive_channel_id(0);
//!
//!     let impression = ImpressionRecord::new(Hash32::ZERO, 100, 1);
//!     store.put_impression(&channel, &impression).await.unwrap();
//!     let log = store.impressions(&channel).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent inserts**: Inserting the same impression twice returns `AlreadyExists`
//! - **Conflict detection**: A different impression at the same sequence returns `Conflict`
//! - **Contiguous logs**: Out-of-order appends fail with `SequenceGap`
//! - **Monotonic observations**: A record read at a lower height never replaces a newer one

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, ObservedChannel, Store, StoreExt};
