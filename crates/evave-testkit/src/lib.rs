//! # evave Testkit
//!
//! Testing utilities for evave channels.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known hashes, addresses and channel ids for cross-implementation checks
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A two-party deployment over the in-memory authority
//!
//! ## Golden Vectors
//!
//! ```rust
//! use evave_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, computed) in verify_all_vectors() {
//!     assert!(matches, "{}: {}", name, computed);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use evave_testkit::generators::impression_log;
//!
//! proptest! {
//!     #[test]
//!     fn root_is_deterministic(log in impression_log(16)) {
//!         let a = MerkleTree::from_impressions(&log).unwrap().root();
//!         let b = MerkleTree::from_impressions(&log).unwrap().root();
//!         prop_assert_eq!(a, b);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use evave_testkit::fixtures::Deployment;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let deployment = Deployment::new().await?;
//!     let record = deployment.open().await?;
//!     deployment.mine(10).await;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{impression_id, Deployment, MemoryManager};
