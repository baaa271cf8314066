//! # evave Authority
//!
//! The settlement authority that owns every channel record.
//!
//! ## Overview
//!
//! Parties never mutate channel state directly. They submit intents (open,
//! propose, challenge, finalize, close) to an [`Authority`], which checks the
//! registry and signer policy, applies the lifecycle rules at its current
//! height, and emits a [`LogEvent`] for every accepted change.
//!
//! ## Key Properties
//!
//! - **Single writer**: Calls are serialized; each one executes in its own block
//! - **Lazy finalization**: A due proposal is applied by the next call that touches the channel
//! - **Verifiable**: Records are returned in their nine-word encoding and decoded by the reader
//!
//! ## Usage
//!
//! ```rust,no_run
//! use evave_authority::{Authority, AuthorityConfig, MemoryAuthority};
//! use evave_core::Address;
//!
//! async fn example() {
//!     let owner = Address::from_bytes([1; 20]);
//!     let contract = Address::from_bytes([2; 20]);
//!     let authority = MemoryAuthority::new(AuthorityConfig::new(contract, owner));
//!
//!     // let demand = ...; let supply = ...;
//!     // authority.register_demand(&owner, &demand, "https://demand.example").await?;
//!     // authority.register_supply(&owner, &supply, "https://supply.example").await?;
//!     // let channel_id = authority.open_channel(&demand, &supply).await?;
//!     let _ = authority.channel_count().await;
//! }
//! ```
//!
//! ## Channel Flow
//!
//! ```text
//! open ──> Open ──propose──> Checkpointing ──(timeout)──> Open (root advanced)
//!           │                     │
//!           │                     └──challenge──> Open (root unchanged)
//!           └──(expired, unused)──> Closed
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod memory;
pub mod traits;

pub use config::{AuthorityConfig, SignerRole};
pub use error::{AuthorityError, Result};
pub use event::{EventKind, LogEvent};
pub use memory::MemoryAuthority;
pub use traits::Authority;
