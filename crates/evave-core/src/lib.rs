//! # evave Core
//!
//! Pure primitives for evave impression channels: canonical encoding, the
//! Merkle impression log, channel fingerprints and the lifecycle rules.
//!
//! This crate contains no I/O, no storage, no networking, and no clock. Heights
//! are always passed in by the caller.
//!
//! ## Key Types
//!
//! - [`ChannelRecord`] - The authoritative snapshot of a channel
//! - [`ChannelId`] - Identifier minted from the authority's channel counter
//! - [`ImpressionRecord`] - A leaf of the off-chain impression log
//! - [`MerkleTree`] / [`MerkleProof`] - Commitments and inclusion proofs
//! - [`RecoverableSignature`] - 65-byte secp256k1 signature with recovery byte
//! - [`SignedUpdate`] - An off-chain update exchanged between the parties
//!
//! ## Compatibility
//!
//! Hashes, fingerprints and the record layout must match the settlement
//! authority byte for byte. See [`canonical`] and [`fingerprint`].

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod fingerprint;
pub mod lifecycle;
pub mod merkle;
pub mod record;
pub mod types;

pub use canonical::{decode_record, derive_channel_id, encode, encode_record, Token};
pub use crypto::{keccak256, recover_signer, Keypair, RecoverableSignature};
pub use error::{CoreError, TransitionError};
pub use fingerprint::{
    fingerprint, verify_signature, ChallengeEvidence, MessageKind, SignedUpdate,
};
pub use lifecycle::{effective_view, Finalization, LifecycleParams};
pub use merkle::{verify, MerkleProof, MerkleTree, PairOrdering, ProofStep};
pub use record::{ChannelRecord, ChannelState, ImpressionRecord};
pub use types::{Address, BlockHeight, ChannelId, Hash32};
