//! Error types for evave core.

use thiserror::Error;

use crate::record::ChannelState;
use crate::types::{Address, BlockHeight};

/// Errors from encoding, decoding, proofs and signatures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A field could not be canonically encoded (empty, oversized, malformed).
    #[error("encoding error: {0}")]
    EncodingError(String),

    /// Bytes returned by the authority do not match its record layout.
    #[error("decoding error: {0}")]
    DecodingError(String),

    /// Signature bytes cannot be parsed.
    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    /// Signature parsed but no public key could be recovered from it.
    #[error("signer recovery failed")]
    RecoveryFailed,

    /// Merkle proof request or proof shape is invalid.
    #[error("invalid proof: {0}")]
    InvalidProof(String),

    /// Secret key bytes are not a valid secp256k1 scalar.
    #[error("invalid secret key")]
    InvalidSecretKey,

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// Rejections from the channel lifecycle rules.
///
/// A rejected transition leaves the record unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("illegal transition: cannot {action} a channel in state {state:?}")]
    IllegalTransition {
        state: ChannelState,
        action: &'static str,
    },

    #[error("challenge too late: height {height} >= challenge timeout {challenge_timeout}")]
    StaleChallenge {
        height: BlockHeight,
        challenge_timeout: BlockHeight,
    },

    #[error("evidence sequence {evidence} does not exceed proposal sequence {proposal}")]
    EvidenceNotNewer { evidence: u64, proposal: u64 },

    #[error("demand and supply must differ: {0}")]
    SameParticipant(Address),

    #[error("{0} is not a participant of this channel")]
    NotParticipant(Address),

    #[error("channel has not expired: height {height} < expiration {expiration}")]
    NotExpired {
        height: BlockHeight,
        expiration: BlockHeight,
    },

    #[error("channel has been used and cannot be closed by expiration")]
    ChannelInUse,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
