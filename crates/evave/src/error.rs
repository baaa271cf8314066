//! Error types for the channel coordinator.

use evave_authority::AuthorityError;
use evave_core::{Address, ChannelId, CoreError, Hash32, TransitionError};
use evave_store::StoreError;
use thiserror::Error;

/// Errors that can occur during coordinator operations.
#[derive(Debug, Error)]
pub enum EvaveError {
    /// Encoding, decoding, proof or signature format error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// A transition the local view already shows to be illegal.
    #[error("transition error: {0}")]
    Transition(#[from] TransitionError),

    /// The authority rejected a call.
    #[error("authority error: {0}")]
    Authority(#[from] AuthorityError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The authority returned a record that belongs elsewhere.
    #[error("record mismatch: expected {expected}, got {got}")]
    RecordMismatch { expected: String, got: String },

    /// This party is not a participant of the channel.
    #[error("{0} is not a participant of channel {1}")]
    NotParticipant(Address, ChannelId),

    /// This party does not hold the role the operation requires.
    #[error("{address} is not the {role} of channel {channel_id}")]
    WrongRole {
        address: Address,
        channel_id: ChannelId,
        role: &'static str,
    },

    /// A received update failed validation.
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// A different update or impression is already stored at this sequence.
    #[error("conflict in channel {channel_id} at sequence {sequence}: existing {existing}")]
    Conflict {
        channel_id: ChannelId,
        sequence: u64,
        existing: Hash32,
    },

    /// No impression at this sequence in the local log.
    #[error("impression {sequence} not found in channel {channel_id}")]
    ImpressionNotFound { channel_id: ChannelId, sequence: u64 },
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, EvaveError>;
