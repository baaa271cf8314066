//! Error types for the authority module.

use thiserror::Error;

use evave_core::{Address, ChannelId, CoreError, TransitionError};

/// Rejections from the settlement authority.
///
/// A rejected call leaves all channel and registry state unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    /// The lifecycle rules refused the transition.
    #[error("transition rejected: {0}")]
    Transition(#[from] TransitionError),

    /// No channel with this identifier exists.
    #[error("channel not found: {0}")]
    ChannelNotFound(ChannelId),

    /// The address is not registered in the required role.
    #[error("{0} is not registered")]
    NotRegistered(Address),

    /// The caller may not perform this action.
    #[error("{caller} is not authorized to {action}")]
    Unauthorized {
        caller: Address,
        action: &'static str,
    },

    /// A signature did not recover to the required signer.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// A registry url is empty or too long.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Encoding, decoding or signature format error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

impl AuthorityError {
    /// Whether re-reading the channel and re-deriving the call may succeed.
    ///
    /// True only for a transition that became illegal through a concurrent
    /// change to the channel. Fingerprints cover no lifecycle field, so a
    /// signature that fails once fails on every resubmission: authentication
    /// failures are final, as are stale challenges, format errors and
    /// authorization failures.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AuthorityError::Transition(TransitionError::IllegalTransition { .. })
        )
    }
}

/// Result type for authority operations.
pub type Result<T> = std::result::Result<T, AuthorityError>;
