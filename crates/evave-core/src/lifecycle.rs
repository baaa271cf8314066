//! Channel lifecycle transitions.
//!
//! Every transition is a pure function of the current record, its inputs and
//! the latest observed authority height. A rejected transition returns a
//! [`TransitionError`] and never a silently unchanged record.
//!
//! Checkpoint finalization is lazy: a proposal whose challenge timeout has
//! passed is final whether or not anyone has submitted the finalization.
//! [`effective_view`] shows the record as it stands at a given height.
//!
//! ```text
//!          propose                 height >= challenge_timeout
//!   Open ───────────► Checkpointing ────────────────────────► Open (root := proposed)
//!    │                     │
//!    │                     └── challenge (newer evidence) ──► Open (root unchanged)
//!    │
//!    └── close_expired (unused, height >= expiration) ──────► Closed
//! ```

use serde::{Deserialize, Serialize};

use crate::canonical::derive_channel_id;
use crate::error::TransitionError;
use crate::record::{ChannelRecord, ChannelState};
use crate::types::{Address, BlockHeight, Hash32};

/// Height windows configured per authority deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleParams {
    /// Blocks an unused channel stays open before it may be closed.
    pub channel_timeout: u64,
    /// Blocks a proposed checkpoint may be challenged.
    pub challenge_period: u64,
}

impl Default for LifecycleParams {
    fn default() -> Self {
        Self {
            channel_timeout: 10,
            challenge_period: 5,
        }
    }
}

/// Result of evaluating lazy finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finalization {
    /// The proposal is final; the record now carries its root.
    Finalized(ChannelRecord),
    /// A proposal is outstanding until `challenge_timeout`.
    Pending { challenge_timeout: BlockHeight },
    /// No proposal is outstanding.
    Nothing,
}

/// Open a channel as the `channel_count`-th of the deployment.
pub fn open(
    contract_id: Address,
    channel_count: u64,
    demand: Address,
    supply: Address,
    height: BlockHeight,
    params: &LifecycleParams,
) -> Result<ChannelRecord, TransitionError> {
    if demand == supply {
        return Err(TransitionError::SameParticipant(demand));
    }

    Ok(ChannelRecord {
        contract_id,
        channel_id: derive_channel_id(channel_count),
        demand,
        supply,
        root: Hash32::ZERO,
        state: ChannelState::Open,
        expiration: window_end(height, params.channel_timeout),
        challenge_timeout: 0,
        proposed_root: Hash32::ZERO,
    })
}

/// Propose `proposed_root` as the next checkpoint.
///
/// A due proposal is finalized first, so proposing after a timeout succeeds.
pub fn propose(
    record: &ChannelRecord,
    proposed_root: Hash32,
    height: BlockHeight,
    params: &LifecycleParams,
) -> Result<ChannelRecord, TransitionError> {
    let current = effective_view(record, height);
    if current.state != ChannelState::Open {
        return Err(TransitionError::IllegalTransition {
            state: current.state,
            action: "propose",
        });
    }

    Ok(ChannelRecord {
        state: ChannelState::Checkpointing,
        proposed_root,
        challenge_timeout: window_end(height, params.challenge_period),
        ..current
    })
}

/// Cancel the outstanding proposal with newer evidence.
///
/// The evidence must carry a strictly greater sequence than the proposal;
/// on a tie the earlier proposal stands.
pub fn challenge(
    record: &ChannelRecord,
    proposal_sequence: u64,
    evidence_sequence: u64,
    height: BlockHeight,
) -> Result<ChannelRecord, TransitionError> {
    if record.state != ChannelState::Checkpointing {
        return Err(TransitionError::IllegalTransition {
            state: record.state,
            action: "challenge",
        });
    }
    if height >= record.challenge_timeout {
        return Err(TransitionError::StaleChallenge {
            height,
            challenge_timeout: record.challenge_timeout,
        });
    }
    if evidence_sequence <= proposal_sequence {
        return Err(TransitionError::EvidenceNotNewer {
            evidence: evidence_sequence,
            proposal: proposal_sequence,
        });
    }

    Ok(ChannelRecord {
        state: ChannelState::Open,
        proposed_root: Hash32::ZERO,
        challenge_timeout: 0,
        ..record.clone()
    })
}

/// Evaluate lazy finalization at `height`.
pub fn finalize(record: &ChannelRecord, height: BlockHeight) -> Finalization {
    if record.state != ChannelState::Checkpointing {
        return Finalization::Nothing;
    }
    if height < record.challenge_timeout {
        return Finalization::Pending {
            challenge_timeout: record.challenge_timeout,
        };
    }

    Finalization::Finalized(ChannelRecord {
        root: record.proposed_root,
        proposed_root: Hash32::ZERO,
        challenge_timeout: 0,
        state: ChannelState::Open,
        ..record.clone()
    })
}

/// Close an unused channel after its expiration.
pub fn close_expired(
    record: &ChannelRecord,
    caller: &Address,
    height: BlockHeight,
) -> Result<ChannelRecord, TransitionError> {
    if !record.is_participant(caller) {
        return Err(TransitionError::NotParticipant(*caller));
    }
    if record.state == ChannelState::Closed {
        return Err(TransitionError::IllegalTransition {
            state: record.state,
            action: "close",
        });
    }
    if record.state == ChannelState::Checkpointing
        || !record.root.is_zero()
        || !record.proposed_root.is_zero()
    {
        return Err(TransitionError::ChannelInUse);
    }
    if height < record.expiration {
        return Err(TransitionError::NotExpired {
            height,
            expiration: record.expiration,
        });
    }

    Ok(ChannelRecord {
        state: ChannelState::Closed,
        ..record.clone()
    })
}

/// The record as it stands at `height`, with any due proposal finalized.
pub fn effective_view(record: &ChannelRecord, height: BlockHeight) -> ChannelRecord {
    match finalize(record, height) {
        Finalization::Finalized(finalized) => finalized,
        Finalization::Pending { .. } | Finalization::Nothing => record.clone(),
    }
}

// Windows close one block after `height + period`.
fn window_end(height: BlockHeight, period: u64) -> BlockHeight {
    height.saturating_add(period).saturating_add(1)
}
