//! Channel and impression records.
//!
//! A [`ChannelRecord`] is the canonical in-memory snapshot of a channel, in the
//! same field order the settlement authority stores it. An
//! [`ImpressionRecord`] is a single leaf of the off-chain impression log.

use serde::{Deserialize, Serialize};

use crate::canonical::{encode_record, hash_tokens, Token};
use crate::error::Result;
use crate::types::{Address, BlockHeight, ChannelId, Hash32};

/// Lifecycle tag of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelState {
    /// Open for off-chain updates; no proposal outstanding.
    Open = 0,
    /// A checkpoint has been proposed and is inside its challenge period.
    Checkpointing = 1,
    /// Closed; terminal.
    Closed = 2,
}

impl ChannelState {
    /// Convert to the authority's tag.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Convert from the authority's tag.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Open),
            1 => Some(Self::Checkpointing),
            2 => Some(Self::Closed),
            _ => None,
        }
    }
}

/// The authoritative snapshot of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    /// The settlement authority instance.
    pub contract_id: Address,
    /// Minted from the authority's channel counter.
    pub channel_id: ChannelId,
    /// The demand participant.
    pub demand: Address,
    /// The supply participant.
    pub supply: Address,
    /// Agreed Merkle root as of the last checkpoint.
    pub root: Hash32,
    /// Lifecycle tag.
    pub state: ChannelState,
    /// Height after which an unused channel may be closed.
    pub expiration: BlockHeight,
    /// Height after which `proposed_root` becomes final.
    pub challenge_timeout: BlockHeight,
    /// Pending root, zero when no proposal is outstanding.
    pub proposed_root: Hash32,
}

impl ChannelRecord {
    /// Whether `address` is one of the two participants.
    pub fn is_participant(&self, address: &Address) -> bool {
        *address == self.demand || *address == self.supply
    }

    /// The other participant, if `address` is one of them.
    pub fn counterparty(&self, address: &Address) -> Option<Address> {
        if *address == self.demand {
            Some(self.supply)
        } else if *address == self.supply {
            Some(self.demand)
        } else {
            None
        }
    }

    /// Whether a checkpoint proposal is outstanding.
    pub fn has_proposal(&self) -> bool {
        self.state == ChannelState::Checkpointing
    }

    /// A copy of this record with `root` replaced, as signed for a proposal.
    pub fn with_root(&self, root: Hash32) -> Self {
        Self {
            root,
            ..self.clone()
        }
    }

    /// The authority's nine-word encoding of this record.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_record(self)
    }
}

/// A single impression in a channel's off-chain log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImpressionRecord {
    /// Identifier assigned by the supply party.
    pub impression_id: Hash32,
    /// Price in the smallest settlement unit.
    pub price: u128,
    /// Position in the log, starting at 1.
    pub sequence: u64,
}

impl ImpressionRecord {
    /// Create a new impression record.
    pub fn new(impression_id: Hash32, price: u128, sequence: u64) -> Self {
        Self {
            impression_id,
            price,
            sequence,
        }
    }

    /// The content address of this impression: its Merkle leaf.
    pub fn leaf_hash(&self) -> Result<Hash32> {
        hash_tokens(&[
            Token::Bytes32(self.impression_id),
            Token::Uint(self.price),
            Token::Uint64(self.sequence),
        ])
    }
}
