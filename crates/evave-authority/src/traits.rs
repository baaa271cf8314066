//! Authority trait: the narrow read/write interface to the settlement ledger.
//!
//! The authority is the single source of truth for channel records. Parties
//! issue intents through it and reconcile their local views from its reads;
//! nothing here is cached on the caller's side.

use async_trait::async_trait;
use evave_core::{
    Address, BlockHeight, ChallengeEvidence, ChannelId, Hash32, RecoverableSignature,
};

use crate::error::Result;
use crate::event::LogEvent;

/// Async interface to a settlement authority.
///
/// Mutating calls take the caller's address explicitly, the way a ledger sees
/// the sender of a transaction.
#[async_trait]
pub trait Authority: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────────────────

    /// Open a channel with `caller` as demand. Both parties must be registered.
    async fn open_channel(&self, caller: &Address, supply: &Address) -> Result<ChannelId>;

    /// The raw nine-word record of a channel.
    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Vec<u8>>;

    /// Propose `proposed_root`, covering `sequence` impressions, as the next checkpoint.
    ///
    /// `signature` is over the `Proposal { sequence }` fingerprint of the
    /// record carrying `proposed_root`, by the signer the authority's policy
    /// requires. A sequence other than the signed one fails authentication.
    async fn propose_checkpoint(
        &self,
        caller: &Address,
        channel_id: &ChannelId,
        proposed_root: Hash32,
        sequence: u64,
        signature: &RecoverableSignature,
    ) -> Result<()>;

    /// Cancel the outstanding proposal with newer evidence.
    async fn challenge_checkpoint(
        &self,
        caller: &Address,
        channel_id: &ChannelId,
        evidence: &ChallengeEvidence,
        signature: &RecoverableSignature,
    ) -> Result<()>;

    /// Apply a due finalization. Returns whether a proposal was finalized.
    async fn finalize_checkpoint(&self, caller: &Address, channel_id: &ChannelId) -> Result<bool>;

    /// Close an unused channel past its expiration.
    async fn close_expired_channel(&self, caller: &Address, channel_id: &ChannelId) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Deployment
    // ─────────────────────────────────────────────────────────────────────────

    /// Number of channels opened so far.
    async fn channel_count(&self) -> Result<u64>;

    async fn channel_timeout(&self) -> Result<u64>;

    async fn challenge_period(&self) -> Result<u64>;

    /// Address of this authority instance.
    async fn contract_id(&self) -> Result<Address>;

    /// Height of the latest block.
    async fn block_number(&self) -> Result<BlockHeight>;

    // ─────────────────────────────────────────────────────────────────────────
    // Registry
    // ─────────────────────────────────────────────────────────────────────────

    async fn register_demand(&self, caller: &Address, demand: &Address, url: &str) -> Result<()>;

    async fn register_supply(&self, caller: &Address, supply: &Address, url: &str) -> Result<()>;

    async fn deregister_demand(&self, caller: &Address, demand: &Address) -> Result<()>;

    async fn deregister_supply(&self, caller: &Address, supply: &Address) -> Result<()>;

    /// Replace the caller's own demand url.
    async fn update_demand_url(&self, caller: &Address, url: &str) -> Result<()>;

    /// Replace the caller's own supply url.
    async fn update_supply_url(&self, caller: &Address, url: &str) -> Result<()>;

    /// The demand url of `demand`; empty when not registered.
    async fn registered_demand(&self, demand: &Address) -> Result<String>;

    /// The supply url of `supply`; empty when not registered.
    async fn registered_supply(&self, supply: &Address) -> Result<String>;

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    /// Logs emitted at or after `from_height`, in emission order.
    async fn logs(&self, from_height: BlockHeight) -> Result<Vec<LogEvent>>;
}
