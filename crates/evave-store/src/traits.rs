//! Store trait: the abstract interface for a party's local channel view.
//!
//! The authority is the source of truth for channel records. The store keeps
//! what only the parties know: the impression log behind each root, the
//! signed updates exchanged off-chain, and the last record observed on-chain.

use async_trait::async_trait;
use evave_core::{
    Address, BlockHeight, ChannelId, ChannelRecord, Hash32, ImpressionRecord, SignedUpdate,
};

use crate::error::Result;

/// Result of inserting an impression or an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Inserted successfully.
    Inserted,
    /// The identical entry already exists (idempotent - not an error).
    AlreadyExists,
    /// A different entry exists at the same sequence.
    Conflict {
        /// Leaf hash (impressions) or root (updates) already stored there.
        existing: Hash32,
    },
}

/// A channel record together with the height it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedChannel {
    pub record: ChannelRecord,
    pub observed_at: BlockHeight,
}

/// The Store trait: async interface for local channel persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Idempotent inserts**: Inserting the same impression or update twice
///   returns `AlreadyExists`.
/// - **Conflict detection**: A different entry at an existing sequence returns
///   `Conflict` with what is already stored.
/// - **Contiguous logs**: Impression sequences start at 1 with no gaps;
///   anything else is [`StoreError::SequenceGap`](crate::StoreError::SequenceGap).
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Impression Log
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an impression to a channel's log.
    ///
    /// # Returns
    /// - `Inserted` if `impression.sequence` is the next one.
    /// - `AlreadyExists` if the identical impression is already at that sequence.
    /// - `Conflict` if a different impression is at that sequence.
    async fn put_impression(
        &self,
        channel_id: &ChannelId,
        impression: &ImpressionRecord,
    ) -> Result<InsertResult>;

    /// Get the impression at `sequence`.
    async fn get_impression(
        &self,
        channel_id: &ChannelId,
        sequence: u64,
    ) -> Result<Option<ImpressionRecord>>;

    /// Get impressions with `start <= sequence <= end`, ordered by sequence.
    async fn impressions_range(
        &self,
        channel_id: &ChannelId,
        start: u64,
        end: u64,
    ) -> Result<Vec<ImpressionRecord>>;

    /// Number of impressions in a channel's log (its highest sequence).
    async fn impression_count(&self, channel_id: &ChannelId) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Signed Updates
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a signed update, keyed by channel and sequence.
    async fn put_update(&self, update: &SignedUpdate) -> Result<InsertResult>;

    /// The update with the highest sequence for a channel.
    async fn latest_update(&self, channel_id: &ChannelId) -> Result<Option<SignedUpdate>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Observed Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Record the authority's view of a channel, replacing any older one.
    ///
    /// A record observed at a lower height than the stored one is ignored.
    async fn put_channel(&self, record: &ChannelRecord, observed_at: BlockHeight) -> Result<()>;

    /// Get the last observed record of a channel.
    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Option<ObservedChannel>>;

    /// List known channels, optionally filtered by participant.
    async fn list_channels(&self, participant: Option<&Address>) -> Result<Vec<ChannelId>>;
}

/// Extension trait for common store patterns.
#[async_trait]
pub trait StoreExt: Store {
    /// The full impression log of a channel, ordered by sequence.
    async fn impressions(&self, channel_id: &ChannelId) -> Result<Vec<ImpressionRecord>> {
        let count = self.impression_count(channel_id).await?;
        if count == 0 {
            return Ok(Vec::new());
        }
        self.impressions_range(channel_id, 1, count).await
    }
}

impl<S: Store> StoreExt for S {}
