//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{debug, warn};

use evave_core::{
    Address, BlockHeight, ChannelId, ChannelRecord, ImpressionRecord, SignedUpdate,
};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, ObservedChannel, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Impression logs, ordered by sequence.
    impressions: HashMap<ChannelId, BTreeMap<u64, ImpressionRecord>>,

    /// Signed updates, ordered by sequence.
    updates: HashMap<ChannelId, BTreeMap<u64, SignedUpdate>>,

    /// Last observed authority records.
    channels: HashMap<ChannelId, ObservedChannel>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_impression(
        &self,
        channel_id: &ChannelId,
        impression: &ImpressionRecord,
    ) -> Result<InsertResult> {
        let mut inner = self.write()?;
        let log = inner.impressions.entry(*channel_id).or_default();

        if let Some(existing) = log.get(&impression.sequence) {
            if existing == impression {
                return Ok(InsertResult::AlreadyExists);
            }
            warn!(
                channel = %channel_id,
                sequence = impression.sequence,
                "conflicting impression at existing sequence"
            );
            return Ok(InsertResult::Conflict {
                existing: existing.leaf_hash().map_err(|e| StoreError::InvalidData(e.to_string()))?,
            });
        }

        let expected = log.len() as u64 + 1;
        if impression.sequence != expected {
            return Err(StoreError::SequenceGap {
                channel_id: channel_id.to_hex(),
                expected,
                got: impression.sequence,
            });
        }

        log.insert(impression.sequence, *impression);
        debug!(channel = %channel_id, sequence = impression.sequence, "impression appended");
        Ok(InsertResult::Inserted)
    }

    async fn get_impression(
        &self,
        channel_id: &ChannelId,
        sequence: u64,
    ) -> Result<Option<ImpressionRecord>> {
        let inner = self.read()?;
        Ok(inner
            .impressions
            .get(channel_id)
            .and_then(|log| log.get(&sequence))
            .copied())
    }

    async fn impressions_range(
        &self,
        channel_id: &ChannelId,
        start: u64,
        end: u64,
    ) -> Result<Vec<ImpressionRecord>> {
        if start > end {
            return Ok(Vec::new());
        }
        let inner = self.read()?;
        Ok(inner
            .impressions
            .get(channel_id)
            .map(|log| log.range(start..=end).map(|(_, i)| *i).collect())
            .unwrap_or_default())
    }

    async fn impression_count(&self, channel_id: &ChannelId) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner
            .impressions
            .get(channel_id)
            .map_or(0, |log| log.len() as u64))
    }

    async fn put_update(&self, update: &SignedUpdate) -> Result<InsertResult> {
        let mut inner = self.write()?;
        let updates = inner.updates.entry(update.record.channel_id).or_default();

        if let Some(existing) = updates.get(&update.sequence) {
            if existing == update {
                return Ok(InsertResult::AlreadyExists);
            }
            warn!(
                channel = %update.record.channel_id,
                sequence = update.sequence,
                "conflicting update at existing sequence"
            );
            return Ok(InsertResult::Conflict {
                existing: existing.root(),
            });
        }

        updates.insert(update.sequence, update.clone());
        Ok(InsertResult::Inserted)
    }

    async fn latest_update(&self, channel_id: &ChannelId) -> Result<Option<SignedUpdate>> {
        let inner = self.read()?;
        Ok(inner
            .updates
            .get(channel_id)
            .and_then(|u| u.last_key_value())
            .map(|(_, u)| u.clone()))
    }

    async fn put_channel(&self, record: &ChannelRecord, observed_at: BlockHeight) -> Result<()> {
        let mut inner = self.write()?;
        if let Some(existing) = inner.channels.get(&record.channel_id) {
            if existing.observed_at > observed_at {
                debug!(channel = %record.channel_id, "ignoring older observation");
                return Ok(());
            }
        }
        inner.channels.insert(
            record.channel_id,
            ObservedChannel {
                record: record.clone(),
                observed_at,
            },
        );
        Ok(())
    }

    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Option<ObservedChannel>> {
        let inner = self.read()?;
        Ok(inner.channels.get(channel_id).cloned())
    }

    async fn list_channels(&self, participant: Option<&Address>) -> Result<Vec<ChannelId>> {
        let inner = self.read()?;
        let mut channels: Vec<ChannelId> = inner
            .channels
            .values()
            .filter(|c| participant.map_or(true, |p| c.record.is_participant(p)))
            .map(|c| c.record.channel_id)
            .collect();
        channels.sort();
        Ok(channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;
    use evave_core::{derive_channel_id, ChannelState, Hash32, Keypair};

    fn impression(sequence: u64) -> ImpressionRecord {
        ImpressionRecord::new(Hash32::from_bytes([sequence as u8; 32]), 100, sequence)
    }

    fn record(count: u64) -> ChannelRecord {
        ChannelRecord {
            contract_id: Address::from_bytes([0xc0; 20]),
            channel_id: derive_channel_id(count),
            demand: Address::from_bytes([0x0a; 20]),
            supply: Address::from_bytes([0x0b; 20]),
            root: Hash32::ZERO,
            state: ChannelState::Open,
            expiration: 11,
            challenge_timeout: 0,
            proposed_root: Hash32::ZERO,
        }
    }

    #[tokio::test]
    async fn test_impression_log() {
        let store = MemoryStore::new();
        let id = derive_channel_id(0);

        for seq in 1..=3 {
            assert_eq!(
                store.put_impression(&id, &impression(seq)).await.unwrap(),
                InsertResult::Inserted
            );
        }
        assert_eq!(store.impression_count(&id).await.unwrap(), 3);
        assert_eq!(store.impressions(&id).await.unwrap().len(), 3);
        assert_eq!(
            store.get_impression(&id, 2).await.unwrap(),
            Some(impression(2))
        );
        assert_eq!(store.impressions_range(&id, 2, 3).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_impression_idempotent_and_conflict() {
        let store = MemoryStore::new();
        let id = derive_channel_id(0);
        store.put_impression(&id, &impression(1)).await.unwrap();

        assert_eq!(
            store.put_impression(&id, &impression(1)).await.unwrap(),
            InsertResult::AlreadyExists
        );

        let mut other = impression(1);
        other.price = 999;
        assert_eq!(
            store.put_impression(&id, &other).await.unwrap(),
            InsertResult::Conflict {
                existing: impression(1).leaf_hash().unwrap()
            }
        );
    }

    #[tokio::test]
    async fn test_impression_gap_rejected() {
        let store = MemoryStore::new();
        let id = derive_channel_id(0);
        let err = store.put_impression(&id, &impression(2)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::SequenceGap {
                expected: 1,
                got: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_latest_update() {
        let store = MemoryStore::new();
        let supply = Keypair::from_secret(&[0x0b; 32]).unwrap();

        assert!(store.latest_update(&derive_channel_id(0)).await.unwrap().is_none());

        for seq in [1, 3, 2] {
            let update =
                SignedUpdate::make(record(0), impression(seq), seq, &supply).unwrap();
            assert_eq!(
                store.put_update(&update).await.unwrap(),
                InsertResult::Inserted
            );
        }
        let latest = store.latest_update(&derive_channel_id(0)).await.unwrap().unwrap();
        assert_eq!(latest.sequence, 3);
    }

    #[tokio::test]
    async fn test_observed_channel_keeps_newest() {
        let store = MemoryStore::new();
        let mut r = record(0);
        store.put_channel(&r, 5).await.unwrap();

        r.state = ChannelState::Checkpointing;
        store.put_channel(&r, 3).await.unwrap();
        let observed = store.get_channel(&r.channel_id).await.unwrap().unwrap();
        assert_eq!(observed.observed_at, 5);
        assert_eq!(observed.record.state, ChannelState::Open);

        store.put_channel(&r, 6).await.unwrap();
        let observed = store.get_channel(&r.channel_id).await.unwrap().unwrap();
        assert_eq!(observed.record.state, ChannelState::Checkpointing);
    }

    #[tokio::test]
    async fn test_list_channels_by_participant() {
        let store = MemoryStore::new();
        store.put_channel(&record(0), 1).await.unwrap();
        let mut other = record(1);
        other.demand = Address::from_bytes([0x0c; 20]);
        other.supply = Address::from_bytes([0x0d; 20]);
        store.put_channel(&other, 1).await.unwrap();

        assert_eq!(store.list_channels(None).await.unwrap().len(), 2);
        assert_eq!(
            store
                .list_channels(Some(&Address::from_bytes([0x0a; 20])))
                .await
                .unwrap(),
            vec![derive_channel_id(0)]
        );
    }
}
