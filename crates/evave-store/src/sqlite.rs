//! SQLite implementation of the Store trait.
//!
//! This is the persistent backend for a party's local channel view. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use evave_core::{
    decode_record, Address, BlockHeight, ChannelId, ChannelRecord, Hash32, ImpressionRecord,
    SignedUpdate,
};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{InsertResult, ObservedChannel, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// Helper to read a fixed-width blob column
fn blob<const N: usize>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<[u8; N]> {
    let bytes: Vec<u8> = row.get(idx)?;
    bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(idx, format!("blob[{}]", N), rusqlite::types::Type::Blob)
    })
}

// Helper to convert a row to ImpressionRecord
fn row_to_impression(row: &rusqlite::Row<'_>) -> rusqlite::Result<ImpressionRecord> {
    Ok(ImpressionRecord {
        impression_id: Hash32(blob::<32>(row, 0)?),
        price: u128::from_be_bytes(blob::<16>(row, 1)?),
        sequence: row.get::<_, i64>(2)? as u64,
    })
}

fn leaf_of(impression: &ImpressionRecord) -> Result<Hash32> {
    impression
        .leaf_hash()
        .map_err(|e| StoreError::InvalidData(e.to_string()))
}

fn encode_update(update: &SignedUpdate) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(update, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_update(bytes: &[u8]) -> Result<SignedUpdate> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl Store for SqliteStore {
    async fn put_impression(
        &self,
        channel_id: &ChannelId,
        impression: &ImpressionRecord,
    ) -> Result<InsertResult> {
        let channel_id = *channel_id;
        let impression = *impression;
        let leaf = leaf_of(&impression)?;

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let existing: Option<[u8; 32]> = tx
                .query_row(
                    "SELECT leaf FROM impressions WHERE channel_id = ?1 AND sequence = ?2",
                    params![channel_id.as_bytes().as_slice(), impression.sequence as i64],
                    |row| blob::<32>(row, 0),
                )
                .optional()?;

            if let Some(existing) = existing {
                let existing = Hash32(existing);
                if existing == leaf {
                    return Ok(InsertResult::AlreadyExists);
                }
                warn!(
                    channel = %channel_id,
                    sequence = impression.sequence,
                    "conflicting impression at existing sequence"
                );
                return Ok(InsertResult::Conflict { existing });
            }

            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM impressions WHERE channel_id = ?1",
                params![channel_id.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            let expected = count as u64 + 1;
            if impression.sequence != expected {
                return Err(StoreError::SequenceGap {
                    channel_id: channel_id.to_hex(),
                    expected,
                    got: impression.sequence,
                });
            }

            tx.execute(
                "INSERT INTO impressions (channel_id, sequence, impression_id, price, leaf)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    channel_id.as_bytes().as_slice(),
                    impression.sequence as i64,
                    impression.impression_id.0.as_slice(),
                    impression.price.to_be_bytes().as_slice(),
                    leaf.0.as_slice(),
                ],
            )?;
            tx.commit()?;

            debug!(channel = %channel_id, sequence = impression.sequence, "impression appended");
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_impression(
        &self,
        channel_id: &ChannelId,
        sequence: u64,
    ) -> Result<Option<ImpressionRecord>> {
        let channel_id = *channel_id;

        self.run(move |conn| {
            conn.query_row(
                "SELECT impression_id, price, sequence FROM impressions
                 WHERE channel_id = ?1 AND sequence = ?2",
                params![channel_id.as_bytes().as_slice(), sequence as i64],
                row_to_impression,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn impressions_range(
        &self,
        channel_id: &ChannelId,
        start: u64,
        end: u64,
    ) -> Result<Vec<ImpressionRecord>> {
        let channel_id = *channel_id;

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT impression_id, price, sequence FROM impressions
                 WHERE channel_id = ?1 AND sequence >= ?2 AND sequence <= ?3
                 ORDER BY sequence",
            )?;

            let impressions = stmt
                .query_map(
                    params![channel_id.as_bytes().as_slice(), start as i64, end as i64],
                    row_to_impression,
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(impressions)
        })
        .await
    }

    async fn impression_count(&self, channel_id: &ChannelId) -> Result<u64> {
        let channel_id = *channel_id;

        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM impressions WHERE channel_id = ?1",
                params![channel_id.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    async fn put_update(&self, update: &SignedUpdate) -> Result<InsertResult> {
        let update = update.clone();
        let encoded = encode_update(&update)?;

        self.run(move |conn| {
            let channel_id = update.record.channel_id;

            let existing: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT update_cbor FROM updates WHERE channel_id = ?1 AND sequence = ?2",
                    params![channel_id.as_bytes().as_slice(), update.sequence as i64],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing) = existing {
                let existing = decode_update(&existing)?;
                if existing == update {
                    return Ok(InsertResult::AlreadyExists);
                }
                warn!(
                    channel = %channel_id,
                    sequence = update.sequence,
                    "conflicting update at existing sequence"
                );
                return Ok(InsertResult::Conflict {
                    existing: existing.root(),
                });
            }

            conn.execute(
                "INSERT INTO updates (channel_id, sequence, root, signer, update_cbor, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    channel_id.as_bytes().as_slice(),
                    update.sequence as i64,
                    update.root().0.as_slice(),
                    update.signer.0.as_slice(),
                    encoded,
                    now_millis(),
                ],
            )?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn latest_update(&self, channel_id: &ChannelId) -> Result<Option<SignedUpdate>> {
        let channel_id = *channel_id;

        self.run(move |conn| {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT update_cbor FROM updates WHERE channel_id = ?1
                     ORDER BY sequence DESC LIMIT 1",
                    params![channel_id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;

            bytes.map(|b| decode_update(&b)).transpose()
        })
        .await
    }

    async fn put_channel(&self, record: &ChannelRecord, observed_at: BlockHeight) -> Result<()> {
        let record = record.clone();

        self.run(move |conn| {
            let changed = conn.execute(
                "INSERT INTO channels (channel_id, demand, supply, record, observed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(channel_id) DO UPDATE SET
                    record = excluded.record,
                    observed_at = excluded.observed_at
                 WHERE excluded.observed_at >= channels.observed_at",
                params![
                    record.channel_id.as_bytes().as_slice(),
                    record.demand.0.as_slice(),
                    record.supply.0.as_slice(),
                    record.to_bytes(),
                    observed_at as i64,
                ],
            )?;
            if changed == 0 {
                debug!(channel = %record.channel_id, "ignoring older observation");
            }
            Ok(())
        })
        .await
    }

    async fn get_channel(&self, channel_id: &ChannelId) -> Result<Option<ObservedChannel>> {
        let channel_id = *channel_id;

        self.run(move |conn| {
            let row: Option<(Vec<u8>, i64)> = conn
                .query_row(
                    "SELECT record, observed_at FROM channels WHERE channel_id = ?1",
                    params![channel_id.as_bytes().as_slice()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            row.map(|(bytes, observed_at)| {
                let record =
                    decode_record(&bytes).map_err(|e| StoreError::InvalidData(e.to_string()))?;
                Ok(ObservedChannel {
                    record,
                    observed_at: observed_at as u64,
                })
            })
            .transpose()
        })
        .await
    }

    async fn list_channels(&self, participant: Option<&Address>) -> Result<Vec<ChannelId>> {
        let participant = participant.copied();

        self.run(move |conn| {
            let channels = match participant {
                Some(p) => {
                    let mut stmt = conn.prepare(
                        "SELECT channel_id FROM channels
                         WHERE demand = ?1 OR supply = ?1 ORDER BY channel_id",
                    )?;
                    let rows = stmt.query_map(params![p.0.as_slice()], |row| blob::<32>(row, 0))?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt =
                        conn.prepare("SELECT channel_id FROM channels ORDER BY channel_id")?;
                    let rows = stmt.query_map([], |row| blob::<32>(row, 0))?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };

            Ok(channels.into_iter().map(ChannelId::from_bytes).collect())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StoreExt;
    use evave_core::{derive_channel_id, ChannelState, Keypair};

    fn impression(sequence: u64) -> ImpressionRecord {
        ImpressionRecord::new(
            Hash32::from_bytes([sequence as u8; 32]),
            u128::MAX - sequence as u128,
            sequence,
        )
    }

    fn record() -> ChannelRecord {
        ChannelRecord {
            contract_id: Address::from_bytes([0xc0; 20]),
            channel_id: derive_channel_id(0),
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
        let store = SqliteStore::open_memory().unwrap();
        let id = derive_channel_id(0);

        for seq in 1..=4 {
            assert_eq!(
                store.put_impression(&id, &impression(seq)).await.unwrap(),
                InsertResult::Inserted
            );
        }

        assert_eq!(
            store.put_impression(&id, &impression(2)).await.unwrap(),
            InsertResult::AlreadyExists
        );
        let mut forged = impression(2);
        forged.price = 1;
        assert!(matches!(
            store.put_impression(&id, &forged).await.unwrap(),
            InsertResult::Conflict { .. }
        ));
        assert!(matches!(
            store.put_impression(&id, &impression(6)).await,
            Err(StoreError::SequenceGap {
                expected: 5,
                got: 6,
                ..
            })
        ));

        let log = store.impressions(&id).await.unwrap();
        assert_eq!(log, (1..=4).map(impression).collect::<Vec<_>>());
        assert_eq!(store.get_impression(&id, 3).await.unwrap(), Some(impression(3)));
        assert_eq!(store.get_impression(&id, 9).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_updates_roundtrip_through_cbor() {
        let store = SqliteStore::open_memory().unwrap();
        let supply = Keypair::from_secret(&[0x0b; 32]).unwrap();

        let first = SignedUpdate::make(record(), impression(1), 1, &supply).unwrap();
        let second = SignedUpdate::make(
            record().with_root(Hash32::from_bytes([2; 32])),
            impression(2),
            2,
            &supply,
        )
        .unwrap();

        store.put_update(&first).await.unwrap();
        store.put_update(&second).await.unwrap();
        assert_eq!(
            store.put_update(&second).await.unwrap(),
            InsertResult::AlreadyExists
        );

        let latest = store.latest_update(&derive_channel_id(0)).await.unwrap().unwrap();
        assert_eq!(latest, second);
        assert!(latest.verify(&supply.address()));
    }

    #[tokio::test]
    async fn test_channels() {
        let store = SqliteStore::open_memory().unwrap();
        let mut r = record();
        store.put_channel(&r, 4).await.unwrap();

        r.state = ChannelState::Closed;
        store.put_channel(&r, 2).await.unwrap();
        let observed = store.get_channel(&r.channel_id).await.unwrap().unwrap();
        assert_eq!(observed.record.state, ChannelState::Open);
        assert_eq!(observed.observed_at, 4);

        store.put_channel(&r, 9).await.unwrap();
        let observed = store.get_channel(&r.channel_id).await.unwrap().unwrap();
        assert_eq!(observed.record, r);

        assert_eq!(
            store.list_channels(Some(&r.supply)).await.unwrap(),
            vec![r.channel_id]
        );
        assert!(store
            .list_channels(Some(&Address::from_bytes([0xff; 20])))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evave.db");
        let id = derive_channel_id(0);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put_impression(&id, &impression(1)).await.unwrap();
            store.put_channel(&record(), 3).await.unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.impression_count(&id).await.unwrap(), 1);
        assert!(store.get_channel(&id).await.unwrap().is_some());
    }
}
