//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Impression log: one row per leaf, contiguous from sequence 1
        CREATE TABLE impressions (
            channel_id BLOB NOT NULL,         -- 32 bytes
            sequence INTEGER NOT NULL,        -- position in the log, from 1
            impression_id BLOB NOT NULL,      -- 32 bytes
            price BLOB NOT NULL,              -- 16 bytes, big-endian u128
            leaf BLOB NOT NULL,               -- 32 bytes, cached leaf hash
            PRIMARY KEY (channel_id, sequence)
        );

        -- Signed off-chain updates
        CREATE TABLE updates (
            channel_id BLOB NOT NULL,
            sequence INTEGER NOT NULL,
            root BLOB NOT NULL,               -- 32 bytes, root the update commits to
            signer BLOB NOT NULL,             -- 20 bytes
            update_cbor BLOB NOT NULL,        -- CBOR-encoded SignedUpdate
            stored_at INTEGER NOT NULL,       -- local timestamp (Unix ms)
            PRIMARY KEY (channel_id, sequence)
        );

        -- Last authority record observed per channel
        CREATE TABLE channels (
            channel_id BLOB PRIMARY KEY,
            demand BLOB NOT NULL,             -- 20 bytes
            supply BLOB NOT NULL,             -- 20 bytes
            record BLOB NOT NULL,             -- 288 bytes, authority record layout
            observed_at INTEGER NOT NULL      -- authority height of the read
        );

        CREATE INDEX idx_channels_demand ON channels(demand);
        CREATE INDEX idx_channels_supply ON channels(supply);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
