//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL
//! string that transforms the schema from version N to N+1.

use grantlock_core::now_secs;
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

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_secs()],
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
        -- Device verification keys: one row per (user, device), upserted
        CREATE TABLE device_keys (
            user_id TEXT NOT NULL,
            device_id TEXT NOT NULL,
            public_key BLOB NOT NULL,        -- 32 bytes, Ed25519
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,     -- Unix seconds

            PRIMARY KEY (user_id, device_id)
        );

        -- Spent grant markers: the uniqueness constraint on jti is the
        -- replay guard
        CREATE TABLE spent_grants (
            jti TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            device_id TEXT NOT NULL,
            consumed_at INTEGER NOT NULL,    -- Unix seconds
            expires_at INTEGER               -- nullable: NULL never expires
        );

        -- Encrypted records: ciphertext plus clear indexing metadata
        CREATE TABLE records (
            record_id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            category TEXT,
            year INTEGER,
            month INTEGER,
            body_nonce BLOB NOT NULL,        -- 12 bytes
            body_ct BLOB NOT NULL,
            body_tag BLOB NOT NULL,          -- 16 bytes
            created_at INTEGER NOT NULL
        );

        -- Append-only audit trail
        CREATE TABLE audit_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at INTEGER NOT NULL,
            user_id TEXT,
            device_id TEXT,
            jti TEXT,
            endpoint TEXT NOT NULL,
            outcome TEXT NOT NULL,
            targets TEXT NOT NULL,           -- JSON array of record ids
            origin TEXT,
            request_id TEXT,
            extra TEXT NOT NULL              -- JSON object
        );

        -- Indexes for common queries
        CREATE INDEX idx_spent_grants_expires ON spent_grants(expires_at);
        CREATE INDEX idx_records_owner ON records(owner);
        CREATE INDEX idx_records_owner_bucket ON records(owner, year, month);
        CREATE INDEX idx_audit_created ON audit_events(created_at);
        CREATE INDEX idx_audit_user_created ON audit_events(user_id, created_at);
        CREATE INDEX idx_audit_endpoint_created ON audit_events(endpoint, created_at);
        "#,
    )?;

    Ok(())
}
