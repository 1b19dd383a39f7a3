//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for grantlock. It uses rusqlite
//! with bundled SQLite, wrapped in async via tokio::spawn_blocking. The
//! `spent_grants` primary key on `jti` is what makes grant consumption
//! atomic: `INSERT OR IGNORE` under the connection lock either claims the
//! jti or observes it claimed.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use grantlock_core::{
    AuditEvent, AuditOutcome, DeviceId, DeviceKey, Ed25519PublicKey, EncryptedRecord, RecordId,
    RecordMeta, SealedParts, SpentGrant, UserId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ConsumeResult, Store};

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
}

fn lock_conn(conn: &Arc<Mutex<Connection>>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            Some(format!("mutex poisoned: {}", e)),
        ))
    })
}

// Helper to convert a row to an EncryptedRecord
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<EncryptedRecord> {
    let nonce_bytes: Vec<u8> = row.get("body_nonce")?;
    let tag_bytes: Vec<u8> = row.get("body_tag")?;

    let nonce: [u8; 12] = nonce_bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(5, "body_nonce".into(), rusqlite::types::Type::Blob)
    })?;
    let tag: [u8; 16] = tag_bytes.try_into().map_err(|_| {
        rusqlite::Error::InvalidColumnType(7, "body_tag".into(), rusqlite::types::Type::Blob)
    })?;

    Ok(EncryptedRecord {
        id: RecordId(row.get("record_id")?),
        owner: UserId::new(row.get::<_, String>("owner")?),
        category: row.get("category")?,
        year: row.get("year")?,
        month: row.get("month")?,
        body: SealedParts {
            nonce,
            ciphertext: row.get("body_ct")?,
            tag,
        },
        created_at: row.get("created_at")?,
    })
}

// Helper to convert a row to an AuditEvent
fn row_to_audit(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let outcome_str: String = row.get("outcome")?;
    let outcome = match outcome_str.as_str() {
        "success" => AuditOutcome::Success,
        "replay" => AuditOutcome::Replay,
        "denied" => AuditOutcome::Denied,
        _ => AuditOutcome::Error,
    };

    let targets_json: String = row.get("targets")?;
    let targets: Vec<RecordId> = serde_json::from_str::<Vec<i64>>(&targets_json)
        .unwrap_or_default()
        .into_iter()
        .map(RecordId)
        .collect();

    let extra_json: String = row.get("extra")?;
    let extra = serde_json::from_str(&extra_json).unwrap_or(serde_json::Value::Null);

    Ok(AuditEvent {
        created_at: row.get("created_at")?,
        user: row.get::<_, Option<String>>("user_id")?.map(UserId::new),
        device_id: row
            .get::<_, Option<String>>("device_id")?
            .map(DeviceId::new),
        jti: row.get("jti")?,
        endpoint: row.get("endpoint")?,
        outcome,
        targets,
        origin: row.get("origin")?,
        request_id: row.get("request_id")?,
        extra,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_device_key(&self, key: &DeviceKey) -> Result<()> {
        let key = key.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            conn.execute(
                "INSERT INTO device_keys (user_id, device_id, public_key, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, device_id) DO UPDATE SET
                     public_key = excluded.public_key,
                     is_active = excluded.is_active,
                     created_at = excluded.created_at",
                params![
                    key.user.as_str(),
                    key.device_id.as_str(),
                    key.public_key.as_bytes().as_slice(),
                    key.is_active,
                    key.created_at,
                ],
            )?;
            debug!(user = %key.user, device = %key.device_id, "device key upserted");
            Ok(())
        })
        .await
        .map_err(|e| StoreError::InvalidData(format!("task join: {e}")))?
    }

    async fn get_active_device_key(
        &self,
        user: &UserId,
        device_id: &DeviceId,
    ) -> Result<Option<Ed25519PublicKey>> {
        let user = user.clone();
        let device_id = device_id.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT public_key FROM device_keys
                     WHERE user_id = ?1 AND device_id = ?2 AND is_active = 1",
                    params![user.as_str(), device_id.as_str()],
                    |row| row.get(0),
                )
                .optional()?;

            match bytes {
                Some(b) => {
                    let arr: [u8; 32] = b.try_into().map_err(|_| {
                        StoreError::InvalidData("stored public key is not 32 bytes".into())
                    })?;
                    Ok(Some(Ed25519PublicKey::from_bytes(arr)))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| StoreError::InvalidData(format!("task join: {e}")))?
    }

    async fn deactivate_device_key(&self, user: &UserId, device_id: &DeviceId) -> Result<bool> {
        let user = user.clone();
        let device_id = device_id.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            let changed = conn.execute(
                "UPDATE device_keys SET is_active = 0
                 WHERE user_id = ?1 AND device_id = ?2 AND is_active = 1",
                params![user.as_str(), device_id.as_str()],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(|e| StoreError::InvalidData(format!("task join: {e}")))?
    }

    async fn consume_grant(&self, marker: &SpentGrant) -> Result<ConsumeResult> {
        let marker = marker.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;

            // Purge markers past their TTL, then claim the jti. Both run
            // under the connection lock, so concurrent consumers of the
            // same jti serialize and exactly one insert wins.
            conn.execute(
                "DELETE FROM spent_grants
                 WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![marker.consumed_at],
            )?;

            let inserted = conn.execute(
                "INSERT OR IGNORE INTO spent_grants
                     (jti, user_id, device_id, consumed_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    marker.jti,
                    marker.user.as_str(),
                    marker.device_id.as_str(),
                    marker.consumed_at,
                    marker.expires_at,
                ],
            )?;

            if inserted == 1 {
                Ok(ConsumeResult::Consumed)
            } else {
                debug!(jti = %marker.jti, "grant replay detected");
                Ok(ConsumeResult::Replayed)
            }
        })
        .await
        .map_err(|e| StoreError::InvalidData(format!("task join: {e}")))?
    }

    async fn insert_record(
        &self,
        owner: &UserId,
        meta: &RecordMeta,
        body: &SealedParts,
        created_at: i64,
    ) -> Result<RecordId> {
        let owner = owner.clone();
        let meta = meta.clone();
        let body = body.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            conn.execute(
                "INSERT INTO records
                     (owner, category, year, month, body_nonce, body_ct, body_tag, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    owner.as_str(),
                    meta.category,
                    meta.year,
                    meta.month,
                    body.nonce.as_slice(),
                    body.ciphertext,
                    body.tag.as_slice(),
                    created_at,
                ],
            )?;
            Ok(RecordId(conn.last_insert_rowid()))
        })
        .await
        .map_err(|e| StoreError::InvalidData(format!("task join: {e}")))?
    }

    async fn get_records_owned(
        &self,
        owner: &UserId,
        ids: &[RecordId],
    ) -> Result<Vec<EncryptedRecord>> {
        let owner = owner.clone();
        let ids = ids.to_vec();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            let mut records = Vec::with_capacity(ids.len());

            for id in ids {
                let record = conn
                    .query_row(
                        "SELECT record_id, owner, category, year, month,
                                body_nonce, body_ct, body_tag, created_at
                         FROM records
                         WHERE record_id = ?1 AND owner = ?2",
                        params![id.0, owner.as_str()],
                        row_to_record,
                    )
                    .optional()?;

                if let Some(r) = record {
                    records.push(r);
                }
            }

            Ok(records)
        })
        .await
        .map_err(|e| StoreError::InvalidData(format!("task join: {e}")))?
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        let event = event.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let targets_json = serde_json::to_string(
                &event.targets.iter().map(|t| t.0).collect::<Vec<i64>>(),
            )
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let extra_json = serde_json::to_string(&event.extra)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            let conn = lock_conn(&conn)?;
            conn.execute(
                "INSERT INTO audit_events
                     (created_at, user_id, device_id, jti, endpoint, outcome,
                      targets, origin, request_id, extra)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    event.created_at,
                    event.user.as_ref().map(|u| u.as_str()),
                    event.device_id.as_ref().map(|d| d.as_str()),
                    event.jti,
                    event.endpoint,
                    event.outcome.as_str(),
                    targets_json,
                    event.origin,
                    event.request_id,
                    extra_json,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::InvalidData(format!("task join: {e}")))?
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn)?;
            let mut stmt = conn.prepare(
                "SELECT created_at, user_id, device_id, jti, endpoint, outcome,
                        targets, origin, request_id, extra
                 FROM audit_events
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1",
            )?;

            let events = stmt
                .query_map(params![limit as i64], row_to_audit)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(events)
        })
        .await
        .map_err(|e| StoreError::InvalidData(format!("task join: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grantlock_core::{now_secs, DeviceKeypair};

    fn marker(jti: &str, consumed_at: i64, ttl: Option<i64>) -> SpentGrant {
        SpentGrant {
            jti: jti.into(),
            user: UserId::new("u1"),
            device_id: DeviceId::new("d1"),
            consumed_at,
            expires_at: ttl.map(|t| consumed_at + t),
        }
    }

    #[tokio::test]
    async fn test_device_key_upsert_and_lookup() {
        let store = SqliteStore::open_memory().unwrap();
        let user = UserId::new("u1");
        let device = DeviceId::new("d1");

        assert_eq!(
            store.get_active_device_key(&user, &device).await.unwrap(),
            None
        );

        let pk1 = DeviceKeypair::generate().public_key();
        let pk2 = DeviceKeypair::generate().public_key();

        for pk in [pk1, pk2] {
            store
                .upsert_device_key(&DeviceKey {
                    user: user.clone(),
                    device_id: device.clone(),
                    public_key: pk,
                    is_active: true,
                    created_at: now_secs(),
                })
                .await
                .unwrap();
        }

        // Second registration replaced the first; no duplicate rows.
        assert_eq!(
            store.get_active_device_key(&user, &device).await.unwrap(),
            Some(pk2)
        );
    }

    #[tokio::test]
    async fn test_consume_is_exclusive() {
        let store = SqliteStore::open_memory().unwrap();
        let m = marker("jti-x", 1000, Some(300));

        assert_eq!(
            store.consume_grant(&m).await.unwrap(),
            ConsumeResult::Consumed
        );
        assert_eq!(
            store.consume_grant(&m).await.unwrap(),
            ConsumeResult::Replayed
        );
    }

    #[tokio::test]
    async fn test_consume_after_marker_expiry() {
        let store = SqliteStore::open_memory().unwrap();
        store
            .consume_grant(&marker("jti-x", 1000, Some(300)))
            .await
            .unwrap();
        assert_eq!(
            store
                .consume_grant(&marker("jti-x", 1301, Some(300)))
                .await
                .unwrap(),
            ConsumeResult::Consumed
        );
    }

    #[tokio::test]
    async fn test_record_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let owner = UserId::new("u1");
        let body = SealedParts {
            nonce: [7u8; 12],
            ciphertext: vec![1, 2, 3, 4],
            tag: [9u8; 16],
        };
        let meta = RecordMeta {
            category: Some("groceries".into()),
            year: Some(2026),
            month: Some(8),
        };

        let id = store
            .insert_record(&owner, &meta, &body, now_secs())
            .await
            .unwrap();

        let fetched = store.get_records_owned(&owner, &[id]).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].body, body);
        assert_eq!(fetched[0].category.as_deref(), Some("groceries"));

        // Not visible to another owner.
        assert!(store
            .get_records_owned(&UserId::new("u2"), &[id])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_audit_roundtrip_newest_first() {
        let store = SqliteStore::open_memory().unwrap();

        let mut first = AuditEvent::new("ingest", AuditOutcome::Success, 1000);
        first.user = Some(UserId::new("u1"));
        first.jti = Some("j1".into());
        first.targets = vec![RecordId(4)];
        first.extra = serde_json::json!({"note": "ok"});

        let second = AuditEvent::new("decrypt", AuditOutcome::Denied, 1001);

        store.append_audit(&first).await.unwrap();
        store.append_audit(&second).await.unwrap();

        let events = store.list_audit(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].endpoint, "decrypt");
        assert_eq!(events[1], first);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .consume_grant(&marker("jti-disk", 1000, None))
                .await
                .unwrap();
        }

        // Marker survives reopen.
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store
                .consume_grant(&marker("jti-disk", 1001, None))
                .await
                .unwrap(),
            ConsumeResult::Replayed
        );
    }
}
