//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use grantlock_core::{
    AuditEvent, DeviceId, DeviceKey, Ed25519PublicKey, EncryptedRecord, RecordId, RecordMeta,
    SealedParts, SpentGrant, UserId,
};

use crate::error::Result;
use crate::traits::{ConsumeResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via a single
/// Mutex, which also makes `consume_grant` a check-and-insert under one
/// lock acquisition.
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Device keys indexed by (user, device_id).
    device_keys: HashMap<(UserId, DeviceId), DeviceKey>,

    /// Spent grant markers indexed by jti.
    spent: HashMap<String, SpentGrant>,

    /// Encrypted records by id, ordered.
    records: BTreeMap<RecordId, EncryptedRecord>,

    /// Next record id.
    next_record_id: i64,

    /// Append-only audit log, oldest first.
    audit: Vec<AuditEvent>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryStoreInner {
                device_keys: HashMap::new(),
                spent: HashMap::new(),
                records: BTreeMap::new(),
                next_record_id: 1,
                audit: Vec::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_device_key(&self, key: &DeviceKey) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .device_keys
            .insert((key.user.clone(), key.device_id.clone()), key.clone());
        Ok(())
    }

    async fn get_active_device_key(
        &self,
        user: &UserId,
        device_id: &DeviceId,
    ) -> Result<Option<Ed25519PublicKey>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .device_keys
            .get(&(user.clone(), device_id.clone()))
            .filter(|k| k.is_active)
            .map(|k| k.public_key))
    }

    async fn deactivate_device_key(&self, user: &UserId, device_id: &DeviceId) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        match inner.device_keys.get_mut(&(user.clone(), device_id.clone())) {
            Some(key) if key.is_active => {
                key.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn consume_grant(&self, marker: &SpentGrant) -> Result<ConsumeResult> {
        // Check and insert under one lock acquisition. Two concurrent
        // calls with the same jti serialize here; the loser sees the
        // winner's marker.
        let mut inner = self.inner.lock().unwrap();

        if let Some(existing) = inner.spent.get(&marker.jti) {
            let expired = existing
                .expires_at
                .is_some_and(|at| at <= marker.consumed_at);
            if !expired {
                return Ok(ConsumeResult::Replayed);
            }
        }

        inner.spent.insert(marker.jti.clone(), marker.clone());
        Ok(ConsumeResult::Consumed)
    }

    async fn insert_record(
        &self,
        owner: &UserId,
        meta: &RecordMeta,
        body: &SealedParts,
        created_at: i64,
    ) -> Result<RecordId> {
        let mut inner = self.inner.lock().unwrap();
        let id = RecordId(inner.next_record_id);
        inner.next_record_id += 1;

        inner.records.insert(
            id,
            EncryptedRecord {
                id,
                owner: owner.clone(),
                category: meta.category.clone(),
                year: meta.year,
                month: meta.month,
                body: body.clone(),
                created_at,
            },
        );

        Ok(id)
    }

    async fn get_records_owned(
        &self,
        owner: &UserId,
        ids: &[RecordId],
    ) -> Result<Vec<EncryptedRecord>> {
        let inner = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| inner.records.get(id))
            .filter(|r| &r.owner == owner)
            .cloned()
            .collect())
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.audit.push(event.clone());
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.audit.iter().rev().take(limit).cloned().collect())
    }
}
