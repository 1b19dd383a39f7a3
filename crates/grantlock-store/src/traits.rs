//! Store trait: the abstract interface for protocol persistence.
//!
//! This trait allows the vault to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use grantlock_core::{
    AuditEvent, DeviceId, DeviceKey, Ed25519PublicKey, EncryptedRecord, RecordId, RecordMeta,
    SealedParts, SpentGrant, UserId,
};

use crate::error::Result;

/// Result of attempting to consume a grant's `jti`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeResult {
    /// First consumption: the marker was inserted.
    Consumed,
    /// A live marker already exists: the grant was replayed.
    Replayed,
}

/// The Store trait: async interface for protocol persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the
/// runtime.
///
/// # Design Notes
///
/// - **Atomic consumption**: [`consume_grant`](Store::consume_grant) is
///   the one concurrency-critical operation. Two concurrent calls with
///   the same `jti` must yield exactly one `Consumed` and one `Replayed`,
///   never two `Consumed` — no lost-update window.
/// - **Upsert registration**: at most one active key per
///   (user, device_id); re-registration overwrites, never accumulates.
/// - **Append-only audit**: events are never updated or deleted; retrieval
///   is ordered by creation time, newest first.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Device Key Registry
    // ─────────────────────────────────────────────────────────────────────────

    /// Upsert the active key for (user, device_id).
    ///
    /// Any previous key for that pair is overwritten, not retained.
    async fn upsert_device_key(&self, key: &DeviceKey) -> Result<()>;

    /// Look up the active verification key for (user, device_id).
    ///
    /// Returns `None` if no record matches or the record is inactive.
    async fn get_active_device_key(
        &self,
        user: &UserId,
        device_id: &DeviceId,
    ) -> Result<Option<Ed25519PublicKey>>;

    /// Deactivate a device's key. The row is kept; `is_active` flips.
    ///
    /// Returns `true` if a matching active key existed.
    async fn deactivate_device_key(&self, user: &UserId, device_id: &DeviceId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Replay Guard
    // ─────────────────────────────────────────────────────────────────────────

    /// Atomically insert a spent-grant marker keyed by `jti`.
    ///
    /// Markers whose `expires_at` has passed (relative to the new
    /// marker's `consumed_at`) count as absent. The marker TTL must be at
    /// least the maximum allowed grant lifetime, so a grant can never be
    /// replayed after its marker expires but before its own `exp`.
    async fn consume_grant(&self, marker: &SpentGrant) -> Result<ConsumeResult>;

    // ─────────────────────────────────────────────────────────────────────────
    // Encrypted Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist a sealed payload with its clear metadata.
    async fn insert_record(
        &self,
        owner: &UserId,
        meta: &RecordMeta,
        body: &SealedParts,
        created_at: i64,
    ) -> Result<RecordId>;

    /// Fetch the records among `ids` that are owned by `owner`.
    ///
    /// Records owned by someone else (or missing) are silently skipped;
    /// ownership is never reported to the caller.
    async fn get_records_owned(
        &self,
        owner: &UserId,
        ids: &[RecordId],
    ) -> Result<Vec<EncryptedRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Trail
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an audit event.
    async fn append_audit(&self, event: &AuditEvent) -> Result<()>;

    /// List the most recent audit events, newest first.
    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEvent>>;
}
