//! Domain types shared across the workspace.
//!
//! These are the records the store persists: device keys, encrypted
//! receipt rows, spent grant markers, and audit events.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keys::Ed25519PublicKey;

/// Opaque user identifier, owned by the external account system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable client-chosen device identifier. Doubles as the token `kid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Row identifier for an encrypted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered device verification key.
///
/// At most one active key exists per (user, device_id); registration
/// upserts, revocation flips `is_active` and never deletes the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceKey {
    pub user: UserId,
    pub device_id: DeviceId,
    pub public_key: Ed25519PublicKey,
    pub is_active: bool,
    /// Unix seconds.
    pub created_at: i64,
}

/// The three components of a sealed payload, stored separately.
///
/// The tag authenticates both the ciphertext and the domain context bound
/// as associated data at seal time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedParts {
    /// 96-bit AES-GCM nonce, fresh per seal.
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
    /// 128-bit authentication tag.
    pub tag: [u8; 16],
}

/// An encrypted receipt record at rest.
///
/// The body is opaque ciphertext; category and time bucket are persisted
/// in the clear so records can be indexed without decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub id: RecordId,
    pub owner: UserId,
    pub category: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u8>,
    pub body: SealedParts,
    /// Unix seconds.
    pub created_at: i64,
}

/// Metadata persisted in the clear alongside a new record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    pub category: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u8>,
}

/// Proof that a grant's `jti` was consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentGrant {
    pub jti: String,
    pub user: UserId,
    pub device_id: DeviceId,
    /// Unix seconds.
    pub consumed_at: i64,
    /// Unix seconds; the marker may be purged after this point. Must be
    /// at least as late as the grant's own `exp`.
    pub expires_at: Option<i64>,
}

/// Terminal outcome of a protocol flow, as recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Replay,
    Denied,
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Replay => "replay",
            AuditOutcome::Denied => "denied",
            AuditOutcome::Error => "error",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of a protocol outcome.
///
/// Never contains plaintext payloads or key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unix seconds.
    pub created_at: i64,
    pub user: Option<UserId>,
    pub device_id: Option<DeviceId>,
    pub jti: Option<String>,
    /// Logical endpoint name, e.g. "ingest" or "decrypt".
    pub endpoint: String,
    pub outcome: AuditOutcome,
    pub targets: Vec<RecordId>,
    /// Network origin as reported by the transport layer.
    pub origin: Option<String>,
    /// Correlation id from the transport layer.
    pub request_id: Option<String>,
    /// Free-form structured context.
    pub extra: serde_json::Value,
}

impl AuditEvent {
    /// Start an event for the given endpoint with empty context.
    pub fn new(endpoint: impl Into<String>, outcome: AuditOutcome, created_at: i64) -> Self {
        Self {
            created_at,
            user: None,
            device_id: None,
            jti: None,
            endpoint: endpoint.into(),
            outcome,
            targets: Vec::new(),
            origin: None,
            request_id: None,
            extra: serde_json::Value::Null,
        }
    }
}
