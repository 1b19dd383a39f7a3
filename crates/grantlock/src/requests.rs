//! Transport-agnostic request and response shapes.
//!
//! A web layer (or CLI, or test harness) deserializes its inbound payload
//! into these types and serializes the responses back out. Nothing here
//! knows about HTTP; [`ErrorEnvelope`] carries the stable wire code and a
//! human-readable detail for whatever transport sits above.

use grantlock_core::{DeviceId, RecordId, RecordMeta, UserId};
use grantlock_crypto::WrappedDek;
use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Register (or rotate) a device verification key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDeviceRequest {
    pub user: UserId,
    pub device_id: DeviceId,
    /// Raw 32-byte Ed25519 public key, standard base64.
    pub public_key: String,
}

/// Ingest a raw document under a `receipt:ingest` grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    /// Compact three-segment grant token.
    pub token: String,
    /// RSA-OAEP wrapped data-encryption key.
    pub wrapped_key: WrappedDek,
    #[serde(default)]
    pub meta: RecordMeta,
    /// Raw document bytes handed to the extraction collaborator.
    pub raw_document: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Successful ingest: the id of the newly stored encrypted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub record_id: RecordId,
}

/// Decrypt owned records under a `receipt:decrypt` grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptRequest {
    /// Compact three-segment grant token.
    pub token: String,
    /// RSA-OAEP wrapped data-encryption key.
    pub wrapped_key: WrappedDek,
    pub targets: Vec<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// One decrypted record. Exists in memory for the response only; the
/// plaintext is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptedRecord {
    pub id: RecordId,
    pub document: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptResponse {
    pub data: Vec<DecryptedRecord>,
    /// Unix seconds at which the flow completed.
    pub processed_at: i64,
}

/// The server's RSA public key, published so clients can wrap DEKs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerPublicKey {
    /// Always `"RSA-OAEP-SHA256"`.
    pub algorithm: String,
    /// SubjectPublicKeyInfo PEM.
    pub pem: String,
}

/// Wire form of a failed request: `{code, detail}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub detail: String,
}

impl From<&VaultError> for ErrorEnvelope {
    fn from(e: &VaultError) -> Self {
        Self {
            code: e.code().to_string(),
            detail: e.to_string(),
        }
    }
}
