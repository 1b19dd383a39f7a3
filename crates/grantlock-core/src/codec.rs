//! Encoding helpers shared across the workspace.
//!
//! Grant tokens travel as base64url (no padding) segments; stored keys and
//! wrapped DEKs use standard base64. Documents are serialized to compact
//! canonical JSON before encryption.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;

use crate::error::CodecError;

/// Encode bytes as base64url without padding (token segment form).
pub fn b64url_encode(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode a base64url segment (no padding accepted).
pub fn b64url_decode(s: &str) -> Result<Vec<u8>, CodecError> {
    URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| CodecError::Base64(e.to_string()))
}

/// Encode bytes as standard base64 (stored key / wrapped DEK form).
pub fn b64_encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard base64.
pub fn b64_decode(s: &str) -> Result<Vec<u8>, CodecError> {
    STANDARD
        .decode(s)
        .map_err(|e| CodecError::Base64(e.to_string()))
}

/// Serialize a document to compact canonical JSON bytes.
///
/// This is the plaintext form that gets sealed into a record. The encoding
/// is compact (no whitespace) so the same document always produces the
/// same bytes.
pub fn canonical_json(doc: &serde_json::Value) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(doc).map_err(|e| CodecError::Json(e.to_string()))
}
