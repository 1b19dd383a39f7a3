//! Error types for grantlock core.

use thiserror::Error;

/// Encoding/decoding failures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("base64 decode failed: {0}")]
    Base64(String),

    #[error("JSON error: {0}")]
    Json(String),
}

/// Errors from grant token verification.
///
/// Every variant is terminal for the request carrying the token; callers
/// must mint a fresh grant rather than retry.
#[derive(Debug, Error)]
pub enum GrantError {
    /// Token structure, encoding, or header content is invalid.
    /// Covers wrong segment count, bad base64, bad JSON, unsupported
    /// algorithm, and a missing `kid`.
    #[error("malformed grant: {0}")]
    Malformed(String),

    /// Signature does not verify over the signed segments.
    #[error("grant signature invalid")]
    SignatureInvalid,

    /// Current time is at or past `exp`.
    #[error("grant expired")]
    Expired,

    /// Current time is before `nbf` beyond the skew allowance.
    #[error("grant not yet valid")]
    NotYetValid,

    /// The required capability is not in the grant's scope set.
    #[error("scope denied: grant does not carry {0}")]
    ScopeDenied(String),

    /// A stored or supplied verification key is not a valid Ed25519 key.
    #[error("invalid public key")]
    InvalidPublicKey,
}

impl From<CodecError> for GrantError {
    fn from(e: CodecError) -> Self {
        GrantError::Malformed(e.to_string())
    }
}
