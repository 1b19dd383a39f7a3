//! Error taxonomy for vault operations.
//!
//! Every failure in a flow is terminal for the request; callers obtain a
//! fresh grant and retry at the application layer. The taxonomy maps to
//! stable wire codes and HTTP-equivalent classes for whatever transport
//! sits above this crate.

use grantlock_core::GrantError;
use grantlock_crypto::CryptoError;
use grantlock_store::StoreError;
use thiserror::Error;

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Token structure, encoding, or header content is invalid.
    #[error("malformed grant: {0}")]
    MalformedGrant(String),

    /// Registration payload carries a key that is not a valid Ed25519
    /// point.
    #[error("invalid device key: {0}")]
    InvalidDeviceKey(String),

    /// No active key is registered for the token's (sub, kid).
    #[error("unknown device")]
    UnknownDevice,

    /// Grant signature does not verify.
    #[error("grant signature invalid")]
    SignatureInvalid,

    /// Grant is past its `exp`.
    #[error("grant expired")]
    GrantExpired,

    /// Grant's `nbf` lies in the future beyond the skew allowance.
    #[error("grant not yet valid")]
    GrantNotYetValid,

    /// Grant does not carry the required capability.
    #[error("scope denied")]
    ScopeDenied,

    /// The grant's jti was already consumed.
    #[error("replay detected")]
    ReplayDetected,

    /// DEK unwrapping failed. Deliberately opaque.
    #[error("DEK unwrap failed")]
    UnwrapFailed,

    /// Payload authentication failed during open.
    #[error("payload authentication failed")]
    AuthFailed,

    /// Document extraction collaborator failed.
    #[error("document extraction failed: {0}")]
    ExtractionFailed(String),

    /// Storage or other internal failure. Detail is logged, not exposed.
    #[error("persistence failed")]
    PersistenceFailed,
}

impl VaultError {
    /// Stable wire code for the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::MalformedGrant(_) => "malformed_grant",
            VaultError::InvalidDeviceKey(_) => "invalid_device_key",
            VaultError::UnknownDevice => "unknown_device",
            VaultError::SignatureInvalid => "signature_invalid",
            VaultError::GrantExpired => "grant_expired",
            VaultError::GrantNotYetValid => "grant_not_yet_valid",
            VaultError::ScopeDenied => "scope_denied",
            VaultError::ReplayDetected => "replay_detected",
            VaultError::UnwrapFailed => "unwrap_failed",
            VaultError::AuthFailed => "auth_failed",
            VaultError::ExtractionFailed(_) => "extraction_failed",
            VaultError::PersistenceFailed => "persistence_failed",
        }
    }

    /// HTTP-equivalent class, independent of any concrete transport.
    pub fn class(&self) -> ErrorClass {
        match self {
            VaultError::MalformedGrant(_)
            | VaultError::InvalidDeviceKey(_)
            | VaultError::GrantExpired
            | VaultError::GrantNotYetValid
            | VaultError::UnwrapFailed
            | VaultError::AuthFailed
            | VaultError::ExtractionFailed(_) => ErrorClass::BadRequest,
            VaultError::UnknownDevice
            | VaultError::SignatureInvalid
            | VaultError::ScopeDenied => ErrorClass::Forbidden,
            VaultError::ReplayDetected => ErrorClass::Conflict,
            VaultError::PersistenceFailed => ErrorClass::Internal,
        }
    }
}

/// Transport-agnostic grouping of the taxonomy by response class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// 400-equivalent.
    BadRequest,
    /// 403-equivalent.
    Forbidden,
    /// 409-equivalent.
    Conflict,
    /// 500-equivalent.
    Internal,
}

impl From<GrantError> for VaultError {
    fn from(e: GrantError) -> Self {
        match e {
            GrantError::Malformed(msg) => VaultError::MalformedGrant(msg),
            GrantError::SignatureInvalid | GrantError::InvalidPublicKey => {
                VaultError::SignatureInvalid
            }
            GrantError::Expired => VaultError::GrantExpired,
            GrantError::NotYetValid => VaultError::GrantNotYetValid,
            GrantError::ScopeDenied(_) => VaultError::ScopeDenied,
        }
    }
}

impl From<CryptoError> for VaultError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::UnwrapFailed => VaultError::UnwrapFailed,
            CryptoError::AuthFailed => VaultError::AuthFailed,
            // Key setup / AEAD internals never reach the caller in detail.
            CryptoError::Encryption(_) | CryptoError::ServerKey(_) => {
                VaultError::PersistenceFailed
            }
        }
    }
}

impl From<StoreError> for VaultError {
    fn from(_: StoreError) -> Self {
        VaultError::PersistenceFailed
    }
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
