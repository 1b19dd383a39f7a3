//! # Grantlock Core
//!
//! Pure primitives for grantlock: grant tokens, device keys, and the
//! encoding helpers the rest of the workspace shares.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`ParsedGrant`] / [`VerifiedGrant`] - the token verification pipeline
//! - [`Ed25519PublicKey`] - a device's registered verification key
//! - [`EncryptedRecord`] / [`SealedParts`] - a payload at rest
//! - [`AuditEvent`] - append-only record of a protocol outcome
//!
//! ## Verification pipeline
//!
//! Tokens are verified over the exact bytes received, never over
//! re-serialized JSON. See the [`grant`] module.

pub mod codec;
pub mod error;
pub mod grant;
pub mod keys;
pub mod types;

pub use error::{CodecError, GrantError};
pub use grant::{
    now_secs, GrantClaims, GrantHeader, ParsedGrant, VerifiedGrant, ALG_EDDSA, NBF_SKEW_SECS,
    SCOPE_DECRYPT, SCOPE_INGEST,
};
pub use keys::{DeviceKeypair, Ed25519PublicKey, Ed25519Signature};
pub use types::{
    AuditEvent, AuditOutcome, DeviceId, DeviceKey, EncryptedRecord, RecordId, RecordMeta,
    SealedParts, SpentGrant, UserId,
};
