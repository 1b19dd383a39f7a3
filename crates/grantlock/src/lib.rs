//! # Grantlock
//!
//! Capability grants and envelope encryption for an encrypted record
//! vault. Clients hold Ed25519 device keys and mint short-lived,
//! single-use grant tokens; the server verifies them, unwraps a
//! per-operation data-encryption key, and seals or opens records with
//! AES-GCM under a fixed domain-separation context.
//!
//! ## Overview
//!
//! This crate is the orchestration layer. It composes:
//!
//! - `grantlock-core` — token parsing/verification and domain types
//! - `grantlock-crypto` — DEK unwrapping and the envelope cipher
//! - `grantlock-store` — persistence behind the [`Store`] trait
//!
//! ## Key Types
//!
//! - [`Vault`] - the orchestrator; owns the server key pair and a store
//! - [`VaultConfig`] - replay-marker TTL and grant-lifetime limits
//! - [`VaultError`] / [`ErrorClass`] - the terminal error taxonomy
//! - [`DocumentExtractor`] - the bytes-to-document extraction seam
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use grantlock::{JsonDocumentExtractor, Vault, VaultConfig};
//! use grantlock_crypto::ServerKeyPair;
//! use grantlock_store::MemoryStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let vault = Vault::new(
//!     ServerKeyPair::generate()?,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(JsonDocumentExtractor),
//!     VaultConfig::default(),
//! );
//! let wrap_key = vault.server_public_key()?;
//! println!("wrap with {}", wrap_key.algorithm);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod extract;
pub mod requests;
pub mod vault;

pub use error::{ErrorClass, Result, VaultError};
pub use extract::{DocumentExtractor, ExtractionError, JsonDocumentExtractor};
pub use requests::{
    DecryptRequest, DecryptResponse, DecryptedRecord, ErrorEnvelope, IngestRequest,
    IngestResponse, RegisterDeviceRequest, ServerPublicKey,
};
pub use vault::{Vault, VaultConfig};

// Re-export the member crates so downstream users need only one
// dependency line.
pub use grantlock_core;
pub use grantlock_crypto;
pub use grantlock_store;

pub use grantlock_store::Store;
