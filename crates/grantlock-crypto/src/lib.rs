//! # Grantlock Crypto
//!
//! Key transport and envelope encryption for grantlock:
//!
//! - [`ServerKeyPair`] unwraps client-wrapped DEKs (RSA-OAEP-SHA256)
//! - [`envelope::seal`] / [`envelope::open`] protect payload bytes
//!   (AES-GCM with a domain-separation context as associated data)
//! - [`Dek`] holds unwrapped key material and zeroes it on drop
//!
//! The DEK never crosses a request boundary: it is unwrapped, used for
//! one seal or a batch of opens, and dropped.

pub mod dek;
pub mod envelope;
pub mod error;
pub mod unwrap;

pub use dek::{Dek, WrappedDek, DEK_LENGTHS};
pub use envelope::{open, seal, RECEIPT_CONTEXT};
pub use error::{CryptoError, Result};
pub use unwrap::{ServerKeyPair, WRAP_ALGORITHM};
