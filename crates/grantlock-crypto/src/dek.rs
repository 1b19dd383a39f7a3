//! Per-operation data encryption keys.
//!
//! A DEK exists in server memory only for the span of one request. The
//! unwrapped form zeroes its bytes on drop, so every exit path — normal
//! return, typed error, or panic unwind — clears the key material.

use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use grantlock_core::codec;

use crate::error::{CryptoError, Result};

/// Key lengths accepted for a DEK (AES-128/192/256).
pub const DEK_LENGTHS: [usize; 3] = [16, 24, 32];

/// A client-wrapped DEK: RSA-OAEP ciphertext, opaque to everything except
/// the unwrapper.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedDek(Vec<u8>);

impl WrappedDek {
    /// Create from raw ciphertext bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Parse from the base64 wire form.
    pub fn from_b64(s: &str) -> Result<Self> {
        codec::b64_decode(s)
            .map(Self)
            .map_err(|_| CryptoError::UnwrapFailed)
    }

    /// Encode to the base64 wire form.
    pub fn to_b64(&self) -> String {
        codec::b64_encode(&self.0)
    }

    /// Get the raw ciphertext bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for WrappedDek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedDek({} bytes)", self.0.len())
    }
}

// On the wire a wrapped DEK travels as a standard-base64 string.
impl serde::Serialize for WrappedDek {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_b64())
    }
}

impl<'de> serde::Deserialize<'de> for WrappedDek {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        WrappedDek::from_b64(&s).map_err(serde::de::Error::custom)
    }
}

/// An unwrapped DEK held in memory.
///
/// Construction validates the length; the bytes are zeroed on drop.
/// There is deliberately no way to clone one.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Dek {
    bytes: Vec<u8>,
}

impl Dek {
    /// Take ownership of raw key bytes.
    ///
    /// Any length other than 16, 24, or 32 is rejected as
    /// [`CryptoError::UnwrapFailed`]; the rejected buffer is zeroed
    /// before the error returns.
    pub fn new(mut bytes: Vec<u8>) -> Result<Self> {
        if !DEK_LENGTHS.contains(&bytes.len()) {
            bytes.zeroize();
            return Err(CryptoError::UnwrapFailed);
        }
        Ok(Self { bytes })
    }

    /// Generate a random DEK of the given length. Testkit/client side.
    pub fn generate(len: usize) -> Result<Self> {
        let mut bytes = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::new(bytes)
    }

    /// Get the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Dek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key bytes.
        write!(f, "Dek({} bytes)", self.bytes.len())
    }
}
