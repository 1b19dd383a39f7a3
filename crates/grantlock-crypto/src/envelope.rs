//! Authenticated envelope encryption of payload bytes.
//!
//! Payloads are sealed with AES-GCM under the per-operation DEK. The
//! domain context string is bound as associated data, so ciphertext
//! sealed for one context can never be opened under another. The 96-bit
//! nonce is drawn fresh from the system RNG on every seal; callers cannot
//! supply one.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use rand::RngCore;

use grantlock_core::SealedParts;

use crate::dek::Dek;
use crate::error::{CryptoError, Result};

/// Domain context for receipt payloads.
pub const RECEIPT_CONTEXT: &str = "receipt_v1";

/// AES-GCM tag length in bytes.
const TAG_LEN: usize = 16;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// One AEAD instance keyed by DEK length.
enum Cipher {
    A128(Aes128Gcm),
    A192(Aes192Gcm),
    A256(Aes256Gcm),
}

impl Cipher {
    fn for_dek(dek: &Dek) -> Result<Self> {
        let key = dek.as_bytes();
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key).map(Cipher::A128),
            24 => Aes192Gcm::new_from_slice(key).map(Cipher::A192),
            32 => Aes256Gcm::new_from_slice(key).map(Cipher::A256),
            // Dek construction already enforces the length set.
            other => {
                return Err(CryptoError::Encryption(format!(
                    "unsupported key length {other}"
                )))
            }
        }
        .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    fn encrypt(&self, nonce: &[u8; 12], payload: Payload<'_, '_>) -> Result<Vec<u8>> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            Cipher::A128(c) => c.encrypt(nonce, payload),
            Cipher::A192(c) => c.encrypt(nonce, payload),
            Cipher::A256(c) => c.encrypt(nonce, payload),
        }
        .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    fn decrypt(&self, nonce: &[u8; 12], payload: Payload<'_, '_>) -> Result<Vec<u8>> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            Cipher::A128(c) => c.decrypt(nonce, payload),
            Cipher::A192(c) => c.decrypt(nonce, payload),
            Cipher::A256(c) => c.decrypt(nonce, payload),
        }
        .map_err(|_| CryptoError::AuthFailed)
    }
}

/// Seal plaintext under the DEK, binding `context` as associated data.
///
/// Returns the nonce, ciphertext, and tag as separate parts, matching the
/// at-rest record layout.
pub fn seal(dek: &Dek, plaintext: &[u8], context: &str) -> Result<SealedParts> {
    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = Cipher::for_dek(dek)?;
    let mut combined = cipher.encrypt(
        &nonce,
        Payload {
            msg: plaintext,
            aad: context.as_bytes(),
        },
    )?;

    // AEAD output is ciphertext || tag; store them separately.
    let split = combined.len() - TAG_LEN;
    let tag_bytes = combined.split_off(split);
    let tag: [u8; 16] = tag_bytes
        .try_into()
        .map_err(|_| CryptoError::Encryption("bad tag length".into()))?;

    Ok(SealedParts {
        nonce,
        ciphertext: combined,
        tag,
    })
}

/// Open a sealed payload. Fails closed with [`CryptoError::AuthFailed`]
/// on any tag mismatch or context mismatch; no partial plaintext escapes.
pub fn open(dek: &Dek, parts: &SealedParts, context: &str) -> Result<Vec<u8>> {
    let cipher = Cipher::for_dek(dek)?;

    let mut combined = Vec::with_capacity(parts.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&parts.ciphertext);
    combined.extend_from_slice(&parts.tag);

    cipher.decrypt(
        &parts.nonce,
        Payload {
            msg: &combined,
            aad: context.as_bytes(),
        },
    )
}
