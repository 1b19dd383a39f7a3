//! Error types for the crypto module.

use thiserror::Error;

/// Errors that can occur during key unwrapping and envelope operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// DEK unwrapping failed.
    ///
    /// Deliberately carries no detail: padding failures, format failures,
    /// and bad output lengths all collapse to this one variant so the
    /// error cannot be used as a padding oracle.
    #[error("DEK unwrap failed")]
    UnwrapFailed,

    /// Authenticated decryption failed: tag mismatch or wrong domain
    /// context. No partial plaintext is ever returned.
    #[error("payload authentication failed")]
    AuthFailed,

    /// Encryption-side failure (key setup or AEAD internals).
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Server key material could not be loaded or generated.
    #[error("server key error: {0}")]
    ServerKey(String),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
