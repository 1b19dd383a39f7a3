//! Server-side DEK unwrapping.
//!
//! Clients wrap a per-operation DEK for the server with RSA-OAEP
//! (SHA-256 hash and MGF1). The server recovers it here and holds it only
//! as a [`Dek`], which zeroes itself on drop.

use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::dek::{Dek, WrappedDek};
use crate::error::{CryptoError, Result};

/// Wire identifier for the wrapping algorithm, published alongside the
/// server public key.
pub const WRAP_ALGORITHM: &str = "RSA-OAEP-SHA256";

/// RSA modulus size for generated server keys.
const SERVER_KEY_BITS: usize = 2048;

/// The server's RSA key pair.
///
/// The private half never leaves this type; the public half is what
/// clients fetch (as PEM) to wrap DEKs.
pub struct ServerKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl ServerKeyPair {
    /// Generate a fresh key pair. Bootstrap and test use.
    pub fn generate() -> Result<Self> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, SERVER_KEY_BITS)
            .map_err(|e| CryptoError::ServerKey(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Load from a PKCS#8 PEM private key.
    pub fn from_private_key_pem(pem: &str) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| CryptoError::ServerKey(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// The public key in SPKI PEM form, for clients to wrap against.
    pub fn public_key_pem(&self) -> Result<String> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::ServerKey(e.to_string()))
    }

    /// Unwrap a client-wrapped DEK.
    ///
    /// Every failure — padding, format, algorithm, output length — maps to
    /// the single opaque [`CryptoError::UnwrapFailed`]. Distinguishing the
    /// sub-cases would hand an attacker a padding oracle.
    pub fn unwrap_dek(&self, wrapped: &WrappedDek) -> Result<Dek> {
        let padding = Oaep::new::<Sha256>();
        let recovered = self
            .private
            .decrypt(padding, wrapped.as_bytes())
            .map_err(|_| CryptoError::UnwrapFailed)?;
        // Dek::new validates length and zeroes the buffer on rejection.
        Dek::new(recovered)
    }

    /// Wrap raw DEK bytes with the public key.
    ///
    /// This is the client side of the exchange; the server never calls it
    /// in production. The testkit uses it to build requests.
    pub fn wrap_dek(&self, dek_bytes: &[u8]) -> Result<WrappedDek> {
        let mut rng = rand::thread_rng();
        let padding = Oaep::new::<Sha256>();
        let ct = self
            .public
            .encrypt(&mut rng, padding, dek_bytes)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        Ok(WrappedDek::from_bytes(ct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let server = ServerKeyPair::generate().unwrap();
        let dek = Dek::generate(32).unwrap();

        let wrapped = server.wrap_dek(dek.as_bytes()).unwrap();
        let recovered = server.unwrap_dek(&wrapped).unwrap();

        assert_eq!(recovered.as_bytes(), dek.as_bytes());
    }

    #[test]
    fn test_unwrap_garbage_fails_opaquely() {
        let server = ServerKeyPair::generate().unwrap();
        let garbage = WrappedDek::from_bytes(vec![0x17; 256]);

        let err = server.unwrap_dek(&garbage).unwrap_err();
        assert!(matches!(err, CryptoError::UnwrapFailed));
        // The message must not hint at why.
        assert_eq!(err.to_string(), "DEK unwrap failed");
    }

    #[test]
    fn test_unwrap_wrong_key_fails() {
        let server_a = ServerKeyPair::generate().unwrap();
        let server_b = ServerKeyPair::generate().unwrap();
        let dek = Dek::generate(32).unwrap();

        let wrapped = server_a.wrap_dek(dek.as_bytes()).unwrap();
        assert!(matches!(
            server_b.unwrap_dek(&wrapped),
            Err(CryptoError::UnwrapFailed)
        ));
    }

    #[test]
    fn test_unwrap_rejects_bad_plaintext_length() {
        let server = ServerKeyPair::generate().unwrap();
        // A valid OAEP ciphertext whose plaintext is not a DEK length.
        let wrapped = server.wrap_dek(&[0xabu8; 20]).unwrap();
        assert!(matches!(
            server.unwrap_dek(&wrapped),
            Err(CryptoError::UnwrapFailed)
        ));
    }

    #[test]
    fn test_public_key_pem_form() {
        let server = ServerKeyPair::generate().unwrap();
        let pem = server.public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
    }

    #[test]
    fn test_pem_private_key_roundtrip() {
        use rsa::pkcs8::EncodePrivateKey;

        let server = ServerKeyPair::generate().unwrap();
        let pem = server
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .unwrap()
            .to_string();

        let reloaded = ServerKeyPair::from_private_key_pem(&pem).unwrap();
        let dek = Dek::generate(16).unwrap();
        let wrapped = server.wrap_dek(dek.as_bytes()).unwrap();
        assert_eq!(
            reloaded.unwrap_dek(&wrapped).unwrap().as_bytes(),
            dek.as_bytes()
        );
    }
}
