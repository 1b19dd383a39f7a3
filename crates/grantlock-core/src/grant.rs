//! Grant token parsing and verification.
//!
//! A grant is a short-lived, single-use capability token minted entirely
//! client-side: three base64url segments `header.payload.signature`, signed
//! with the device's Ed25519 key over the exact bytes of
//! `header_b64 || '.' || payload_b64`. The server never re-serializes the
//! signed segments; it verifies the bytes as received.
//!
//! Verification is a fixed pipeline with terminal outcomes only:
//! decode -> identify -> (key resolution, done by the caller) -> signature
//! -> temporal -> scope. Nothing downstream of [`ParsedGrant::verify`] ever
//! sees an unvalidated payload.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::GrantError;
use crate::keys::{Ed25519PublicKey, Ed25519Signature};
use crate::types::{DeviceId, RecordId, UserId};

/// The only signature algorithm a grant may carry.
pub const ALG_EDDSA: &str = "EdDSA";

/// Capability required for the ingest flow.
pub const SCOPE_INGEST: &str = "receipt:ingest";

/// Capability required for the decrypt flow.
pub const SCOPE_DECRYPT: &str = "receipt:decrypt";

/// Clock-skew allowance applied to `nbf` only. `exp` is always strict.
pub const NBF_SKEW_SECS: i64 = 30;

/// Decoded token header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    pub kid: String,
}

/// Decoded token claims.
///
/// `jti` and `exp` are mandatory; a token without them fails decoding
/// as malformed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantClaims {
    pub sub: String,
    #[serde(default)]
    pub scope: Vec<String>,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    pub exp: i64,
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<i64>>,
}

/// A structurally valid token whose signature has not yet been checked.
///
/// Produced by [`ParsedGrant::decode`]. Holds the exact signed bytes so
/// verification never depends on re-serialized JSON.
#[derive(Debug, Clone)]
pub struct ParsedGrant {
    header: GrantHeader,
    claims: GrantClaims,
    signing_input: Vec<u8>,
    signature: Ed25519Signature,
}

impl ParsedGrant {
    /// Decode and structurally validate a token.
    ///
    /// Fails with [`GrantError::Malformed`] on wrong segment count, bad
    /// base64, bad JSON, an unsupported algorithm, or a missing `kid`.
    pub fn decode(token: &str) -> Result<Self, GrantError> {
        let mut segments = token.split('.');
        let (header_b64, payload_b64, sig_b64) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => {
                    return Err(GrantError::Malformed(
                        "token must have exactly three segments".into(),
                    ))
                }
            };

        let header_bytes = codec::b64url_decode(header_b64)?;
        let header: GrantHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| GrantError::Malformed(format!("invalid header: {e}")))?;

        if header.alg != ALG_EDDSA {
            return Err(GrantError::Malformed(format!(
                "unsupported algorithm: {}",
                header.alg
            )));
        }
        if header.kid.is_empty() {
            return Err(GrantError::Malformed("missing kid".into()));
        }

        let payload_bytes = codec::b64url_decode(payload_b64)?;
        let claims: GrantClaims = serde_json::from_slice(&payload_bytes)
            .map_err(|e| GrantError::Malformed(format!("invalid payload: {e}")))?;

        if claims.jti.is_empty() {
            return Err(GrantError::Malformed("missing jti".into()));
        }

        let signature = Ed25519Signature::from_slice(&codec::b64url_decode(sig_b64)?)?;

        // The signed bytes are the first two segments exactly as received.
        let signing_input = format!("{header_b64}.{payload_b64}").into_bytes();

        Ok(Self {
            header,
            claims,
            signing_input,
            signature,
        })
    }

    /// The key id (device id) named by the header, used to resolve the
    /// verification key before [`verify`](Self::verify).
    pub fn kid(&self) -> DeviceId {
        DeviceId::new(self.header.kid.clone())
    }

    /// The subject claim. Key resolution looks up (sub, kid) in the
    /// device key registry.
    pub fn subject(&self) -> UserId {
        UserId::new(self.claims.sub.clone())
    }

    /// Verify signature, temporal validity, and scope, in that order.
    ///
    /// `now` is Unix seconds; injecting it keeps the pipeline testable.
    pub fn verify(
        self,
        key: &Ed25519PublicKey,
        now: i64,
        required_scope: &str,
    ) -> Result<VerifiedGrant, GrantError> {
        key.verify(&self.signing_input, &self.signature)?;

        if now >= self.claims.exp {
            return Err(GrantError::Expired);
        }
        if let Some(nbf) = self.claims.nbf {
            if now + NBF_SKEW_SECS < nbf {
                return Err(GrantError::NotYetValid);
            }
        }

        if !self.claims.scope.iter().any(|s| s == required_scope) {
            return Err(GrantError::ScopeDenied(required_scope.to_string()));
        }

        Ok(VerifiedGrant {
            sub: UserId::new(self.claims.sub),
            device_id: DeviceId::new(self.header.kid),
            scope: self.claims.scope,
            jti: self.claims.jti,
            iat: self.claims.iat,
            exp: self.claims.exp,
            targets: self
                .claims
                .targets
                .map(|ids| ids.into_iter().map(RecordId).collect()),
        })
    }
}

/// The validated output of the verification pipeline.
///
/// This is the only payload representation downstream components consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedGrant {
    pub sub: UserId,
    pub device_id: DeviceId,
    pub scope: Vec<String>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    /// Record ids the grant is pinned to, if the client scoped it.
    pub targets: Option<Vec<RecordId>>,
}

/// Current Unix time in seconds.
pub fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_secs() as i64
}
