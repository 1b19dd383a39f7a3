//! Proptest generators for property-based testing.

use proptest::prelude::*;

use grantlock_core::{DeviceKeypair, Ed25519PublicKey, GrantClaims, RecordMeta};
use grantlock_crypto::DEK_LENGTHS;

/// Generate a random device keypair.
pub fn keypair() -> impl Strategy<Value = DeviceKeypair> {
    any::<[u8; 32]>().prop_map(|seed| DeviceKeypair::from_seed(&seed))
}

/// Generate a random Ed25519 public key.
pub fn public_key() -> impl Strategy<Value = Ed25519PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

/// Generate a jti in the shape clients actually mint (uuid-ish hex).
pub fn jti() -> impl Strategy<Value = String> {
    "[a-f0-9]{32}".prop_map(String::from)
}

/// Generate DEK bytes of a valid AES key length.
pub fn dek_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(DEK_LENGTHS[0]),
        Just(DEK_LENGTHS[1]),
        Just(DEK_LENGTHS[2]),
    ]
    .prop_flat_map(|len| prop::collection::vec(any::<u8>(), len))
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a scope list that always contains the required scope.
pub fn scopes_with(required: &'static str) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{3,8}:[a-z]{3,8}", 0..3).prop_map(move |mut extra| {
        extra.push(required.to_string());
        extra
    })
}

/// Generate clear record metadata.
pub fn record_meta() -> impl Strategy<Value = RecordMeta> {
    (
        prop::option::of("[a-z]{3,12}"),
        prop::option::of(2000i32..2100),
        prop::option::of(1u8..=12),
    )
        .prop_map(|(category, year, month)| RecordMeta {
            category,
            year,
            month,
        })
}

/// Generate a small receipt-like JSON document.
pub fn document() -> impl Strategy<Value = serde_json::Value> {
    (
        "[A-Za-z ]{1,24}",
        0u32..1_000_000,
        prop::collection::vec(("[a-z]{1,12}", 0u32..100_000), 0..5),
    )
        .prop_map(|(merchant, total_cents, items)| {
            serde_json::json!({
                "merchant": merchant,
                "total_cents": total_cents,
                "items": items
                    .into_iter()
                    .map(|(name, cents)| serde_json::json!({"name": name, "cents": cents}))
                    .collect::<Vec<_>>(),
            })
        })
}

/// Parameters for minting a grant.
#[derive(Debug, Clone)]
pub struct GrantParams {
    pub seed: [u8; 32],
    pub sub: String,
    pub kid: String,
    pub scope: Vec<String>,
    pub jti: String,
    pub lifetime_secs: i64,
}

impl Arbitrary for GrantParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(),
            "[a-z0-9-]{1,16}",
            "[a-z0-9-]{1,16}",
            prop::collection::vec("[a-z]{3,8}:[a-z]{3,8}", 1..3),
            jti(),
            1i64..=300,
        )
            .prop_map(|(seed, sub, kid, scope, jti, lifetime_secs)| GrantParams {
                seed,
                sub,
                kid,
                scope,
                jti,
                lifetime_secs,
            })
            .boxed()
    }
}

impl GrantParams {
    /// Claims at the given issue time.
    pub fn claims_at(&self, now: i64) -> GrantClaims {
        GrantClaims {
            sub: self.sub.clone(),
            scope: self.scope.clone(),
            iat: now,
            nbf: None,
            exp: now + self.lifetime_secs,
            jti: self.jti.clone(),
            targets: None,
        }
    }
}
