//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: a vault with a registered
//! device, a client-side grant minter, and record seeding.

use std::sync::Arc;

use grantlock::{JsonDocumentExtractor, Vault, VaultConfig};
use grantlock_core::{
    codec, now_secs, DeviceId, DeviceKeypair, GrantClaims, GrantHeader, RecordId, RecordMeta,
    UserId, ALG_EDDSA,
};
use grantlock_crypto::{envelope, Dek, ServerKeyPair, WrappedDek, RECEIPT_CONTEXT};
use grantlock_store::{MemoryStore, Store};

/// Default grant lifetime used by minted test tokens, in seconds.
pub const TEST_GRANT_LIFETIME: i64 = 120;

/// Client-side token minting for a single device.
///
/// This is what a real device does locally: build the header and claims,
/// sign the two base64url segments with the device key.
pub struct GrantMinter {
    pub keypair: DeviceKeypair,
    pub user: UserId,
    pub device_id: DeviceId,
}

impl GrantMinter {
    pub fn new(user: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            keypair: DeviceKeypair::generate(),
            user: UserId::new(user),
            device_id: DeviceId::new(device_id),
        }
    }

    /// Deterministic keypair, for tests that need stable keys.
    pub fn with_seed(user: impl Into<String>, device_id: impl Into<String>, seed: [u8; 32]) -> Self {
        Self {
            keypair: DeviceKeypair::from_seed(&seed),
            user: UserId::new(user),
            device_id: DeviceId::new(device_id),
        }
    }

    /// The device's public key in the stored base64 form.
    pub fn public_key_b64(&self) -> String {
        self.keypair.public_key().to_b64()
    }

    /// Fresh claims for this device: issued now, expiring after
    /// [`TEST_GRANT_LIFETIME`].
    pub fn claims(&self, scopes: &[&str], jti: &str) -> GrantClaims {
        let now = now_secs();
        GrantClaims {
            sub: self.user.as_str().to_string(),
            scope: scopes.iter().map(|s| s.to_string()).collect(),
            iat: now,
            nbf: None,
            exp: now + TEST_GRANT_LIFETIME,
            jti: jti.to_string(),
            targets: None,
        }
    }

    /// Mint a token with default claims.
    pub fn mint(&self, scopes: &[&str], jti: &str) -> String {
        self.mint_claims(&self.claims(scopes, jti))
    }

    /// Mint a token from explicit claims.
    pub fn mint_claims(&self, claims: &GrantClaims) -> String {
        let header = GrantHeader {
            alg: ALG_EDDSA.to_string(),
            typ: Some("JWT".to_string()),
            kid: self.device_id.as_str().to_string(),
        };
        self.mint_raw(&header, claims)
    }

    /// Mint from explicit header and claims, for malformed-token tests.
    pub fn mint_raw(&self, header: &GrantHeader, claims: &GrantClaims) -> String {
        let header_b64 = codec::b64url_encode(&serde_json::to_vec(header).expect("header json"));
        let payload_b64 = codec::b64url_encode(&serde_json::to_vec(claims).expect("claims json"));
        let signing_input = format!("{header_b64}.{payload_b64}");
        let sig = self.keypair.sign(signing_input.as_bytes());
        format!("{signing_input}.{}", codec::b64url_encode(sig.as_bytes()))
    }
}

/// A vault over a memory store with one registered device.
pub struct TestFixture {
    pub vault: Vault<MemoryStore>,
    pub store: Arc<MemoryStore>,
    pub minter: GrantMinter,
}

impl TestFixture {
    /// Vault + store + registered device "dev-1" for "user-1".
    pub async fn new() -> Self {
        Self::for_device(GrantMinter::new("user-1", "dev-1")).await
    }

    /// Same, for an arbitrary device.
    pub async fn for_device(minter: GrantMinter) -> Self {
        Self::with_config(minter, VaultConfig::default()).await
    }

    pub async fn with_config(minter: GrantMinter, config: VaultConfig) -> Self {
        let server = ServerKeyPair::generate().expect("server keygen");
        let store = Arc::new(MemoryStore::new());
        let vault = Vault::new(
            server,
            Arc::clone(&store),
            Arc::new(JsonDocumentExtractor),
            config,
        );
        let fixture = Self {
            vault,
            store,
            minter,
        };
        fixture.register().await;
        fixture
    }

    async fn register(&self) {
        self.vault
            .register_device(grantlock::RegisterDeviceRequest {
                user: self.minter.user.clone(),
                device_id: self.minter.device_id.clone(),
                public_key: self.minter.public_key_b64(),
            })
            .await
            .expect("device registration");
    }

    /// Wrap DEK bytes against the vault's published public key, the way a
    /// client would from the PEM it fetched.
    pub fn wrap(&self, dek: &Dek) -> WrappedDek {
        let pem = self
            .vault
            .server_public_key()
            .expect("server public key")
            .pem;
        wrap_for_pem(&pem, dek)
    }

    /// Seed an encrypted record directly in the store, bypassing the
    /// ingest flow. Returns its id.
    pub async fn seed_record(
        &self,
        owner: &UserId,
        dek: &Dek,
        document: &serde_json::Value,
        meta: RecordMeta,
    ) -> RecordId {
        let plaintext = codec::canonical_json(document).expect("canonical json");
        let sealed = envelope::seal(dek, &plaintext, RECEIPT_CONTEXT).expect("seal");
        self.store
            .insert_record(owner, &meta, &sealed, now_secs())
            .await
            .expect("insert record")
    }
}

/// Client-side DEK wrapping from a fetched SPKI PEM.
pub fn wrap_for_pem(pem: &str, dek: &Dek) -> WrappedDek {
    use rsa::pkcs8::DecodePublicKey;
    use rsa::{Oaep, RsaPublicKey};
    use sha2::Sha256;

    let key = RsaPublicKey::from_public_key_pem(pem).expect("server public key pem");
    let mut rng = rand::thread_rng();
    let ct = key
        .encrypt(&mut rng, Oaep::new::<Sha256>(), dek.as_bytes())
        .expect("oaep wrap");
    WrappedDek::from_bytes(ct)
}

/// A small receipt-like document for tests.
pub fn sample_document(merchant: &str, total: f64) -> serde_json::Value {
    serde_json::json!({
        "merchant": merchant,
        "total": total,
        "currency": "USD",
        "items": [{"name": "item", "price": total}],
    })
}
