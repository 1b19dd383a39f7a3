//! End-to-end protocol flows against a memory store.
//!
//! Each test drives the vault the way a transport layer would: mint a
//! token client-side, wrap a DEK against the published server key, and
//! call ingest or decrypt.

use grantlock::{DecryptRequest, IngestRequest, VaultConfig, VaultError};
use grantlock_core::{
    now_secs, AuditOutcome, RecordMeta, UserId, SCOPE_DECRYPT, SCOPE_INGEST,
};
use grantlock_crypto::{Dek, WrappedDek};
use grantlock_testkit::{sample_document, GrantMinter, TestFixture};

fn decrypt_request(token: String, wrapped: WrappedDek, targets: Vec<i64>) -> DecryptRequest {
    DecryptRequest {
        token,
        wrapped_key: wrapped,
        targets: targets.into_iter().map(grantlock_core::RecordId).collect(),
        origin: Some("203.0.113.7".into()),
        request_id: Some("req-1".into()),
    }
}

fn ingest_request(token: String, wrapped: WrappedDek, doc: &serde_json::Value) -> IngestRequest {
    IngestRequest {
        token,
        wrapped_key: wrapped,
        meta: RecordMeta {
            category: Some("food".into()),
            year: Some(2024),
            month: Some(3),
        },
        raw_document: serde_json::to_vec(doc).unwrap(),
        origin: Some("203.0.113.7".into()),
        request_id: Some("req-1".into()),
    }
}

#[tokio::test]
async fn test_ingest_then_decrypt_roundtrip() {
    let fixture = TestFixture::new().await;
    let dek = Dek::generate(32).unwrap();
    let doc = sample_document("Blue Bottle", 7.25);

    let token = fixture.minter.mint(&[SCOPE_INGEST], "jti-ingest-1");
    let resp = fixture
        .vault
        .ingest(ingest_request(token, fixture.wrap(&dek), &doc))
        .await
        .unwrap();

    let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-decrypt-1");
    let out = fixture
        .vault
        .decrypt(decrypt_request(
            token,
            fixture.wrap(&dek),
            vec![resp.record_id.0],
        ))
        .await
        .unwrap();

    assert_eq!(out.data.len(), 1);
    assert_eq!(out.data[0].id, resp.record_id);
    assert_eq!(out.data[0].document, doc);
}

#[tokio::test]
async fn test_replayed_grant_is_rejected() {
    let fixture = TestFixture::new().await;
    let dek = Dek::generate(32).unwrap();
    let doc = sample_document("Cafe", 4.0);

    let token = fixture.minter.mint(&[SCOPE_INGEST], "jti-ingest");
    let resp = fixture
        .vault
        .ingest(ingest_request(token, fixture.wrap(&dek), &doc))
        .await
        .unwrap();

    let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-once");
    let targets = vec![resp.record_id.0];

    fixture
        .vault
        .decrypt(decrypt_request(
            token.clone(),
            fixture.wrap(&dek),
            targets.clone(),
        ))
        .await
        .unwrap();

    // Same token again: the jti is spent.
    let err = fixture
        .vault
        .decrypt(decrypt_request(token, fixture.wrap(&dek), targets))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::ReplayDetected));

    // Audit trail, newest first: replay, success, ingest success.
    let events = fixture.vault.recent_audit_events(10).await.unwrap();
    let outcomes: Vec<_> = events.iter().map(|e| e.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            AuditOutcome::Replay,
            AuditOutcome::Success,
            AuditOutcome::Success
        ]
    );
    assert_eq!(events[0].jti.as_deref(), Some("jti-once"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_jti_exactly_one_succeeds() {
    use std::sync::Arc;

    let fixture = Arc::new(TestFixture::new().await);
    let dek = Dek::generate(32).unwrap();
    let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-race");
    let wrapped = fixture.wrap(&dek);

    // Eight tasks race on the same grant across worker threads.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let fixture = Arc::clone(&fixture);
        let req = decrypt_request(token.clone(), wrapped.clone(), vec![]);
        handles.push(tokio::spawn(async move { fixture.vault.decrypt(req).await }));
    }

    let mut successes = 0;
    let mut replays = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(VaultError::ReplayDetected) => replays += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(replays, 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_jti_over_sqlite() {
    use std::sync::Arc;

    use grantlock::{JsonDocumentExtractor, Vault};
    use grantlock_crypto::ServerKeyPair;
    use grantlock_store::SqliteStore;
    use grantlock_testkit::wrap_for_pem;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("vault.db")).unwrap());
    let vault = Arc::new(Vault::new(
        ServerKeyPair::generate().unwrap(),
        store,
        Arc::new(JsonDocumentExtractor),
        VaultConfig::default(),
    ));

    let minter = GrantMinter::new("user-1", "dev-1");
    vault
        .register_device(grantlock::RegisterDeviceRequest {
            user: minter.user.clone(),
            device_id: minter.device_id.clone(),
            public_key: minter.public_key_b64(),
        })
        .await
        .unwrap();

    let pem = vault.server_public_key().unwrap().pem;
    let dek = Dek::generate(32).unwrap();
    let token = minter.mint(&[SCOPE_DECRYPT], "jti-race-sqlite");
    let wrapped = wrap_for_pem(&pem, &dek);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let vault = Arc::clone(&vault);
        let req = decrypt_request(token.clone(), wrapped.clone(), vec![]);
        handles.push(tokio::spawn(async move { vault.decrypt(req).await }));
    }

    let mut successes = 0;
    let mut replays = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(VaultError::ReplayDetected) => replays += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(replays, 7);
}

#[tokio::test]
async fn test_misscoped_grant_leaves_jti_unspent() {
    let fixture = TestFixture::new().await;
    let dek = Dek::generate(16).unwrap();

    // An ingest-scoped token presented to decrypt is denied...
    let token = fixture.minter.mint(&[SCOPE_INGEST], "jti-scope");
    let err = fixture
        .vault
        .decrypt(decrypt_request(token, fixture.wrap(&dek), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::ScopeDenied));

    // ...and scope runs before consumption, so the same jti still works
    // in a correctly scoped token.
    let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-scope");
    fixture
        .vault
        .decrypt(decrypt_request(token, fixture.wrap(&dek), vec![]))
        .await
        .unwrap();

    let events = fixture.vault.recent_audit_events(10).await.unwrap();
    assert_eq!(events[1].outcome, AuditOutcome::Denied);
}

#[tokio::test]
async fn test_unknown_device_is_denied() {
    let fixture = TestFixture::new().await;
    let dek = Dek::generate(32).unwrap();

    // A keypair the vault has never seen.
    let stranger = GrantMinter::new("user-1", "dev-unregistered");
    let token = stranger.mint(&[SCOPE_DECRYPT], "jti-stranger");

    let err = fixture
        .vault
        .decrypt(decrypt_request(token, fixture.wrap(&dek), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::UnknownDevice));
}

#[tokio::test]
async fn test_revoked_device_stops_verifying() {
    let fixture = TestFixture::new().await;
    let dek = Dek::generate(32).unwrap();

    let revoked = fixture
        .vault
        .revoke_device(&fixture.minter.user, &fixture.minter.device_id)
        .await
        .unwrap();
    assert!(revoked);

    let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-after-revoke");
    let err = fixture
        .vault
        .decrypt(decrypt_request(token, fixture.wrap(&dek), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::UnknownDevice));
}

#[tokio::test]
async fn test_tampered_token_fails_signature() {
    let fixture = TestFixture::new().await;
    let dek = Dek::generate(32).unwrap();

    let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-tamper");
    // Swap in a payload claiming a different jti; signature no longer
    // covers the bytes.
    let claims = fixture.minter.claims(&[SCOPE_DECRYPT], "jti-other");
    let parts: Vec<&str> = token.split('.').collect();
    let forged_payload =
        grantlock_core::codec::b64url_encode(&serde_json::to_vec(&claims).unwrap());
    let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

    let err = fixture
        .vault
        .decrypt(decrypt_request(forged, fixture.wrap(&dek), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::SignatureInvalid));

    let events = fixture.vault.recent_audit_events(1).await.unwrap();
    assert_eq!(events[0].outcome, AuditOutcome::Denied);
}

#[tokio::test]
async fn test_expired_grant() {
    let fixture = TestFixture::new().await;
    let dek = Dek::generate(32).unwrap();

    let mut claims = fixture.minter.claims(&[SCOPE_DECRYPT], "jti-expired");
    claims.exp = now_secs() - 10;
    let token = fixture.minter.mint_claims(&claims);

    let err = fixture
        .vault
        .decrypt(decrypt_request(token, fixture.wrap(&dek), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::GrantExpired));
}

#[tokio::test]
async fn test_bad_wrapped_key_consumes_the_grant() {
    let fixture = TestFixture::new().await;

    let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-badwrap");
    let garbage = WrappedDek::from_bytes(vec![0x42; 256]);

    let err = fixture
        .vault
        .decrypt(decrypt_request(token, garbage, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::UnwrapFailed));
    assert_eq!(err.to_string(), "DEK unwrap failed");

    // Unwrap runs after consumption; the jti is gone even though the
    // request failed.
    let dek = Dek::generate(32).unwrap();
    let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-badwrap");
    let err = fixture
        .vault
        .decrypt(decrypt_request(token, fixture.wrap(&dek), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::ReplayDetected));
}

#[tokio::test]
async fn test_foreign_records_silently_absent() {
    let fixture = TestFixture::new().await;
    let dek = Dek::generate(32).unwrap();

    // A record owned by someone else entirely.
    let other = UserId::new("user-2");
    let id = fixture
        .seed_record(
            &other,
            &dek,
            &sample_document("Not Yours", 99.0),
            RecordMeta::default(),
        )
        .await;

    let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-foreign");
    let out = fixture
        .vault
        .decrypt(decrypt_request(token, fixture.wrap(&dek), vec![id.0]))
        .await
        .unwrap();

    // No error, no data: ownership is never disclosed.
    assert!(out.data.is_empty());
}

#[tokio::test]
async fn test_target_pinned_grant_rejects_other_records() {
    let fixture = TestFixture::new().await;
    let dek = Dek::generate(32).unwrap();

    let a = fixture
        .seed_record(
            &fixture.minter.user,
            &dek,
            &sample_document("A", 1.0),
            RecordMeta::default(),
        )
        .await;
    let b = fixture
        .seed_record(
            &fixture.minter.user,
            &dek,
            &sample_document("B", 2.0),
            RecordMeta::default(),
        )
        .await;

    let mut claims = fixture.minter.claims(&[SCOPE_DECRYPT], "jti-pinned");
    claims.targets = Some(vec![a.0]);
    let token = fixture.minter.mint_claims(&claims);

    let err = fixture
        .vault
        .decrypt(decrypt_request(token, fixture.wrap(&dek), vec![a.0, b.0]))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::ScopeDenied));
}

#[tokio::test]
async fn test_wrong_dek_fails_authentication() {
    let fixture = TestFixture::new().await;
    let sealed_with = Dek::generate(32).unwrap();
    let presented = Dek::generate(32).unwrap();

    let id = fixture
        .seed_record(
            &fixture.minter.user,
            &sealed_with,
            &sample_document("Cafe", 3.5),
            RecordMeta::default(),
        )
        .await;

    let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-wrongdek");
    let err = fixture
        .vault
        .decrypt(decrypt_request(token, fixture.wrap(&presented), vec![id.0]))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::AuthFailed));
}

#[tokio::test]
async fn test_server_public_key_is_published_as_pem() {
    let fixture = TestFixture::new().await;
    let key = fixture.vault.server_public_key().unwrap();
    assert_eq!(key.algorithm, "RSA-OAEP-SHA256");
    assert!(key.pem.starts_with("-----BEGIN PUBLIC KEY-----"));
}

#[tokio::test]
async fn test_audit_events_carry_request_context() {
    let fixture = TestFixture::new().await;
    let dek = Dek::generate(24).unwrap();
    let doc = sample_document("Deli", 11.0);

    let token = fixture.minter.mint(&[SCOPE_INGEST], "jti-audit");
    fixture
        .vault
        .ingest(ingest_request(token, fixture.wrap(&dek), &doc))
        .await
        .unwrap();

    let events = fixture.vault.recent_audit_events(1).await.unwrap();
    let event = &events[0];
    assert_eq!(event.endpoint, "ingest");
    assert_eq!(event.outcome, AuditOutcome::Success);
    assert_eq!(event.user, Some(fixture.minter.user.clone()));
    assert_eq!(event.device_id, Some(fixture.minter.device_id.clone()));
    assert_eq!(event.jti.as_deref(), Some("jti-audit"));
    assert_eq!(event.origin.as_deref(), Some("203.0.113.7"));
    assert_eq!(event.request_id.as_deref(), Some("req-1"));
    assert_eq!(event.targets.len(), 1);
}

#[tokio::test]
async fn test_flows_over_sqlite() {
    use std::sync::Arc;

    use grantlock::{JsonDocumentExtractor, Vault};
    use grantlock_crypto::ServerKeyPair;
    use grantlock_store::SqliteStore;
    use grantlock_testkit::wrap_for_pem;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteStore::open(dir.path().join("vault.db")).unwrap());
    let vault = Vault::new(
        ServerKeyPair::generate().unwrap(),
        store,
        Arc::new(JsonDocumentExtractor),
        VaultConfig::default(),
    );

    let minter = GrantMinter::new("user-1", "dev-1");
    vault
        .register_device(grantlock::RegisterDeviceRequest {
            user: minter.user.clone(),
            device_id: minter.device_id.clone(),
            public_key: minter.public_key_b64(),
        })
        .await
        .unwrap();

    let pem = vault.server_public_key().unwrap().pem;
    let dek = Dek::generate(32).unwrap();
    let doc = sample_document("Bodega", 6.75);

    let token = minter.mint(&[SCOPE_INGEST], "jti-sqlite-1");
    let resp = vault
        .ingest(ingest_request(token, wrap_for_pem(&pem, &dek), &doc))
        .await
        .unwrap();

    let token = minter.mint(&[SCOPE_DECRYPT], "jti-sqlite-2");
    let out = vault
        .decrypt(decrypt_request(
            token.clone(),
            wrap_for_pem(&pem, &dek),
            vec![resp.record_id.0],
        ))
        .await
        .unwrap();
    assert_eq!(out.data[0].document, doc);

    // Replay guard holds across the SQLite backend too.
    let err = vault
        .decrypt(decrypt_request(
            token,
            wrap_for_pem(&pem, &dek),
            vec![resp.record_id.0],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::ReplayDetected));
}

#[tokio::test]
async fn test_replay_ttl_covers_grant_lifetime() {
    // A config with a short replay TTL still holds markers for as long
    // as the longest-lived grant.
    let config = VaultConfig {
        max_grant_lifetime_secs: 300,
        replay_ttl_secs: 1,
    };
    let fixture = grantlock_testkit::TestFixture::with_config(
        GrantMinter::new("user-1", "dev-1"),
        config,
    )
    .await;
    let dek = Dek::generate(32).unwrap();

    let token = fixture.minter.mint(&[SCOPE_DECRYPT], "jti-ttl");
    fixture
        .vault
        .decrypt(decrypt_request(token.clone(), fixture.wrap(&dek), vec![]))
        .await
        .unwrap();

    let err = fixture
        .vault
        .decrypt(decrypt_request(token, fixture.wrap(&dek), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::ReplayDetected));
}
