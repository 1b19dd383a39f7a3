//! The vault: orchestration of the two protocol flows.
//!
//! [`Vault`] wires the grant pipeline, the replay guard, DEK unwrapping,
//! and the envelope cipher into the ingest and decrypt flows. The step
//! order is fixed and identical for both:
//!
//! 1. decode the token
//! 2. resolve the active device key for (sub, kid)
//! 3. verify signature, temporal validity, and scope
//! 4. consume the jti (atomic insert-if-absent)
//! 5. unwrap the DEK
//! 6. seal or open payloads
//!
//! Any failure is terminal for the request, and every terminal outcome —
//! success or failure — is appended to the audit trail. An audit write
//! failure is logged and never fails the flow it describes.

use std::sync::Arc;

use grantlock_core::{
    codec, now_secs, AuditEvent, AuditOutcome, DeviceId, DeviceKey, Ed25519PublicKey, ParsedGrant,
    RecordId, UserId, VerifiedGrant, SCOPE_DECRYPT, SCOPE_INGEST,
};
use grantlock_crypto::{envelope, ServerKeyPair, RECEIPT_CONTEXT, WRAP_ALGORITHM};
use grantlock_store::{ConsumeResult, Store};
use tracing::{debug, warn};

use crate::error::{Result, VaultError};
use crate::extract::DocumentExtractor;
use crate::requests::{
    DecryptRequest, DecryptResponse, DecryptedRecord, IngestRequest, IngestResponse,
    RegisterDeviceRequest, ServerPublicKey,
};

/// Tunable limits for the vault.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Longest `exp - now` a grant may have and still have its replay
    /// marker outlive it. Seconds.
    pub max_grant_lifetime_secs: i64,
    /// Minimum lifetime of a spent-grant marker. Seconds. The effective
    /// TTL is never below `max_grant_lifetime_secs`.
    pub replay_ttl_secs: i64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            max_grant_lifetime_secs: 300,
            replay_ttl_secs: 300,
        }
    }
}

impl VaultConfig {
    /// Effective marker TTL: a marker must never expire before the grant
    /// it spent could still be presented.
    fn effective_ttl(&self) -> i64 {
        self.replay_ttl_secs.max(self.max_grant_lifetime_secs)
    }
}

/// Mutable audit context threaded through a flow.
///
/// Fields fill in as the pipeline learns them, so a failure early in the
/// pipeline still produces an event with whatever was known at that point.
struct FlowAudit {
    endpoint: &'static str,
    user: Option<UserId>,
    device_id: Option<DeviceId>,
    jti: Option<String>,
    targets: Vec<RecordId>,
    origin: Option<String>,
    request_id: Option<String>,
}

impl FlowAudit {
    fn new(endpoint: &'static str, origin: Option<String>, request_id: Option<String>) -> Self {
        Self {
            endpoint,
            user: None,
            device_id: None,
            jti: None,
            targets: Vec::new(),
            origin,
            request_id,
        }
    }

    fn into_event(self, outcome: AuditOutcome, extra: serde_json::Value) -> AuditEvent {
        let mut event = AuditEvent::new(self.endpoint, outcome, now_secs());
        event.user = self.user;
        event.device_id = self.device_id;
        event.jti = self.jti;
        event.targets = self.targets;
        event.origin = self.origin;
        event.request_id = self.request_id;
        event.extra = extra;
        event
    }
}

/// How a failed flow is tagged in the audit trail.
fn audit_outcome(err: &VaultError) -> AuditOutcome {
    match err {
        VaultError::ReplayDetected => AuditOutcome::Replay,
        VaultError::UnknownDevice | VaultError::SignatureInvalid | VaultError::ScopeDenied => {
            AuditOutcome::Denied
        }
        _ => AuditOutcome::Error,
    }
}

/// The protocol orchestrator.
///
/// Generic over the store so tests run against [`grantlock_store::MemoryStore`]
/// and deployments against [`grantlock_store::SqliteStore`].
pub struct Vault<S: Store> {
    server_keys: ServerKeyPair,
    store: Arc<S>,
    extractor: Arc<dyn DocumentExtractor>,
    config: VaultConfig,
}

impl<S: Store> Vault<S> {
    pub fn new(
        server_keys: ServerKeyPair,
        store: Arc<S>,
        extractor: Arc<dyn DocumentExtractor>,
        config: VaultConfig,
    ) -> Self {
        Self {
            server_keys,
            store,
            extractor,
            config,
        }
    }

    /// The store, for maintenance tooling.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Device Key Registry
    // ─────────────────────────────────────────────────────────────────────────

    /// Register (or rotate) the signing key for a device.
    ///
    /// Upserts: one active key per (user, device_id), re-registration
    /// overwrites. The key must be a valid Ed25519 point.
    pub async fn register_device(&self, req: RegisterDeviceRequest) -> Result<()> {
        let public_key = Ed25519PublicKey::from_b64(&req.public_key)
            .map_err(|_| VaultError::InvalidDeviceKey("not a valid Ed25519 key".into()))?;

        let key = DeviceKey {
            user: req.user,
            device_id: req.device_id,
            public_key,
            is_active: true,
            created_at: now_secs(),
        };
        self.store.upsert_device_key(&key).await?;
        debug!(user = %key.user, device = %key.device_id, "device key registered");
        Ok(())
    }

    /// Deactivate a device's key. Grants signed by it stop verifying at
    /// the key-resolution step. Returns `true` if an active key existed.
    pub async fn revoke_device(&self, user: &UserId, device_id: &DeviceId) -> Result<bool> {
        let revoked = self.store.deactivate_device_key(user, device_id).await?;
        if revoked {
            debug!(user = %user, device = %device_id, "device key revoked");
        }
        Ok(revoked)
    }

    /// The server's wrapping key, published so clients can wrap DEKs.
    pub fn server_public_key(&self) -> Result<ServerPublicKey> {
        Ok(ServerPublicKey {
            algorithm: WRAP_ALGORITHM.to_string(),
            pem: self.server_keys.public_key_pem()?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Trail
    // ─────────────────────────────────────────────────────────────────────────

    /// Most recent audit events, newest first.
    pub async fn recent_audit_events(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        Ok(self.store.list_audit(limit).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Protocol Flows
    // ─────────────────────────────────────────────────────────────────────────

    /// Ingest flow: extract, encrypt, store.
    pub async fn ingest(&self, req: IngestRequest) -> Result<IngestResponse> {
        let mut audit = FlowAudit::new("ingest", req.origin.clone(), req.request_id.clone());
        let result = self.ingest_inner(&req, &mut audit).await;
        self.finish(audit, &result, |resp| {
            serde_json::json!({ "record_id": resp.record_id })
        })
        .await;
        result
    }

    async fn ingest_inner(
        &self,
        req: &IngestRequest,
        audit: &mut FlowAudit,
    ) -> Result<IngestResponse> {
        let grant = self
            .verify_and_consume(&req.token, SCOPE_INGEST, audit)
            .await?;

        // Extraction runs before any key material is unwrapped, so an
        // extraction failure never touches the DEK.
        let document = self
            .extractor
            .extract(&req.raw_document)
            .map_err(|e| VaultError::ExtractionFailed(e.to_string()))?;
        let plaintext =
            codec::canonical_json(&document).map_err(|_| VaultError::PersistenceFailed)?;

        let dek = self.server_keys.unwrap_dek(&req.wrapped_key)?;
        let sealed = envelope::seal(&dek, &plaintext, RECEIPT_CONTEXT)?;
        drop(dek);

        let record_id = self
            .store
            .insert_record(&grant.sub, &req.meta, &sealed, now_secs())
            .await?;
        audit.targets.push(record_id);

        Ok(IngestResponse { record_id })
    }

    /// Decrypt flow: verify, open owned records, return plaintext.
    pub async fn decrypt(&self, req: DecryptRequest) -> Result<DecryptResponse> {
        let mut audit = FlowAudit::new("decrypt", req.origin.clone(), req.request_id.clone());
        audit.targets = req.targets.clone();
        let result = self.decrypt_inner(&req, &mut audit).await;
        self.finish(audit, &result, |resp| {
            serde_json::json!({ "returned": resp.data.len() })
        })
        .await;
        result
    }

    async fn decrypt_inner(
        &self,
        req: &DecryptRequest,
        audit: &mut FlowAudit,
    ) -> Result<DecryptResponse> {
        let grant = self
            .verify_and_consume(&req.token, SCOPE_DECRYPT, audit)
            .await?;

        // A target-pinned grant only opens the records it names.
        if let Some(allowed) = &grant.targets {
            if req.targets.iter().any(|t| !allowed.contains(t)) {
                return Err(VaultError::ScopeDenied);
            }
        }

        let dek = self.server_keys.unwrap_dek(&req.wrapped_key)?;

        // Records the caller does not own are silently absent here, never
        // reported as someone else's.
        let records = self.store.get_records_owned(&grant.sub, &req.targets).await?;

        let mut data = Vec::with_capacity(records.len());
        for record in &records {
            let plaintext = envelope::open(&dek, &record.body, RECEIPT_CONTEXT)?;
            let document = serde_json::from_slice(&plaintext)
                .map_err(|_| VaultError::PersistenceFailed)?;
            data.push(DecryptedRecord {
                id: record.id,
                document,
            });
        }
        drop(dek);

        Ok(DecryptResponse {
            data,
            processed_at: now_secs(),
        })
    }

    /// Steps 1-4, shared by both flows: decode, resolve key, verify,
    /// consume the jti.
    async fn verify_and_consume(
        &self,
        token: &str,
        required_scope: &str,
        audit: &mut FlowAudit,
    ) -> Result<VerifiedGrant> {
        let parsed = ParsedGrant::decode(token)?;
        let sub = parsed.subject();
        let kid = parsed.kid();
        audit.user = Some(sub.clone());
        audit.device_id = Some(kid.clone());

        let key = self
            .store
            .get_active_device_key(&sub, &kid)
            .await?
            .ok_or(VaultError::UnknownDevice)?;

        let now = now_secs();
        let grant = parsed.verify(&key, now, required_scope)?;
        audit.jti = Some(grant.jti.clone());

        // The marker must outlive the grant itself, whichever is longer.
        let expires_at = grant.exp.max(now + self.config.effective_ttl());
        let marker = grantlock_core::SpentGrant {
            jti: grant.jti.clone(),
            user: grant.sub.clone(),
            device_id: grant.device_id.clone(),
            consumed_at: now,
            expires_at: Some(expires_at),
        };
        match self.store.consume_grant(&marker).await? {
            ConsumeResult::Consumed => Ok(grant),
            ConsumeResult::Replayed => Err(VaultError::ReplayDetected),
        }
    }

    /// Append the terminal outcome of a flow to the audit trail.
    ///
    /// An audit write failure must not turn a completed flow into an
    /// error, so it is logged and swallowed here.
    async fn finish<T>(
        &self,
        audit: FlowAudit,
        result: &Result<T>,
        success_extra: impl FnOnce(&T) -> serde_json::Value,
    ) {
        let event = match result {
            Ok(resp) => audit.into_event(AuditOutcome::Success, success_extra(resp)),
            Err(err) => audit.into_event(
                audit_outcome(err),
                serde_json::json!({ "code": err.code() }),
            ),
        };
        if let Err(e) = self.store.append_audit(&event).await {
            warn!(endpoint = %event.endpoint, error = %e, "audit append failed");
        }
    }
}
