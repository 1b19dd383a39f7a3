//! Document extraction seam.
//!
//! Turning raw uploaded bytes (a receipt photo) into a structured
//! document is an external collaborator's job. The vault consumes it as
//! an opaque `bytes -> document` function behind this trait, injected at
//! construction time.

use thiserror::Error;

/// Failure from the extraction collaborator.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ExtractionError(pub String);

/// Opaque bytes-to-document extraction.
///
/// Implementations may block the calling thread (OCR engines typically
/// do); the vault runs extraction before any key material is unwrapped.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, raw: &[u8]) -> Result<serde_json::Value, ExtractionError>;
}

/// Extractor that treats the raw bytes as a JSON document.
///
/// Used in tests and by clients that pre-extract on device.
pub struct JsonDocumentExtractor;

impl DocumentExtractor for JsonDocumentExtractor {
    fn extract(&self, raw: &[u8]) -> Result<serde_json::Value, ExtractionError> {
        serde_json::from_slice(raw).map_err(|e| ExtractionError(format!("invalid document: {e}")))
    }
}
