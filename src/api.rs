//! Wire types for the document-processing backend.
//!
//! Three endpoints make up the whole contract:
//!
//! | Call | Shape |
//! |------|-------|
//! | `POST /api/upload` | multipart, one `file` part → [`UploadResponse`] |
//! | `GET /api/status/{jobId}` | → [`StatusResponse`] |
//! | `POST /webhook/automation` | JSON body = the job's `result` object |
//!
//! The backend mixes naming conventions on the wire (`jobId` but
//! `requires_review`), so renames here are explicit per field rather than a
//! container-level `rename_all`. Unknown fields are ignored; the full raw
//! body is preserved separately for the job log.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

// ── Media types ──────────────────────────────────────────────────────────

pub const PDF_MIME: &str = "application/pdf";
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// The two document types the backend accepts. Everything else is rejected
/// locally, before any network traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    Pdf,
    Docx,
}

impl MediaType {
    /// The MIME string sent as the part's content type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Pdf => PDF_MIME,
            MediaType::Docx => DOCX_MIME,
        }
    }

    /// Infer the media type from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(MediaType::Pdf),
            "docx" => Some(MediaType::Docx),
            _ => None,
        }
    }

    /// Accept an explicit MIME string, exactly as the backend would see it.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            PDF_MIME => Some(MediaType::Pdf),
            DOCX_MIME => Some(MediaType::Docx),
            _ => None,
        }
    }
}

/// A validated upload: file name, declared media type and raw bytes.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub media_type: MediaType,
    pub bytes: Vec<u8>,
}

impl UploadRequest {
    pub fn new(file_name: impl Into<String>, media_type: MediaType, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            media_type,
            bytes,
        }
    }
}

// ── Responses ────────────────────────────────────────────────────────────

/// Body of a successful `POST /api/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(rename = "jobId")]
    pub job_id: String,
    /// Initial backend status, e.g. `"queued"`. Informational only.
    pub status: String,
}

/// Body of `GET /api/status/{jobId}`.
///
/// `extraction`, `requires_review` and `result` are independent: the
/// backend may set any subset of them on a terminal response, and nothing
/// here validates their combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "jobId")]
    pub job_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_review: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractionReport>,
}

/// The extraction payload as it appears on the wire: either a JSON string
/// that itself encodes a document, or an already-structured value.
///
/// `untagged` tries `Text` first, so a JSON string always lands there and
/// `Structured` only ever holds non-string values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionField {
    Text(String),
    Structured(Value),
}

/// The forwardable summary the backend attaches to some succeeded jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub summary: String,
    #[serde(rename = "keyFields", default)]
    pub key_fields: serde_json::Map<String, Value>,
}

// ── Status classification ────────────────────────────────────────────────

/// What a backend status string means for the poll loop.
///
/// Matching is exact and case-sensitive; an unrecognised status keeps the
/// loop polling rather than failing the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// `done` or `completed`: success-terminal.
    Succeeded,
    /// `error` or `failed`: failure-terminal.
    Failed,
    /// Anything else: poll again after the next interval.
    Pending,
}

impl StatusKind {
    pub fn of(status: &str) -> Self {
        match status {
            "done" | "completed" => StatusKind::Succeeded,
            "error" | "failed" => StatusKind::Failed,
            _ => StatusKind::Pending,
        }
    }
}
