//! Error types for the docpoll library.
//!
//! Two distinct failure modes exist, and only one of them is an `Err`:
//!
//! * [`DocpollError`] — **Fatal for the job**: the upload could not be
//!   submitted, a status request failed, the backend reported a processing
//!   failure, or the polling budget ran out. Returned as `Err(DocpollError)`
//!   from [`crate::controller::UploadController`] and
//!   [`crate::poller::JobPoller`] entry points.
//!
//! * **Extraction parse failure** — non-fatal: the job itself succeeded but
//!   the extraction payload could not be decoded. This is carried inside
//!   [`crate::extraction::Extraction`] (`parse_failed` / `decode_error`) and
//!   recorded as a `PARSE_ERROR` log entry, so callers can still show the
//!   raw payload instead of losing a completed job to one bad field.
//!
//! Display strings are deliberately short and user-facing. The full backend
//! response bodies never appear in the message; they are recorded in the
//! per-job log (see [`crate::joblog::JobLogStore`]) where they belong.
//! No variant is retried automatically: every failure is terminal for the
//! job it belongs to, and the caller decides whether to resubmit.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docpoll library.
///
/// Extraction parse failures are not here; see
/// [`crate::extraction::Extraction::parse_failed`].
#[derive(Debug, Error)]
pub enum DocpollError {
    // ── Validation errors (local, never logged to the job log) ───────────
    /// The selected file is not one of the two accepted document types.
    #[error("Please select a PDF or DOCX file\n'{file_name}' has an unsupported media type.")]
    UnsupportedMediaType { file_name: String },

    /// The input file could not be read before uploading.
    #[error("Failed to read '{path}': {source}\nCheck the path exists and is readable.")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A job is already uploading or polling on this controller.
    #[error("An upload is already in progress.\nWait for it to finish or call reset() first.")]
    UploadInProgress,

    // ── Submission errors ────────────────────────────────────────────────
    /// The upload request failed (transport error, non-2xx response, or a
    /// success response without a job id). `reason` holds the diagnostic
    /// detail; it is logged, not displayed.
    #[error("Upload failed. Please try again.")]
    SubmissionFailed { reason: String },

    // ── Polling errors ───────────────────────────────────────────────────
    /// A status request failed at the transport or HTTP level.
    #[error("Status check failed")]
    StatusRequestFailed { job_id: String, reason: String },

    /// The backend reported a failure-terminal status for the job.
    #[error("Processing failed")]
    ProcessingFailed { job_id: String, status: String },

    /// No terminal status arrived within the polling budget.
    #[error("Processing timeout")]
    PollTimedOut { job_id: String, budget_secs: u64 },

    /// The polling sequence was cancelled by reset or teardown before a
    /// terminal status was observed.
    #[error("Job cancelled before completion")]
    Cancelled,

    // ── Forwarding errors ────────────────────────────────────────────────
    /// The automation webhook rejected the result or was unreachable.
    #[error("Failed to send result to the automation webhook")]
    ForwardingFailed { reason: String },

    /// `send_result` was called before a succeeded job produced a result.
    #[error("No forwardable result yet.\nA result can be sent only after a job has succeeded.")]
    ResultNotReady,

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ───────────────────────────────────────────────────────
    /// Could not write a log export artifact.
    #[error("Failed to write log export '{path}': {source}")]
    LogExportFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DocpollError {
    /// Diagnostic detail for the job log, where the full reason belongs.
    ///
    /// Falls back to the display string for variants without a hidden
    /// detail field.
    pub fn log_detail(&self) -> String {
        match self {
            DocpollError::SubmissionFailed { reason } => reason.clone(),
            DocpollError::StatusRequestFailed { job_id, reason } => {
                format!("job {job_id}: {reason}")
            }
            DocpollError::ProcessingFailed { job_id, status } => {
                format!("job {job_id}: backend status '{status}'")
            }
            DocpollError::PollTimedOut {
                job_id,
                budget_secs,
            } => format!("job {job_id}: no terminal status within {budget_secs}s"),
            DocpollError::ForwardingFailed { reason } => reason.clone(),
            other => other.to_string(),
        }
    }
}
