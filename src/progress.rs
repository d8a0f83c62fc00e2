//! Progress-callback trait for job lifecycle events.
//!
//! Inject an [`Arc<dyn UploadProgressCallback>`] via
//! [`crate::config::ClientConfigBuilder::progress_callback`] to receive
//! real-time events as a job moves from upload through polling to a
//! terminal state.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers
//! can forward events to a channel, a WebSocket, a database record, or a
//! terminal spinner without the library knowing anything about how the
//! host application communicates. (The per-job *log* additionally exposes
//! a broadcast stream, see [`crate::joblog::JobLogStore::subscribe`];
//! these carry diagnostics, while the callback carries lifecycle.)
//!
//! # Example
//!
//! ```rust
//! use docpoll::{ClientConfig, UploadProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//!
//! struct CountingCallback {
//!     polls: AtomicU32,
//! }
//!
//! impl UploadProgressCallback for CountingCallback {
//!     fn on_poll(&self, job_id: &str, status: &str, polls: u32) {
//!         self.polls.store(polls, Ordering::SeqCst);
//!         eprintln!("{job_id}: {status} (poll {polls})");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { polls: AtomicU32::new(0) });
//! let config = ClientConfig::builder()
//!     .progress_callback(counter as Arc<dyn UploadProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::job::JobState;
use std::sync::Arc;

/// Called by the poller as the tracked job changes.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`; events for
/// one job arrive in order (polls are serial), but the same callback may be
/// shared across controllers.
pub trait UploadProgressCallback: Send + Sync {
    /// Called once when the upload request is about to be sent.
    ///
    /// # Arguments
    /// * `file_name` — name of the document being submitted
    fn on_upload_start(&self, file_name: &str) {
        let _ = file_name;
    }

    /// Called when the backend accepted the upload and issued a job id.
    fn on_job_submitted(&self, job_id: &str) {
        let _ = job_id;
    }

    /// Called after every status response, terminal or not.
    ///
    /// # Arguments
    /// * `job_id` — the tracked job
    /// * `status` — backend status string, verbatim
    /// * `polls`  — 1-based count of completed status requests
    fn on_poll(&self, job_id: &str, status: &str, polls: u32) {
        let _ = (job_id, status, polls);
    }

    /// Called exactly once per run when the job reaches `Succeeded`,
    /// `Failed` or `TimedOut`. `job_id` is `None` when submission failed
    /// before the backend issued an id. Not called on cancellation.
    fn on_terminal(&self, job_id: Option<&str>, state: JobState) {
        let _ = (job_id, state);
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl UploadProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ClientConfig`].
pub type ProgressCallback = Arc<dyn UploadProgressCallback>;
