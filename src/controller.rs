//! Front door for the upload → poll → forward workflow.
//!
//! [`UploadController`] bundles the poller, the job log and the webhook
//! forwarder behind one handle an application can hold for its whole
//! lifetime. The order of operations it enforces:
//!
//! 1. validate the file (extension-based media typing, before any I/O)
//! 2. submit and poll to a terminal state ([`Self::submit_file`] /
//!    [`Self::submit_bytes`])
//! 3. optionally forward the structured result ([`Self::send_result`]),
//!    which requires a succeeded job that actually carried a result
//! 4. [`Self::reset`] back to `Idle` at any point, including mid-poll
//!
//! The outcome of the last run stays readable via [`Self::outcome`] until
//! the next submission or reset. Forward confirmation is deliberately
//! transient: [`Self::result_forwarded`] reports `true` only inside the
//! configured window after a successful webhook call, computed from the
//! forward instant rather than scheduled, so reset never has a pending
//! timer to tear down.

use crate::api::{MediaType, UploadRequest};
use crate::config::ClientConfig;
use crate::error::DocpollError;
use crate::job::{Job, JobState};
use crate::joblog::{JobLogStore, LogTag};
use crate::poller::{JobOutcome, JobPoller};
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::info;

/// Owns one document workflow at a time. See the module docs.
pub struct UploadController {
    poller: JobPoller,
    log: Arc<JobLogStore>,
    config: ClientConfig,
    outcome: Mutex<Option<JobOutcome>>,
    forwarded_at: Mutex<Option<Instant>>,
}

impl UploadController {
    /// Build a controller over `config`, writing diagnostics to `log`.
    pub fn new(config: ClientConfig, log: Arc<JobLogStore>) -> Result<Self, DocpollError> {
        let poller = JobPoller::new(config.clone(), Arc::clone(&log))?;
        Ok(Self {
            poller,
            log,
            config,
            outcome: Mutex::new(None),
            forwarded_at: Mutex::new(None),
        })
    }

    /// Validate, upload and poll a file on disk to a terminal state.
    ///
    /// The media check runs on the file name alone, before the file is
    /// read: an unsupported extension is rejected without touching the
    /// filesystem or the network, and the lifecycle state is left as-is.
    pub async fn submit_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<JobOutcome, DocpollError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = MediaType::from_path(path).ok_or(DocpollError::UnsupportedMediaType {
            file_name: file_name.clone(),
        })?;
        let bytes =
            tokio::fs::read(path)
                .await
                .map_err(|source| DocpollError::FileReadFailed {
                    path: path.to_path_buf(),
                    source,
                })?;
        self.submit_bytes(file_name, media_type, bytes).await
    }

    /// Upload an in-memory document and poll it to a terminal state.
    ///
    /// Clears the previous run's outcome first; rejects with
    /// [`DocpollError::UploadInProgress`] while a run is active. On
    /// success the outcome is stored and returned, and an extraction (if
    /// any) gets a `DISPLAY_EXTRACTION` log entry marking it ready to
    /// render.
    pub async fn submit_bytes(
        &self,
        file_name: impl Into<String>,
        media_type: MediaType,
        bytes: Vec<u8>,
    ) -> Result<JobOutcome, DocpollError> {
        // Fast reject; the poller re-checks under its own lock.
        if self.poller.state().is_active() {
            return Err(DocpollError::UploadInProgress);
        }
        *lock(&self.outcome) = None;
        *lock(&self.forwarded_at) = None;

        let request = UploadRequest::new(file_name, media_type, bytes);
        let outcome = self.poller.submit_and_poll(request).await?;

        if let Some(extraction) = &outcome.extraction {
            self.log.append(
                &outcome.job_id,
                LogTag::DisplayExtraction,
                json!({
                    "jobId": outcome.job_id,
                    "parsedExists": extraction.parsed.is_some(),
                    "parseFailed": extraction.parse_failed,
                }),
            );
        }

        *lock(&self.outcome) = Some(outcome.clone());
        Ok(outcome)
    }

    /// Forward the stored structured result to the automation webhook.
    ///
    /// Requires a succeeded job whose status response carried a `result`;
    /// anything else is [`DocpollError::ResultNotReady`]. A failed forward
    /// leaves the result in place, so the call can simply be repeated.
    pub async fn send_result(&self) -> Result<(), DocpollError> {
        if self.poller.state() != JobState::Succeeded {
            return Err(DocpollError::ResultNotReady);
        }
        let (job_id, report) = {
            let guard = lock(&self.outcome);
            match guard.as_ref() {
                Some(outcome) => match &outcome.result {
                    Some(report) => (outcome.job_id.clone(), report.clone()),
                    None => return Err(DocpollError::ResultNotReady),
                },
                None => return Err(DocpollError::ResultNotReady),
            }
        };

        match self.poller.client().forward_result(&report).await {
            Ok(()) => {
                *lock(&self.forwarded_at) = Some(Instant::now());
                info!("Result for job {} forwarded to the automation webhook", job_id);
                Ok(())
            }
            Err(err) => {
                self.log
                    .note(&job_id, format!("Webhook forward failed: {}", err.log_detail()));
                Err(err)
            }
        }
    }

    /// True inside the confirmation window after a successful forward,
    /// false before any forward and again once the window lapses.
    pub fn result_forwarded(&self) -> bool {
        let window = Duration::from_millis(self.config.forward_confirm_ms);
        match *lock(&self.forwarded_at) {
            Some(at) => at.elapsed() < window,
            None => false,
        }
    }

    /// Abandon the current job and return to `Idle`.
    ///
    /// Cancels an active polling sequence (no further status requests are
    /// issued) and discards the outcome and forward confirmation. The job
    /// log is left alone; it outlives the run it describes.
    pub fn reset(&self) {
        self.poller.reset();
        *lock(&self.outcome) = None;
        *lock(&self.forwarded_at) = None;
        info!("Upload state reset");
    }

    // ── Accessors ────────────────────────────────────────────────────────

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        self.poller.state()
    }

    /// Snapshot of the tracked job, if the backend has issued an id.
    pub fn job(&self) -> Option<Job> {
        self.poller.job()
    }

    /// Outcome of the last completed run, if it succeeded.
    pub fn outcome(&self) -> Option<JobOutcome> {
        lock(&self.outcome).clone()
    }

    /// The shared job log store.
    pub fn log(&self) -> &Arc<JobLogStore> {
        &self.log
    }

    /// The configuration this controller runs with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
