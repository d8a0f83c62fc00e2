//! The submit → poll → terminal state machine.
//!
//! ```text
//! Idle ──▶ Uploading ──▶ Polling ──▶ Succeeded
//!              │            ├──────▶ Failed
//!              │            └──────▶ TimedOut
//!              └──────────────────▶ Failed
//! ```
//!
//! One run of [`JobPoller::submit_and_poll`] owns the whole path: it
//! uploads, then polls `GET /api/status/{jobId}` on a fixed interval until
//! a terminal status arrives, the wall-clock budget runs out, or the run
//! is cancelled.
//!
//! ## Why a single cancellable task?
//!
//! The loop is one future with one suspension point per cycle: a
//! `select!` racing the [`CancellationToken`] against the interval sleep.
//! The polling budget wraps the whole loop in `tokio::time::timeout`, so
//! expiry simply drops the future, taking any in-flight status call with
//! it. Cleanup is therefore a single `cancel()` call and there is never a
//! second timer to forget: reset, teardown (`Drop`) and terminal
//! transitions all collapse to cancelling one token, and starting a new
//! sequence first cancels and replaces the previous token.
//!
//! Polls are serial. The next tick is scheduled only after the previous
//! status call completes, so a slow backend stretches the cycle instead
//! of stacking concurrent requests against the same job.
//!
//! Every transition into `Polling`, `Succeeded`, `Failed` or `TimedOut`
//! appends a tagged entry to the job log; transitions driven by a response
//! record the full raw body. Nothing is retried: each failure is terminal
//! and resubmission is the caller's call.

use crate::api::{ExtractionReport, StatusKind, UploadRequest};
use crate::client::BackendClient;
use crate::config::ClientConfig;
use crate::error::DocpollError;
use crate::extraction::{self, Extraction};
use crate::job::{Job, JobState};
use crate::joblog::{JobLogStore, LogTag, UNSUBMITTED_KEY};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything a succeeded job produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutcome {
    pub job_id: String,
    /// The terminal backend status, verbatim (`"done"` or `"completed"`).
    pub status: String,
    /// False unless the backend explicitly flagged the job for review.
    pub requires_review: bool,
    /// Forwardable summary, when the backend attached one. Independent of
    /// `requires_review`; neither implies the other.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractionReport>,
    /// Normalised extraction payload, when one was present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<Extraction>,
}

/// Drives at most one job at a time from submission to a terminal state.
///
/// All methods take `&self`; share the poller behind an [`Arc`] to cancel
/// or observe from another task while `submit_and_poll` runs.
pub struct JobPoller {
    client: BackendClient,
    config: ClientConfig,
    log: Arc<JobLogStore>,
    state: Mutex<JobState>,
    /// `(job_id, created_at)` of the current job, set once the backend
    /// accepts the upload.
    job: Mutex<Option<(String, String)>>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl JobPoller {
    pub fn new(config: ClientConfig, log: Arc<JobLogStore>) -> Result<Self, DocpollError> {
        let client = BackendClient::new(&config)?;
        Ok(Self {
            client,
            config,
            log,
            state: Mutex::new(JobState::Idle),
            job: Mutex::new(None),
            cancel: Mutex::new(None),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        *lock(&self.state)
    }

    pub(crate) fn client(&self) -> &BackendClient {
        &self.client
    }

    /// Snapshot of the tracked job, if the backend has issued an id.
    pub fn job(&self) -> Option<Job> {
        let state = self.state();
        lock(&self.job).as_ref().map(|(job_id, created_at)| Job {
            job_id: job_id.clone(),
            state,
            created_at: created_at.clone(),
        })
    }

    /// Cancel any in-flight polling sequence. Idempotent; safe to call
    /// from any task at any time.
    pub fn cancel(&self) {
        if let Some(token) = lock(&self.cancel).take() {
            token.cancel();
        }
    }

    /// Cancel and return to `Idle`, discarding the job snapshot.
    pub fn reset(&self) {
        self.cancel();
        *lock(&self.state) = JobState::Idle;
        *lock(&self.job) = None;
    }

    /// Run one full submit → poll sequence.
    ///
    /// Fails fast with [`DocpollError::UploadInProgress`] while another
    /// sequence is active. On success the job is `Succeeded` and the
    /// returned [`JobOutcome`] carries the extraction; on any error the
    /// job sits in the matching terminal state until [`Self::reset`].
    pub async fn submit_and_poll(
        &self,
        request: UploadRequest,
    ) -> Result<JobOutcome, DocpollError> {
        let cancel = self.begin()?;

        // ── Step 1: submit ───────────────────────────────────────────────
        if let Some(cb) = &self.config.progress_callback {
            cb.on_upload_start(&request.file_name);
        }
        info!(
            "Uploading '{}' ({} bytes)",
            request.file_name,
            request.bytes.len()
        );

        let (accepted, upload_body) = match self.client.upload(&request).await {
            Ok(pair) => pair,
            Err(err) => {
                // No job id exists yet, so the diagnostic lands under the
                // reserved key.
                self.log.append(
                    UNSUBMITTED_KEY,
                    LogTag::UploadError,
                    json!({ "fileName": request.file_name, "error": err.log_detail() }),
                );
                self.finish(None, JobState::Failed);
                return Err(err);
            }
        };

        let job_id = accepted.job_id.clone();
        *lock(&self.job) = Some((job_id.clone(), now_iso()));

        self.log.append(
            &job_id,
            LogTag::UploadRequest,
            json!({
                "fileName": request.file_name,
                "mediaType": request.media_type.as_str(),
                "sizeBytes": request.bytes.len(),
            }),
        );
        self.log
            .append(&job_id, LogTag::UploadResponse, upload_body);

        *lock(&self.state) = JobState::Polling;
        if let Some(cb) = &self.config.progress_callback {
            cb.on_job_submitted(&job_id);
        }
        info!(
            "Job {} accepted (status '{}'), polling every {}ms",
            job_id, accepted.status, self.config.poll_interval_ms
        );

        // ── Step 2: poll until terminal, budget expiry or cancellation ───
        let budget = Duration::from_millis(self.config.poll_budget_ms);
        let started = Instant::now();

        match timeout(budget, self.poll_loop(&job_id, &cancel)).await {
            // Budget elapsed. The loop future is dropped here, along with
            // any in-flight status call; nothing touches the network after
            // this point.
            Err(_elapsed) => {
                self.log.append(
                    &job_id,
                    LogTag::PollTimeout,
                    json!({
                        "jobId": job_id,
                        "elapsedMs": started.elapsed().as_millis() as u64,
                        "budgetMs": self.config.poll_budget_ms,
                    }),
                );
                self.finish(Some(&job_id), JobState::TimedOut);
                Err(DocpollError::PollTimedOut {
                    job_id,
                    budget_secs: self.config.poll_budget_ms / 1000,
                })
            }
            Ok(Err(DocpollError::Cancelled)) => {
                // reset() owns the state transition on cancellation.
                if self.config.debug_mode {
                    debug!("[DEBUG] polling for {} cancelled", job_id);
                }
                Err(DocpollError::Cancelled)
            }
            Ok(Err(err)) => {
                self.finish(Some(&job_id), JobState::Failed);
                Err(err)
            }
            Ok(Ok(outcome)) => {
                self.finish(Some(&job_id), JobState::Succeeded);
                Ok(outcome)
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────

    /// Claim the poller for one sequence: reject if active, replace any
    /// stale token so exactly one live token exists, move to `Uploading`.
    fn begin(&self) -> Result<CancellationToken, DocpollError> {
        let mut state = lock(&self.state);
        if state.is_active() {
            return Err(DocpollError::UploadInProgress);
        }
        let mut slot = lock(&self.cancel);
        if let Some(stale) = slot.take() {
            stale.cancel();
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());
        *state = JobState::Uploading;
        drop(slot);
        drop(state);
        *lock(&self.job) = None;
        Ok(token)
    }

    /// Interval-first serial loop. The `select!` is the single suspension
    /// point per cycle; `biased` checks cancellation before every
    /// rescheduled tick.
    async fn poll_loop(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, DocpollError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut polls: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DocpollError::Cancelled),
                _ = sleep(interval) => {}
            }

            polls += 1;
            if self.config.debug_mode {
                debug!("[DEBUG] poll {} for job {}", polls, job_id);
            }
            self.log.append(
                job_id,
                LogTag::PollRequest,
                json!({ "jobId": job_id, "poll": polls }),
            );

            let (body, raw) = match self.client.status(job_id).await {
                Ok(pair) => pair,
                Err(err) => {
                    self.log.append(
                        job_id,
                        LogTag::PollError,
                        json!({ "error": err.log_detail() }),
                    );
                    return Err(err);
                }
            };

            self.log.append(job_id, LogTag::PollResponse, raw.clone());
            if let Some(cb) = &self.config.progress_callback {
                cb.on_poll(job_id, &body.status, polls);
            }

            match StatusKind::of(&body.status) {
                StatusKind::Pending => continue,
                StatusKind::Failed => {
                    // A response-driven failure keeps the full body under
                    // the failure tag as well.
                    self.log.append(job_id, LogTag::PollError, raw);
                    return Err(DocpollError::ProcessingFailed {
                        job_id: job_id.to_string(),
                        status: body.status,
                    });
                }
                StatusKind::Succeeded => {
                    let extraction = extraction::normalize(body.extraction.clone());
                    if let Some(ext) = &extraction {
                        if ext.parse_failed {
                            self.log.append(
                                job_id,
                                LogTag::ParseError,
                                json!({ "error": ext.decode_error, "raw": ext.raw }),
                            );
                        }
                    }
                    return Ok(JobOutcome {
                        job_id: job_id.to_string(),
                        status: body.status,
                        requires_review: body.requires_review.unwrap_or(false),
                        result: body.result,
                        extraction,
                    });
                }
            }
        }
    }

    /// Terminal bookkeeping shared by every exit path: set the state, drop
    /// the token (cancelled tokens schedule nothing), notify the callback.
    fn finish(&self, job_id: Option<&str>, state: JobState) {
        *lock(&self.state) = state;
        self.cancel();
        if let Some(cb) = &self.config.progress_callback {
            cb.on_terminal(job_id, state);
        }
        let shown = job_id.unwrap_or(UNSUBMITTED_KEY);
        match state {
            JobState::Succeeded => info!("Job {} succeeded", shown),
            JobState::TimedOut => warn!("Job {} timed out", shown),
            _ => warn!("Job {} failed", shown),
        }
    }
}

impl Drop for JobPoller {
    // Teardown mid-run behaves like reset: one cancellation, nothing left
    // scheduled.
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
