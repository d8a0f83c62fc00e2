//! # docpoll
//!
//! Upload documents to an extraction backend and track processing jobs to
//! completion.
//!
//! ## Why this crate?
//!
//! Backends that extract document data asynchronously hand the client a job
//! id and expect it to poll. Doing that well is all edge cases: double
//! submissions, wall-clock budgets, cancellation mid-poll, extraction
//! payloads that arrive sometimes as JSON and sometimes as a string
//! *containing* JSON, and the eternal "what did the backend actually say"
//! question. This crate owns that whole path as one cancellable state
//! machine with a bounded, persisted per-job diagnostic log, so the
//! embedding application only deals in terminal outcomes.
//!
//! ## Workflow Overview
//!
//! ```text
//! file.pdf / file.docx
//!  │
//!  ├─ 1. Validate   extension → media type, before any I/O
//!  ├─ 2. Upload     POST /api/upload (multipart)            ┐
//!  ├─ 3. Poll       GET /api/status/{jobId} on an interval  ├─▶ job log
//!  ├─ 4. Normalise  extraction (string-or-object, one shape)┘   (bounded,
//!  └─ 5. Forward    POST /webhook/automation (optional)          persisted)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docpoll::{ClientConfig, JobLogStore, UploadController};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .api_base("http://localhost:4000")
//!         .build()?;
//!     let log = Arc::new(JobLogStore::new("./logs"));
//!     let controller = UploadController::new(config, log)?;
//!
//!     let outcome = controller.submit_file("invoice.pdf").await?;
//!     if let Some(extraction) = &outcome.extraction {
//!         println!("{}", serde_json::to_string_pretty(extraction.parsed_or_raw())?);
//!     }
//!     if outcome.result.is_some() {
//!         controller.send_result().await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docpoll` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! docpoll = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod api;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod extraction;
pub mod job;
pub mod joblog;
pub mod poller;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use api::{
    ExtractionField, ExtractionReport, MediaType, StatusKind, StatusResponse, UploadRequest,
    UploadResponse, DOCX_MIME, PDF_MIME,
};
pub use client::BackendClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use controller::UploadController;
pub use error::DocpollError;
pub use extraction::Extraction;
pub use job::{Job, JobState};
pub use joblog::{JobLogStore, LogEntry, LogTag, MAX_ENTRIES_PER_JOB, UNSUBMITTED_KEY};
pub use poller::{JobOutcome, JobPoller};
pub use progress::{NoopProgressCallback, ProgressCallback, UploadProgressCallback};
