//! Integration tests for the full upload → poll → terminal lifecycle.
//!
//! Every test runs against a [wiremock] server standing in for the
//! extraction backend, with polling wound down to tens of milliseconds so
//! timeout and cancellation paths complete quickly.
//!
//! Run with:
//!   cargo test --test lifecycle

use docpoll::{
    ClientConfig, DocpollError, JobLogStore, JobOutcome, JobState, LogTag, MediaType,
    UploadController, UNSUBMITTED_KEY,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Test helpers ─────────────────────────────────────────────────────────────

const PDF_BYTES: &[u8] = b"%PDF-1.4 not a real document";

/// Polling wound down so budget and cancellation paths finish in tests.
fn fast_config(server: &MockServer) -> ClientConfig {
    ClientConfig::builder()
        .api_base(server.uri())
        .poll_interval_ms(25)
        .poll_budget_ms(2_000)
        .request_timeout_secs(5)
        .forward_confirm_ms(80)
        .build()
        .expect("valid test config")
}

fn controller_over(server: &MockServer) -> (TempDir, UploadController) {
    let dir = TempDir::new().expect("temp dir");
    let log = Arc::new(JobLogStore::new(dir.path()));
    let controller = UploadController::new(fast_config(server), log).expect("controller");
    (dir, controller)
}

async fn mount_upload(server: &MockServer, job_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jobId": job_id, "status": "queued" })),
        )
        .mount(server)
        .await;
}

async fn mount_status(server: &MockServer, job_id: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/status/{job_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn submit_pdf(controller: &UploadController) -> Result<JobOutcome, DocpollError> {
    controller
        .submit_bytes("report.pdf", MediaType::Pdf, PDF_BYTES.to_vec())
        .await
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn processing_then_done_yields_outcome() {
    let server = MockServer::start().await;
    mount_upload(&server, "j1").await;

    // Two pending polls, then a terminal response with a doubly-encoded
    // extraction and the review flag set.
    Mock::given(method("GET"))
        .and(path("/api/status/j1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jobId": "j1", "status": "processing" })),
        )
        .up_to_n_times(2)
        .mount(&server)
        .await;
    mount_status(
        &server,
        "j1",
        json!({
            "jobId": "j1",
            "status": "done",
            "extraction": "{\"summary\":\"ok\",\"fields\":{\"invoice\":\"A-17\"}}",
            "requires_review": true,
        }),
    )
    .await;

    let (_dir, controller) = controller_over(&server);
    let outcome = submit_pdf(&controller).await.expect("job completes");

    assert_eq!(outcome.job_id, "j1");
    assert_eq!(outcome.status, "done");
    assert!(outcome.requires_review);
    assert_eq!(controller.state(), JobState::Succeeded);

    let extraction = outcome.extraction.expect("extraction present");
    assert!(!extraction.parse_failed);
    assert_eq!(extraction.parsed.as_ref().unwrap()["summary"], "ok");
    assert_eq!(
        extraction.parsed.as_ref().unwrap()["fields"]["invoice"],
        "A-17"
    );

    // Newest first: the render marker tops the log, the upload request sits
    // at the bottom.
    let entries = controller.log().entries("j1");
    assert_eq!(entries[0].tag, LogTag::DisplayExtraction);
    assert_eq!(entries.last().unwrap().tag, LogTag::UploadRequest);
    assert!(entries.iter().any(|e| e.tag == LogTag::PollResponse));
}

#[tokio::test]
async fn structured_extraction_passes_through() {
    let server = MockServer::start().await;
    mount_upload(&server, "j2").await;
    mount_status(
        &server,
        "j2",
        json!({
            "jobId": "j2",
            "status": "completed",
            "extraction": { "summary": "ok", "total": 12 },
        }),
    )
    .await;

    let (_dir, controller) = controller_over(&server);
    let outcome = submit_pdf(&controller).await.expect("job completes");

    assert_eq!(outcome.status, "completed");
    assert!(!outcome.requires_review);
    let extraction = outcome.extraction.expect("extraction present");
    assert_eq!(extraction.raw, json!({ "summary": "ok", "total": 12 }));
    assert_eq!(extraction.parsed, Some(json!({ "summary": "ok", "total": 12 })));
    assert!(!extraction.parse_failed);
}

#[tokio::test]
async fn malformed_extraction_string_is_not_fatal() {
    let server = MockServer::start().await;
    mount_upload(&server, "j3").await;
    mount_status(
        &server,
        "j3",
        json!({ "jobId": "j3", "status": "done", "extraction": "{not json" }),
    )
    .await;

    let (_dir, controller) = controller_over(&server);
    let outcome = submit_pdf(&controller).await.expect("job still succeeds");

    assert_eq!(controller.state(), JobState::Succeeded);
    let extraction = outcome.extraction.expect("extraction present");
    assert!(extraction.parse_failed);
    assert!(extraction.parsed.is_none());
    assert_eq!(extraction.raw, json!("{not json"));

    let entries = controller.log().entries("j3");
    assert!(entries.iter().any(|e| e.tag == LogTag::ParseError));
}

// ── Failure paths ────────────────────────────────────────────────────────────

#[tokio::test]
async fn error_status_fails_the_job() {
    let server = MockServer::start().await;
    mount_upload(&server, "j4").await;
    mount_status(&server, "j4", json!({ "jobId": "j4", "status": "error" })).await;

    let (_dir, controller) = controller_over(&server);
    let err = submit_pdf(&controller).await.unwrap_err();

    assert!(matches!(err, DocpollError::ProcessingFailed { ref status, .. } if status == "error"));
    assert_eq!(err.to_string(), "Processing failed");
    assert_eq!(controller.state(), JobState::Failed);
    assert!(controller.outcome().is_none());

    let entries = controller.log().entries("j4");
    assert!(entries.iter().any(|e| e.tag == LogTag::PollError));
}

#[tokio::test]
async fn upload_rejection_logs_under_unsubmitted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .mount(&server)
        .await;

    let (_dir, controller) = controller_over(&server);
    let err = submit_pdf(&controller).await.unwrap_err();

    assert!(matches!(err, DocpollError::SubmissionFailed { .. }));
    assert!(err.to_string().contains("Upload failed. Please try again."));
    assert_eq!(controller.state(), JobState::Failed);

    // No job id exists, so the diagnostic lands under the reserved key and
    // carries the HTTP detail the short message hides.
    let entries = controller.log().entries(UNSUBMITTED_KEY);
    assert_eq!(entries[0].tag, LogTag::UploadError);
    assert!(entries[0].detail["error"].as_str().unwrap().contains("500"));
}

#[tokio::test]
async fn upload_response_without_job_id_is_a_submission_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let (_dir, controller) = controller_over(&server);
    let err = submit_pdf(&controller).await.unwrap_err();
    assert!(matches!(err, DocpollError::SubmissionFailed { .. }));
    assert_eq!(controller.state(), JobState::Failed);
}

#[tokio::test]
async fn status_endpoint_failure_fails_the_job() {
    let server = MockServer::start().await;
    mount_upload(&server, "j5").await;
    Mock::given(method("GET"))
        .and(path("/api/status/j5"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_dir, controller) = controller_over(&server);
    let err = submit_pdf(&controller).await.unwrap_err();

    assert!(matches!(err, DocpollError::StatusRequestFailed { .. }));
    assert_eq!(err.to_string(), "Status check failed");
    assert_eq!(controller.state(), JobState::Failed);

    let entries = controller.log().entries("j5");
    assert!(entries.iter().any(|e| e.tag == LogTag::PollError));
}

// ── Budget and cancellation ──────────────────────────────────────────────────

#[tokio::test]
async fn budget_expiry_times_out_and_stops_polling() {
    let server = MockServer::start().await;
    mount_upload(&server, "j6").await;
    mount_status(&server, "j6", json!({ "jobId": "j6", "status": "processing" })).await;

    let dir = TempDir::new().expect("temp dir");
    let log = Arc::new(JobLogStore::new(dir.path()));
    let config = ClientConfig::builder()
        .api_base(server.uri())
        .poll_interval_ms(40)
        .poll_budget_ms(200)
        .build()
        .expect("valid test config");
    let controller = UploadController::new(config, log).expect("controller");

    let err = submit_pdf(&controller).await.unwrap_err();
    assert!(matches!(err, DocpollError::PollTimedOut { .. }));
    assert_eq!(err.to_string(), "Processing timeout");
    assert_eq!(controller.state(), JobState::TimedOut);

    let entries = controller.log().entries("j6");
    assert_eq!(entries[0].tag, LogTag::PollTimeout);

    // The loop future was dropped with the budget: no further requests.
    let before = server.received_requests().await.expect("recording on").len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let after = server.received_requests().await.expect("recording on").len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn reset_during_polling_cancels_cleanly() {
    let server = MockServer::start().await;
    mount_upload(&server, "j7").await;
    mount_status(&server, "j7", json!({ "jobId": "j7", "status": "processing" })).await;

    let dir = TempDir::new().expect("temp dir");
    let log = Arc::new(JobLogStore::new(dir.path()));
    let controller =
        Arc::new(UploadController::new(fast_config(&server), log).expect("controller"));

    let background = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { submit_pdf(&controller).await })
    };

    // Let a few polls happen, then pull the plug.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(controller.state(), JobState::Polling);
    controller.reset();

    let first = background.await.expect("task joins");
    assert!(matches!(first, Err(DocpollError::Cancelled)));
    assert_eq!(controller.state(), JobState::Idle);
    assert!(controller.job().is_none());

    let before = server.received_requests().await.expect("recording on").len();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let after = server.received_requests().await.expect("recording on").len();
    assert_eq!(before, after);
}

#[tokio::test]
async fn second_submission_while_active_is_rejected() {
    let server = MockServer::start().await;
    mount_upload(&server, "j8").await;
    mount_status(&server, "j8", json!({ "jobId": "j8", "status": "processing" })).await;

    let dir = TempDir::new().expect("temp dir");
    let log = Arc::new(JobLogStore::new(dir.path()));
    let controller =
        Arc::new(UploadController::new(fast_config(&server), log).expect("controller"));

    let background = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { submit_pdf(&controller).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.state(), JobState::Polling);

    let err = submit_pdf(&controller).await.unwrap_err();
    assert!(matches!(err, DocpollError::UploadInProgress));

    controller.reset();
    let first = background.await.expect("task joins");
    assert!(matches!(first, Err(DocpollError::Cancelled)));
}

#[tokio::test]
async fn resubmission_after_terminal_state_succeeds() {
    let server = MockServer::start().await;

    // First upload yields j9 which fails; the retry yields j10 which
    // completes.
    Mock::given(method("POST"))
        .and(path("/api/upload"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jobId": "j9", "status": "queued" })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_upload(&server, "j10").await;
    mount_status(&server, "j9", json!({ "jobId": "j9", "status": "failed" })).await;
    mount_status(&server, "j10", json!({ "jobId": "j10", "status": "done" })).await;

    let (_dir, controller) = controller_over(&server);

    let err = submit_pdf(&controller).await.unwrap_err();
    assert!(matches!(err, DocpollError::ProcessingFailed { ref status, .. } if status == "failed"));
    assert_eq!(controller.state(), JobState::Failed);

    let outcome = submit_pdf(&controller).await.expect("retry completes");
    assert_eq!(outcome.job_id, "j10");
    assert!(outcome.extraction.is_none());
    assert_eq!(controller.state(), JobState::Succeeded);

    // Both runs left their own log trail.
    let ids = controller.log().tracked_job_ids();
    assert!(ids.contains(&"j9".to_string()));
    assert!(ids.contains(&"j10".to_string()));
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_extension_never_reaches_the_backend() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("temp dir");
    let file = dir.path().join("notes.txt");
    std::fs::write(&file, b"plain text").expect("write test file");

    let log = Arc::new(JobLogStore::new(dir.path().join("logs")));
    let controller = UploadController::new(fast_config(&server), log).expect("controller");

    let err = controller.submit_file(&file).await.unwrap_err();
    assert!(matches!(
        err,
        DocpollError::UnsupportedMediaType { ref file_name } if file_name == "notes.txt"
    ));
    assert!(err.to_string().starts_with("Please select a PDF or DOCX file"));
    assert_eq!(controller.state(), JobState::Idle);

    let requests = server.received_requests().await.expect("recording on");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn docx_files_are_accepted() {
    let server = MockServer::start().await;
    mount_upload(&server, "j11").await;
    mount_status(&server, "j11", json!({ "jobId": "j11", "status": "done" })).await;

    let dir = TempDir::new().expect("temp dir");
    let file = dir.path().join("Contract.DOCX");
    std::fs::write(&file, b"PK fake docx").expect("write test file");

    let log = Arc::new(JobLogStore::new(dir.path().join("logs")));
    let controller = UploadController::new(fast_config(&server), log).expect("controller");

    let outcome = controller.submit_file(&file).await.expect("docx accepted");
    assert_eq!(outcome.job_id, "j11");
}

// ── Webhook forwarding ───────────────────────────────────────────────────────

const RESULT_BODY: &str = "Invoice A-17 processed";

async fn mount_done_with_result(server: &MockServer, job_id: &str) {
    mount_upload(server, job_id).await;
    mount_status(
        server,
        job_id,
        json!({
            "jobId": job_id,
            "status": "done",
            "extraction": { "summary": RESULT_BODY },
            "result": {
                "summary": RESULT_BODY,
                "keyFields": { "invoice": "A-17", "total": "129.00" },
            },
        }),
    )
    .await;
}

#[tokio::test]
async fn forward_sends_result_and_confirmation_lapses() {
    let server = MockServer::start().await;
    mount_done_with_result(&server, "j12").await;

    // The webhook mock only matches the exact forwarded body; a mismatch
    // would 404 and fail the forward.
    Mock::given(method("POST"))
        .and(path("/webhook/automation"))
        .and(body_json(json!({
            "summary": RESULT_BODY,
            "keyFields": { "invoice": "A-17", "total": "129.00" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let (_dir, controller) = controller_over(&server);
    submit_pdf(&controller).await.expect("job completes");

    assert!(!controller.result_forwarded());
    controller.send_result().await.expect("forward ok");
    assert!(controller.result_forwarded());

    // Confirmation is a window, not a latch.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!controller.result_forwarded());
}

#[tokio::test]
async fn forward_failure_leaves_result_intact() {
    let server = MockServer::start().await;
    mount_done_with_result(&server, "j13").await;

    Mock::given(method("POST"))
        .and(path("/webhook/automation"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/webhook/automation"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (_dir, controller) = controller_over(&server);
    submit_pdf(&controller).await.expect("job completes");

    let err = controller.send_result().await.unwrap_err();
    assert!(matches!(err, DocpollError::ForwardingFailed { .. }));
    assert!(!controller.result_forwarded());

    // The failure left a note in the job log and the result in place, so
    // the same call simply works once the webhook recovers.
    let entries = controller.log().entries("j13");
    assert_eq!(entries[0].tag, LogTag::DebugNote);
    controller.send_result().await.expect("retry ok");
    assert!(controller.result_forwarded());
}

#[tokio::test]
async fn send_result_requires_a_result_payload() {
    let server = MockServer::start().await;
    mount_upload(&server, "j14").await;
    mount_status(
        &server,
        "j14",
        json!({ "jobId": "j14", "status": "done", "extraction": "{\"a\":1}" }),
    )
    .await;

    let (_dir, controller) = controller_over(&server);
    submit_pdf(&controller).await.expect("job completes");

    // Succeeded, but the backend attached no structured result.
    let err = controller.send_result().await.unwrap_err();
    assert!(matches!(err, DocpollError::ResultNotReady));

    let requests = server.received_requests().await.expect("recording on");
    assert!(requests
        .iter()
        .all(|r| r.url.path() != "/webhook/automation"));
}
