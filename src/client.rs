//! HTTP layer: the three backend calls.
//!
//! A thin wrapper over a shared [`reqwest::Client`] that speaks the wire
//! contract in [`crate::api`] and maps transport failures into the error
//! taxonomy. Response-returning calls hand back *both* the typed struct and
//! the raw body [`Value`]: the poller logs the raw body, so fields this
//! crate does not model still show up in diagnostics.
//!
//! The per-call timeout comes from
//! [`crate::config::ClientConfig::request_timeout_secs`]; the overall
//! polling budget is enforced a level up, in the poller.

use crate::api::{ExtractionReport, StatusResponse, UploadRequest, UploadResponse};
use crate::config::ClientConfig;
use crate::error::DocpollError;
use reqwest::multipart;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Shared HTTP client bound to one backend base URL.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    api_base: String,
}

impl BackendClient {
    /// Build a client from the config's base URL and request timeout.
    pub fn new(config: &ClientConfig) -> Result<Self, DocpollError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DocpollError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base: config.api_base.clone(),
        })
    }

    /// `POST /api/upload`: submit the document as one multipart `file` part.
    ///
    /// Success means a 2xx response whose body parses and carries a job id;
    /// anything else is a submission failure.
    pub async fn upload(
        &self,
        request: &UploadRequest,
    ) -> Result<(UploadResponse, Value), DocpollError> {
        let url = format!("{}/api/upload", self.api_base);
        debug!(
            "POST {} ({}, {} bytes)",
            url,
            request.file_name,
            request.bytes.len()
        );

        let part = multipart::Part::bytes(request.bytes.clone())
            .file_name(request.file_name.clone())
            .mime_str(request.media_type.as_str())
            .map_err(|e| DocpollError::SubmissionFailed {
                reason: format!("invalid part media type: {e}"),
            })?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| DocpollError::SubmissionFailed {
                reason: describe_transport(&e),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DocpollError::SubmissionFailed {
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(DocpollError::SubmissionFailed {
                reason: http_reason(status.as_u16(), &text),
            });
        }

        let body: Value =
            serde_json::from_str(&text).map_err(|e| DocpollError::SubmissionFailed {
                reason: format!("unparseable response body: {e}"),
            })?;
        let typed: UploadResponse =
            serde_json::from_value(body.clone()).map_err(|e| DocpollError::SubmissionFailed {
                reason: format!("response did not carry a job id: {e}"),
            })?;

        Ok((typed, body))
    }

    /// `GET /api/status/{jobId}`.
    pub async fn status(&self, job_id: &str) -> Result<(StatusResponse, Value), DocpollError> {
        let url = format!("{}/api/status/{}", self.api_base, job_id);

        let response =
            self.http
                .get(&url)
                .send()
                .await
                .map_err(|e| DocpollError::StatusRequestFailed {
                    job_id: job_id.to_string(),
                    reason: describe_transport(&e),
                })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DocpollError::StatusRequestFailed {
                job_id: job_id.to_string(),
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            return Err(DocpollError::StatusRequestFailed {
                job_id: job_id.to_string(),
                reason: http_reason(status.as_u16(), &text),
            });
        }

        let body: Value =
            serde_json::from_str(&text).map_err(|e| DocpollError::StatusRequestFailed {
                job_id: job_id.to_string(),
                reason: format!("unparseable response body: {e}"),
            })?;
        let typed: StatusResponse =
            serde_json::from_value(body.clone()).map_err(|e| DocpollError::StatusRequestFailed {
                job_id: job_id.to_string(),
                reason: format!("unexpected response shape: {e}"),
            })?;

        Ok((typed, body))
    }

    /// `POST /webhook/automation` with the result as the JSON body.
    pub async fn forward_result(&self, result: &ExtractionReport) -> Result<(), DocpollError> {
        let url = format!("{}/webhook/automation", self.api_base);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(result)
            .send()
            .await
            .map_err(|e| DocpollError::ForwardingFailed {
                reason: describe_transport(&e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DocpollError::ForwardingFailed {
                reason: http_reason(status.as_u16(), &text),
            });
        }

        Ok(())
    }
}

/// Classify a reqwest transport error into a readable reason string.
fn describe_transport(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

/// `HTTP <code>` plus a truncated body when the backend sent one.
fn http_reason(code: u16, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {code}")
    } else {
        format!("HTTP {code}: {}", truncate_body(body))
    }
}

/// Cap error bodies so a misbehaving backend cannot flood the log key
/// reserved for short reasons.
fn truncate_body(text: &str) -> String {
    const MAX: usize = 300;
    if text.len() <= MAX {
        return text.to_string();
    }
    let mut cut = MAX;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}\u{2026}", &text[..cut])
}
