//! Configuration types for the upload/polling client.
//!
//! All client behaviour is controlled through [`ClientConfig`], built via
//! its [`ClientConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config between a controller and its poller, and to
//! tighten the timings in tests without touching production defaults.
//!
//! # Design choice: builder over constructor
//! A constructor with seven positional fields breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! well-documented defaults for the rest; validation happens once, in
//! [`ClientConfigBuilder::build`].

use crate::error::DocpollError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Configuration for a document upload and its polling lifecycle.
///
/// Built via [`ClientConfig::builder()`] or [`ClientConfig::default()`].
///
/// # Example
/// ```rust
/// use docpoll::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .api_base("http://localhost:4000")
///     .poll_interval_ms(2000)
///     .debug_mode(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the processing backend. Default: `http://localhost:4000`.
    ///
    /// Endpoint paths (`/api/upload`, `/api/status/{jobId}`,
    /// `/webhook/automation`) are appended to this base, so a trailing
    /// slash is trimmed at build time.
    pub api_base: String,

    /// Delay between status requests in milliseconds. Default: 2000.
    ///
    /// Polls are serial: the next tick is scheduled only after the previous
    /// status call has completed, so a slow backend stretches the effective
    /// interval instead of stacking requests.
    pub poll_interval_ms: u64,

    /// Wall-clock polling budget in milliseconds, measured from the moment
    /// polling starts. Default: 300 000 (five minutes).
    ///
    /// When the budget elapses without a terminal status the job moves to
    /// `TimedOut` and no further network calls are made. Five minutes
    /// covers the slowest observed document runs with room to spare; lower
    /// it aggressively in tests.
    pub poll_budget_ms: u64,

    /// Per-HTTP-call timeout in seconds. Default: 30.
    ///
    /// Applies to the upload, each status request, and the webhook forward
    /// individually. Distinct from `poll_budget_ms`, which bounds the whole
    /// polling phase.
    pub request_timeout_secs: u64,

    /// How long `result_forwarded()` keeps reporting true after a
    /// successful webhook forward, in milliseconds. Default: 3000.
    ///
    /// Purely a display window: the flag clears itself by age, nothing is
    /// scheduled and nothing needs cancelling on reset.
    pub forward_confirm_ms: u64,

    /// Emit extra `tracing::debug!` lines for poll scheduling decisions.
    /// Default: false.
    ///
    /// Changes observability only; the state machine behaves identically
    /// with the flag on or off.
    pub debug_mode: bool,

    /// Receiver for lifecycle events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:4000".to_string(),
            poll_interval_ms: 2_000,
            poll_budget_ms: 300_000,
            request_timeout_secs: 30,
            forward_confirm_ms: 3_000,
            debug_mode: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base", &self.api_base)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("poll_budget_ms", &self.poll_budget_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("forward_confirm_ms", &self.forward_confirm_ms)
            .field("debug_mode", &self.debug_mode)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn UploadProgressCallback>"),
            )
            .finish()
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(10);
        self
    }

    pub fn poll_budget_ms(mut self, ms: u64) -> Self {
        self.config.poll_budget_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn forward_confirm_ms(mut self, ms: u64) -> Self {
        self.config.forward_confirm_ms = ms;
        self
    }

    pub fn debug_mode(mut self, v: bool) -> Self {
        self.config.debug_mode = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<ClientConfig, DocpollError> {
        while self.config.api_base.ends_with('/') {
            self.config.api_base.pop();
        }

        let url = reqwest::Url::parse(&self.config.api_base).map_err(|e| {
            DocpollError::InvalidConfig(format!(
                "api_base '{}' is not a valid URL: {e}",
                self.config.api_base
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(DocpollError::InvalidConfig(format!(
                "api_base must be http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.config.poll_budget_ms < self.config.poll_interval_ms {
            return Err(DocpollError::InvalidConfig(format!(
                "poll budget ({}ms) must cover at least one interval ({}ms)",
                self.config.poll_budget_ms, self.config.poll_interval_ms
            )));
        }

        Ok(self.config)
    }
}
