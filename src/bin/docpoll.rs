//! CLI binary for docpoll.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ClientConfig` and prints outcomes and job logs.

use anyhow::{Context, Result};
use clap::Parser;
use docpoll::{
    ClientConfig, JobLogStore, JobState, LogTag, MediaType, ProgressCallback,
    UploadController, UploadProgressCallback, UNSUBMITTED_KEY,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one [indicatif] spinner that follows the job
/// from upload through every poll to its terminal state.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Wall-clock start for the elapsed figure in the terminal line.
    started: Instant,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }

    /// Tear the spinner down without a terminal event (validation failures
    /// never reach the lifecycle callbacks).
    fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl UploadProgressCallback for CliProgressCallback {
    fn on_upload_start(&self, file_name: &str) {
        self.bar.set_prefix("Uploading");
        self.bar.set_message(file_name.to_string());
    }

    fn on_job_submitted(&self, job_id: &str) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Job {job_id} accepted"))
        ));
        self.bar.set_prefix("Processing");
        self.bar.set_message("waiting for the first status…");
    }

    fn on_poll(&self, _job_id: &str, status: &str, polls: u32) {
        self.bar.set_message(format!("status '{status}'  (poll {polls})"));
    }

    fn on_terminal(&self, job_id: Option<&str>, state: JobState) {
        self.bar.finish_and_clear();
        let elapsed = format!("{:.1}s", self.started.elapsed().as_secs_f64());
        let shown = job_id.unwrap_or("(unsubmitted)");

        match state {
            JobState::Succeeded => {
                eprintln!("{} Job {} done in {}", green("✔"), bold(shown), dim(&elapsed));
            }
            JobState::TimedOut => {
                eprintln!(
                    "{} Job {} still processing after {}",
                    cyan("⚠"),
                    bold(shown),
                    dim(&elapsed)
                );
            }
            _ => {
                eprintln!("{} Job {} failed after {}", red("✘"), bold(shown), dim(&elapsed));
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Submit a document and print the extraction
  docpoll invoice.pdf

  # JSON outcome for scripting
  docpoll --json invoice.pdf > outcome.json

  # Forward the structured result to the automation webhook on success
  docpoll --forward contract.docx

  # Faster polling against a local backend
  docpoll --poll-interval-ms 500 --poll-timeout-secs 60 invoice.pdf

  # Inspect what actually happened to a job
  docpoll --show-logs 3f2a91
  docpoll --export-logs 3f2a91        # writes docpoll-logs-3f2a91.json
  docpoll --list-jobs

  # Failures that happened before the backend issued a job id
  docpoll --show-logs unsubmitted

JOB LOGS:
  Every backend interaction is recorded per job (newest first, capped at
  200 entries) and mirrored to one JSON file per job under the log
  directory. Logs survive restarts; --clear-logs removes a job's file.

ENVIRONMENT VARIABLES:
  DOCPOLL_API_BASE             Backend base URL (default http://localhost:4000)
  DOCPOLL_POLL_INTERVAL_MS     Milliseconds between status polls
  DOCPOLL_POLL_TIMEOUT_SECS    Overall polling budget in seconds
  DOCPOLL_REQUEST_TIMEOUT_SECS Per-request HTTP timeout in seconds
  DOCPOLL_LOG_DIR              Where per-job log files live
  DOCPOLL_DEBUG                Log every backend interaction at DEBUG level

EXIT STATUS:
  0  job succeeded (and the forward succeeded, if requested)
  1  validation, submission, processing, timeout or forwarding failure
"#;

/// Upload documents to an extraction backend and track jobs to completion.
#[derive(Parser, Debug)]
#[command(
    name = "docpoll",
    version,
    about = "Upload documents to an extraction backend and track jobs to completion",
    long_about = "Upload a PDF or DOCX document to the extraction backend, poll its processing \
job until it reaches a terminal state, and print the extracted data. Every backend \
interaction lands in a persisted per-job log for after-the-fact debugging.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF or DOCX file to submit.
    #[arg(required_unless_present_any = ["show_logs", "export_logs", "clear_logs", "list_jobs"])]
    input: Option<PathBuf>,

    /// Backend base URL.
    #[arg(long, env = "DOCPOLL_API_BASE", default_value = "http://localhost:4000")]
    api_base: String,

    /// Override media type detection: pdf or docx.
    #[arg(long, env = "DOCPOLL_MEDIA_TYPE", value_enum)]
    media_type: Option<MediaTypeArg>,

    /// Milliseconds between status polls.
    #[arg(long, env = "DOCPOLL_POLL_INTERVAL_MS", default_value_t = 2_000)]
    poll_interval_ms: u64,

    /// Overall polling budget in seconds.
    #[arg(long, env = "DOCPOLL_POLL_TIMEOUT_SECS", default_value_t = 300)]
    poll_timeout_secs: u64,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "DOCPOLL_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// Forward the structured result to the automation webhook on success.
    #[arg(long, env = "DOCPOLL_FORWARD")]
    forward: bool,

    /// Output the full outcome as JSON instead of a human summary.
    #[arg(long, env = "DOCPOLL_JSON")]
    json: bool,

    /// Also print the raw terminal status response body.
    #[arg(long, env = "DOCPOLL_SHOW_RAW")]
    show_raw: bool,

    /// Directory for per-job log files.
    #[arg(long, env = "DOCPOLL_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Print the stored log for a job and exit.
    #[arg(long, value_name = "JOB_ID")]
    show_logs: Option<String>,

    /// Write the stored log for a job to docpoll-logs-<JOB_ID>.json and exit.
    #[arg(long, value_name = "JOB_ID")]
    export_logs: Option<String>,

    /// Delete the stored log for a job and exit.
    #[arg(long, value_name = "JOB_ID")]
    clear_logs: Option<String>,

    /// List job ids with stored logs and exit.
    #[arg(long)]
    list_jobs: bool,

    /// Record every backend interaction at DEBUG level.
    #[arg(short, long, env = "DOCPOLL_DEBUG")]
    debug: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCPOLL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the extraction itself.
    #[arg(short, long, env = "DOCPOLL_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "DOCPOLL_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum MediaTypeArg {
    Pdf,
    Docx,
}

impl From<MediaTypeArg> for MediaType {
    fn from(v: MediaTypeArg) -> Self {
        match v {
            MediaTypeArg::Pdf => MediaType::Pdf,
            MediaTypeArg::Docx => MediaType::Docx,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs while the spinner is active; the
    // spinner carries the same information.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose || cli.debug {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let log_dir = cli.log_dir.clone().unwrap_or_else(default_log_dir);
    let log = Arc::new(JobLogStore::new(&log_dir));

    // ── Log maintenance modes (no backend contact) ───────────────────────
    if let Some(job_id) = &cli.show_logs {
        let entries = log.entries(job_id);
        if cli.json {
            println!("{}", log.export(job_id));
        } else if entries.is_empty() {
            eprintln!("No stored log for job '{job_id}' under {}", log.dir().display());
        } else {
            for entry in &entries {
                println!(
                    "{}  {:<18}  {}",
                    dim(&entry.ts),
                    bold(entry.tag.as_str()),
                    entry.detail
                );
            }
        }
        return Ok(());
    }

    if let Some(job_id) = &cli.export_logs {
        let path = PathBuf::from(format!("docpoll-logs-{job_id}.json"));
        log.export_to_file(job_id, &path)
            .with_context(|| format!("Failed to export logs for job '{job_id}'"))?;
        eprintln!("{} {}", green("✔"), bold(&path.display().to_string()));
        return Ok(());
    }

    if let Some(job_id) = &cli.clear_logs {
        log.clear(job_id);
        eprintln!("{} Cleared stored log for job '{job_id}'", green("✔"));
        return Ok(());
    }

    if cli.list_jobs {
        let ids = log.tracked_job_ids();
        if ids.is_empty() {
            eprintln!("No stored job logs under {}", log.dir().display());
        } else {
            for id in ids {
                println!("{id}");
            }
        }
        return Ok(());
    }

    // ── Build controller ─────────────────────────────────────────────────
    let input = cli.input.clone().context("FILE is required")?;

    let cli_cb = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };
    let progress_cb: Option<ProgressCallback> = cli_cb
        .clone()
        .map(|cb| cb as Arc<dyn UploadProgressCallback>);

    let config = build_config(&cli, progress_cb)?;
    let controller =
        UploadController::new(config, Arc::clone(&log)).context("Failed to initialise client")?;

    // ── Submit and poll ──────────────────────────────────────────────────
    let outcome = match submit(&cli, &controller, &input).await {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(cb) = &cli_cb {
                cb.clear();
            }
            let job_hint = controller
                .job()
                .map(|job| job.job_id)
                .unwrap_or_else(|| UNSUBMITTED_KEY.to_string());
            eprintln!("{} {}", red("✘"), err);
            eprintln!(
                "  {}",
                dim(&format!("Full diagnostics: docpoll --show-logs {job_hint}"))
            );
            std::process::exit(1);
        }
    };

    // ── Print outcome ────────────────────────────────────────────────────
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
        );
    } else {
        if !cli.quiet {
            if !show_progress {
                eprintln!(
                    "{} Job {} reached '{}'",
                    green("✔"),
                    bold(&outcome.job_id),
                    outcome.status
                );
            }
            if outcome.requires_review {
                eprintln!("{} This document is flagged for manual review", cyan("⚠"));
            }
        }

        match &outcome.extraction {
            Some(extraction) => {
                if extraction.parse_failed && !cli.quiet {
                    eprintln!(
                        "{} Extraction arrived malformed; showing the raw payload",
                        cyan("⚠")
                    );
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(extraction.parsed_or_raw())
                        .context("Failed to serialise extraction")?
                );
            }
            None => {
                if !cli.quiet {
                    eprintln!("{}", dim("No extraction attached to this job"));
                }
            }
        }
    }

    if cli.show_raw {
        let entries = log.entries(&outcome.job_id);
        if let Some(entry) = entries.iter().find(|e| e.tag == LogTag::PollResponse) {
            log.append(
                &outcome.job_id,
                LogTag::ShowRawResponse,
                json!({ "jobId": outcome.job_id }),
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&entry.detail)
                    .context("Failed to serialise raw response")?
            );
        }
    }

    // ── Forward (optional) ───────────────────────────────────────────────
    if cli.forward {
        if outcome.result.is_some() {
            controller
                .send_result()
                .await
                .context("Webhook forward failed")?;
            if !cli.quiet {
                eprintln!("{} Result forwarded to the automation webhook", green("✔"));
            }
        } else if !cli.quiet {
            eprintln!(
                "{} No structured result on this job; nothing to forward",
                cyan("⚠")
            );
        }
    }

    Ok(())
}

/// Map CLI args to `ClientConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .api_base(&cli.api_base)
        .poll_interval_ms(cli.poll_interval_ms)
        .poll_budget_ms(cli.poll_timeout_secs.saturating_mul(1000))
        .request_timeout_secs(cli.request_timeout_secs)
        .debug_mode(cli.debug);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Submit `input`, honouring an explicit `--media-type` override.
async fn submit(
    cli: &Cli,
    controller: &UploadController,
    input: &Path,
) -> std::result::Result<docpoll::JobOutcome, docpoll::DocpollError> {
    match &cli.media_type {
        None => controller.submit_file(input).await,
        Some(forced) => {
            let file_name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| input.display().to_string());
            let bytes = tokio::fs::read(input).await.map_err(|source| {
                docpoll::DocpollError::FileReadFailed {
                    path: input.to_path_buf(),
                    source,
                }
            })?;
            controller
                .submit_bytes(file_name, forced.clone().into(), bytes)
                .await
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("docpoll")
        .join("logs")
}
