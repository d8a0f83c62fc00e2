//! Job lifecycle types.
//!
//! A job moves through exactly one path:
//!
//! ```text
//! Idle ──▶ Uploading ──▶ Polling ──▶ Succeeded | Failed | TimedOut
//!   ▲                                      │
//!   └───────────── reset ──────────────────┘
//! ```
//!
//! `Uploading` can also fall straight to `Failed` when the submission
//! itself fails. Terminal states are left only by an explicit reset; there
//! is no automatic retry anywhere in the lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the single tracked job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No job in flight. The starting state and the state after reset.
    #[default]
    Idle,
    /// The multipart upload request is in flight.
    Uploading,
    /// The job was accepted; status requests run on a fixed interval.
    Polling,
    /// The backend reported a success-terminal status.
    Succeeded,
    /// Submission, a status request, or processing itself failed.
    Failed,
    /// The polling budget elapsed without a terminal status.
    TimedOut,
}

impl JobState {
    /// True for `Succeeded`, `Failed` and `TimedOut`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::TimedOut)
    }

    /// True while a submit-and-poll sequence owns the controller
    /// (`Uploading` or `Polling`).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Uploading | Self::Polling)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "idle",
            JobState::Uploading => "uploading",
            JobState::Polling => "polling",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed out",
        };
        f.write_str(s)
    }
}

/// Snapshot of the tracked job.
///
/// The id is issued by the backend and never changes; `created_at` is set
/// the moment the submission response arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Opaque backend-issued identifier.
    pub job_id: String,
    /// Current lifecycle state at the time of the snapshot.
    pub state: JobState,
    /// ISO-8601 instant the job was accepted by the backend.
    pub created_at: String,
}
