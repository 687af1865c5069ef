//! Text-to-image generation: submission, polling and per-caller job slots.
//!
//! - [`client`] talks to the external asynchronous generation API.
//! - [`orchestrator`] validates and submits a job, then drives the status
//!   polling state machine until a terminal state.
//! - [`sessions`] keeps one job slot per caller; a new submission cancels
//!   the previous job's polling loop.

pub mod client;
pub mod orchestrator;
pub mod sessions;

pub use client::{GenerationApi, HttpGenerationApi};
pub use orchestrator::JobOrchestrator;
pub use sessions::{GenerationSessions, JobTicket};

use crate::error::AppError;
use crate::models::generation::JobState;

/// Errors surfaced by the generation workflow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Prompt was empty after trimming; nothing was sent.
    #[error("Prompt must not be empty")]
    InvalidPrompt,

    /// Job creation failed (transport, auth, or malformed response).
    #[error("Failed to submit generation job: {0}")]
    Submission(String),

    /// Provider reported a terminal failure.
    #[error("Image generation failed: {}", .message.as_deref().unwrap_or("the provider reported a failure"))]
    GenerationFailed { message: Option<String> },

    /// Provider reported completion twice without any output.
    #[error("Image generation completed but produced no images")]
    NoImagesProduced,

    /// Attempt ceiling reached; the job's real state is unknown.
    #[error("Image generation timed out after {attempts} status checks")]
    Timeout { attempts: u32 },

    /// Superseded by a newer submission or abandoned by the caller.
    #[error("Image generation was cancelled")]
    Cancelled,
}

/// Failure of a single status request. Retried within the attempt ceiling.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("status request failed: {0}")]
    Transport(String),

    #[error("status endpoint returned HTTP {0}")]
    Http(u16),

    #[error("invalid status response: {0}")]
    Decode(String),
}

impl From<&GenerationError> for JobState {
    fn from(err: &GenerationError) -> Self {
        match err {
            GenerationError::Timeout { attempts } => JobState::TimedOut {
                attempts: *attempts,
            },
            GenerationError::Cancelled => JobState::Cancelled,
            other => JobState::Failed {
                reason: other.to_string(),
            },
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::InvalidPrompt => AppError::InvalidInput(err.to_string()),
            GenerationError::Cancelled => AppError::Conflict(
                "Superseded by a newer generation request".to_string(),
            ),
            other => AppError::Upstream(other.to_string()),
        }
    }
}
