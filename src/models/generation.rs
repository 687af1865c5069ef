//! Generation job models: request parameters, provider wire types and
//! the job state machine exposed to callers.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Image style tag. Unknown values are forwarded to the provider unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageStyle {
    #[default]
    Realistic,
    Anime,
    DigitalArt,
    Other(String),
}

impl ImageStyle {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Realistic => "Realistic",
            Self::Anime => "Anime",
            Self::DigitalArt => "Digital Art",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ImageStyle {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Realistic" => Self::Realistic,
            "Anime" => Self::Anime,
            "Digital Art" => Self::DigitalArt,
            _ => Self::Other(s),
        }
    }
}

impl From<ImageStyle> for String {
    fn from(s: ImageStyle) -> Self {
        s.as_str().to_string()
    }
}

/// Output aspect ratio. Unknown values are forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AspectRatio {
    #[default]
    Square,
    Portrait,
    Landscape,
    Other(String),
}

impl AspectRatio {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Square => "square",
            Self::Portrait => "portrait",
            Self::Landscape => "landscape",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for AspectRatio {
    fn from(s: String) -> Self {
        match s.as_str() {
            "square" => Self::Square,
            "portrait" => Self::Portrait,
            "landscape" => Self::Landscape,
            _ => Self::Other(s),
        }
    }
}

impl From<AspectRatio> for String {
    fn from(a: AspectRatio) -> Self {
        a.as_str().to_string()
    }
}

fn default_samples() -> u32 {
    1
}

/// Caller-supplied generation parameters.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GenerationRequest {
    /// What to draw. Must not be blank.
    pub prompt: String,
    /// What to avoid.
    #[serde(default, alias = "negprompt")]
    pub negative_prompt: String,
    /// `Realistic`, `Anime` or `Digital Art`.
    #[serde(default)]
    #[schema(value_type = String, example = "Realistic")]
    pub style: ImageStyle,
    /// `square`, `portrait` or `landscape`.
    #[serde(default)]
    #[schema(value_type = String, example = "square")]
    pub aspect_ratio: AspectRatio,
    /// Number of images; clamped to the server maximum.
    #[serde(default = "default_samples")]
    pub samples: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: String::new(),
            style: ImageStyle::default(),
            aspect_ratio: AspectRatio::default(),
            samples: default_samples(),
        }
    }

    /// Build the provider payload, clamping samples to `[1, max_samples]`.
    ///
    /// Returns `None` when the prompt is blank.
    pub fn to_payload(&self, max_samples: u32) -> Option<TxtToImgPayload> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return None;
        }

        Some(TxtToImgPayload {
            prompt: prompt.to_string(),
            negprompt: self.negative_prompt.trim().to_string(),
            style: self.style.as_str().to_string(),
            aspect_ratio: self.aspect_ratio.as_str().to_string(),
            samples: self.samples.clamp(1, max_samples.max(1)),
            safe_filter: true,
        })
    }
}

/// Body of the provider's `txt2img` submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxtToImgPayload {
    pub prompt: String,
    pub negprompt: String,
    pub style: String,
    pub aspect_ratio: String,
    pub samples: u32,
    pub safe_filter: bool,
}

/// Provider response to a submission.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub process_id: Option<String>,
}

/// Provider response to a status request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    pub status: Option<String>,
    pub result: Option<StatusResult>,
    pub error: Option<StatusErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResult {
    /// Absent and `null` both mean no output.
    #[serde(default)]
    pub output: Option<Vec<String>>,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusErrorBody {
    pub message: Option<String>,
}

impl StatusResponse {
    /// Interpreted job status.
    pub fn job_status(&self) -> ProviderStatus {
        ProviderStatus::parse(self.status.as_deref().unwrap_or(""))
    }

    /// Output URLs, empty when absent.
    pub fn output(&self) -> &[String] {
        self.result
            .as_ref()
            .and_then(|r| r.output.as_deref())
            .unwrap_or(&[])
    }

    /// Provider-supplied failure message, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone())
            .or_else(|| self.result.as_ref().and_then(|r| r.error_message.clone()))
    }
}

/// Status as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    /// Queued or running; both are treated alike.
    InProgress,
    Completed,
    Failed,
    Unrecognized(String),
}

impl ProviderStatus {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "IN_QUEUE" | "IN_PROGRESS" => Self::InProgress,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            _ => Self::Unrecognized(s.to_string()),
        }
    }
}

/// Opaque job identifier assigned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(process_id: impl Into<String>) -> Self {
        Self(process_id.into())
    }

    pub fn process_id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a single generation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// Request accepted locally, not yet acknowledged by the provider.
    Submitting,
    Submitted { process_id: String },
    Polling { process_id: String, attempt: u32 },
    Completed { process_id: String, images: Vec<String> },
    Failed { reason: String },
    TimedOut { attempts: u32 },
    /// Superseded by a newer submission or abandoned by the caller.
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::TimedOut { .. } | Self::Cancelled
        )
    }

    /// Message suitable for showing to the end user, if the job ended badly.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Failed { reason } => Some(reason.clone()),
            Self::TimedOut { .. } => {
                Some("Image generation timed out. Please try again.".to_string())
            }
            _ => None,
        }
    }
}

/// Caller-facing view of their current job slot.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobSnapshot {
    /// Provider job id once known.
    pub process_id: Option<String>,
    pub state: JobState,
    /// True while the job is still in flight.
    pub loading: bool,
    pub error: Option<String>,
    /// Output URLs, in provider order.
    pub images: Vec<String>,
}

impl JobSnapshot {
    pub fn from_state(process_id: Option<String>, state: JobState) -> Self {
        let images = match &state {
            JobState::Completed { images, .. } => images.clone(),
            _ => Vec::new(),
        };
        Self {
            process_id,
            loading: !state.is_terminal(),
            error: state.user_message(),
            images,
            state,
        }
    }
}

/// Response to a successful submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitGenerationResponse {
    pub process_id: String,
    pub state: JobState,
}
