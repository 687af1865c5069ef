//! HTTP client for the external text-to-image API.
//!
//! The API key is held server-side and attached as a bearer token; it
//! never reaches the browser.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use super::{GenerationError, PollError};
use crate::config::GenerationSettings;
use crate::models::generation::{JobHandle, StatusResponse, SubmitResponse, TxtToImgPayload};

/// HTTP connect timeout for generation API calls.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// HTTP total timeout for generation API calls.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// External asynchronous generation API.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// Create a job and return its handle.
    async fn submit(&self, payload: &TxtToImgPayload) -> Result<JobHandle, GenerationError>;

    /// Fetch the current status of a job.
    async fn status(&self, handle: &JobHandle) -> Result<StatusResponse, PollError>;
}

/// reqwest-backed [`GenerationApi`].
pub struct HttpGenerationApi {
    http_client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

impl HttpGenerationApi {
    /// Build a client from settings.
    pub fn new(settings: &GenerationSettings) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http_client,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key.expose_secret())
    }
}

#[async_trait]
impl GenerationApi for HttpGenerationApi {
    async fn submit(&self, payload: &TxtToImgPayload) -> Result<JobHandle, GenerationError> {
        let response = self
            .http_client
            .post(format!("{}/generate/txt2img", self.base_url))
            .header("Authorization", self.bearer())
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                warn!("Generation: submit request failed: {}", e);
                GenerationError::Submission("could not reach the generation API".to_string())
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            warn!("Generation: API key rejected (HTTP {})", status.as_u16());
            return Err(GenerationError::Submission(
                "the generation API rejected our credentials".to_string(),
            ));
        }
        if !status.is_success() {
            warn!("Generation: submit returned HTTP {}", status.as_u16());
            return Err(GenerationError::Submission(format!(
                "the generation API returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: SubmitResponse = response.json().await.map_err(|e| {
            warn!("Generation: failed to parse submit response: {}", e);
            GenerationError::Submission("malformed response from the generation API".to_string())
        })?;

        let process_id = body
            .process_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                warn!("Generation: submit response missing process_id");
                GenerationError::Submission("response did not include a job id".to_string())
            })?;

        debug!("Generation: job accepted, process_id={}", process_id);
        Ok(JobHandle::new(process_id))
    }

    async fn status(&self, handle: &JobHandle) -> Result<StatusResponse, PollError> {
        let response = self
            .http_client
            .get(format!(
                "{}/status/{}",
                self.base_url,
                urlencoding::encode(handle.process_id())
            ))
            .header("Authorization", self.bearer())
            .send()
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Http(status.as_u16()));
        }

        response
            .json::<StatusResponse>()
            .await
            .map_err(|e| PollError::Decode(e.to_string()))
    }
}
