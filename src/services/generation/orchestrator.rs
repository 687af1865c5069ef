//! Job submission and the status polling state machine.
//!
//! Polling uses a constant delay and a hard attempt ceiling. Each
//! re-poll is scheduled on a tokio timer raced against the job's
//! [`CancellationToken`], so an abandoned job stops immediately and
//! leaves no timer behind.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{GenerationApi, GenerationError};
use crate::config::GenerationSettings;
use crate::models::generation::{
    GenerationRequest, JobHandle, JobState, ProviderStatus, StatusResponse, TxtToImgPayload,
};

/// Outcome of interpreting one status response.
#[derive(Debug, PartialEq, Eq)]
enum Transition {
    /// Not terminal yet; wait and poll again.
    Continue,
    Completed(Vec<String>),
    Failed(GenerationError),
}

/// Submits generation jobs and polls them to completion.
pub struct JobOrchestrator {
    api: Arc<dyn GenerationApi>,
    poll_interval: Duration,
    max_poll_attempts: u32,
    max_samples: u32,
}

impl JobOrchestrator {
    pub fn new(api: Arc<dyn GenerationApi>, settings: &GenerationSettings) -> Self {
        Self {
            api,
            poll_interval: settings.poll_interval,
            max_poll_attempts: settings.max_poll_attempts.max(1),
            max_samples: settings.max_samples,
        }
    }

    /// Check a request without contacting the provider.
    pub fn validate(&self, request: &GenerationRequest) -> Result<(), GenerationError> {
        self.prepare(request).map(|_| ())
    }

    fn prepare(&self, request: &GenerationRequest) -> Result<TxtToImgPayload, GenerationError> {
        request
            .to_payload(self.max_samples)
            .ok_or(GenerationError::InvalidPrompt)
    }

    /// Validate the request and create a job with the provider.
    ///
    /// Blank prompts fail before any network call. The sample count is
    /// clamped, never rejected.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<JobHandle, GenerationError> {
        let payload = self.prepare(request)?;

        if payload.samples != request.samples {
            debug!(
                "Generation: samples clamped from {} to {}",
                request.samples, payload.samples
            );
        }

        let handle = self.api.submit(&payload).await?;
        info!(
            process_id = %handle,
            samples = payload.samples,
            style = %payload.style,
            aspect_ratio = %payload.aspect_ratio,
            "Generation job submitted"
        );
        Ok(handle)
    }

    /// Poll a job until it reaches a terminal state.
    ///
    /// Progress is published on `progress` as `Polling { attempt }`.
    /// Transport failures of a single attempt are retried within the
    /// ceiling; exhausting it yields [`GenerationError::Timeout`].
    pub async fn poll(
        &self,
        handle: &JobHandle,
        cancel: &CancellationToken,
        progress: &watch::Sender<JobState>,
    ) -> Result<Vec<String>, GenerationError> {
        let mut empty_completion_seen = false;

        for attempt in 1..=self.max_poll_attempts {
            if cancel.is_cancelled() {
                info!(process_id = %handle, attempt, "Polling cancelled");
                return Err(GenerationError::Cancelled);
            }

            progress.send_replace(JobState::Polling {
                process_id: handle.process_id().to_string(),
                attempt,
            });

            let response = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(process_id = %handle, attempt, "Polling cancelled");
                    return Err(GenerationError::Cancelled);
                }
                response = self.api.status(handle) => response,
            };

            let transition = match response {
                Ok(response) => interpret(&response, &mut empty_completion_seen),
                Err(e) => {
                    warn!(process_id = %handle, attempt, error = %e, "Status check failed, will retry");
                    Transition::Continue
                }
            };

            match transition {
                Transition::Completed(images) => {
                    info!(
                        process_id = %handle,
                        attempt,
                        images = images.len(),
                        "Generation completed"
                    );
                    return Ok(images);
                }
                Transition::Failed(err) => {
                    warn!(process_id = %handle, attempt, error = %err, "Generation failed");
                    return Err(err);
                }
                Transition::Continue => {}
            }

            if attempt == self.max_poll_attempts {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(process_id = %handle, attempt, "Polling cancelled");
                    return Err(GenerationError::Cancelled);
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        warn!(
            process_id = %handle,
            attempts = self.max_poll_attempts,
            "Generation timed out"
        );
        Err(GenerationError::Timeout {
            attempts: self.max_poll_attempts,
        })
    }
}

/// Map a status response to the next transition.
///
/// A completion without output is re-polled once; a second one is a
/// terminal `NoImagesProduced`.
fn interpret(response: &StatusResponse, empty_completion_seen: &mut bool) -> Transition {
    match response.job_status() {
        ProviderStatus::InProgress => Transition::Continue,
        ProviderStatus::Completed => {
            let output = response.output();
            if !output.is_empty() {
                Transition::Completed(output.to_vec())
            } else if *empty_completion_seen {
                Transition::Failed(GenerationError::NoImagesProduced)
            } else {
                *empty_completion_seen = true;
                Transition::Continue
            }
        }
        ProviderStatus::Failed => Transition::Failed(GenerationError::GenerationFailed {
            message: response.error_message(),
        }),
        ProviderStatus::Unrecognized(status) => {
            Transition::Failed(GenerationError::GenerationFailed {
                message: response
                    .error_message()
                    .or_else(|| Some(format!("unrecognized job status '{}'", status))),
            })
        }
    }
}
