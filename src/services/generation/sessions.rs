//! One generation job slot per caller.
//!
//! Starting a job replaces the caller's slot and cancels whatever was in
//! it, so at most one polling loop per caller is ever live and a stale
//! job can never overwrite a newer job's results.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{GenerationError, JobOrchestrator};
use crate::models::generation::{GenerationRequest, JobHandle, JobSnapshot, JobState};

struct Slot {
    sequence: u64,
    cancel: CancellationToken,
    process_id: Option<String>,
    updates: watch::Receiver<JobState>,
}

/// A job that was accepted by the provider and is now being polled.
pub struct JobTicket {
    pub handle: JobHandle,
    /// Observes state transitions; the last value is always terminal once
    /// the polling task finishes.
    pub updates: watch::Receiver<JobState>,
}

/// Per-caller job slots backed by a shared [`JobOrchestrator`].
#[derive(Clone)]
pub struct GenerationSessions {
    orchestrator: Arc<JobOrchestrator>,
    slots: Arc<RwLock<HashMap<String, Slot>>>,
    next_sequence: Arc<AtomicU64>,
}

impl GenerationSessions {
    pub fn new(orchestrator: Arc<JobOrchestrator>) -> Self {
        Self {
            orchestrator,
            slots: Arc::new(RwLock::new(HashMap::new())),
            next_sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Submit a new job for `caller`, superseding any job already running.
    ///
    /// An invalid request is rejected before the current job is touched.
    /// Once submission succeeds, polling continues on a background task.
    pub async fn start(
        &self,
        caller: &str,
        request: &GenerationRequest,
    ) -> Result<JobTicket, GenerationError> {
        self.orchestrator.validate(request)?;

        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let (progress, updates) = watch::channel(JobState::Submitting);

        {
            let mut slots = self.slots.write().await;
            let slot = Slot {
                sequence,
                cancel: cancel.clone(),
                process_id: None,
                updates: updates.clone(),
            };
            if let Some(previous) = slots.insert(caller.to_string(), slot) {
                if !previous.updates.borrow().is_terminal() {
                    info!(
                        caller,
                        process_id = previous.process_id.as_deref().unwrap_or("-"),
                        "Superseding in-flight generation job"
                    );
                }
                previous.cancel.cancel();
            }
        }

        let submitted = tokio::select! {
            _ = cancel.cancelled() => Err(GenerationError::Cancelled),
            result = self.orchestrator.submit(request) => result,
        };

        let handle = match submitted {
            Ok(handle) if cancel.is_cancelled() => {
                info!(caller, process_id = %handle, "Job superseded during submission");
                progress.send_replace(JobState::Cancelled);
                return Err(GenerationError::Cancelled);
            }
            Ok(handle) => handle,
            Err(err) => {
                warn!(caller, error = %err, "Generation submission failed");
                progress.send_replace(JobState::from(&err));
                return Err(err);
            }
        };

        {
            let mut slots = self.slots.write().await;
            if let Some(slot) = slots.get_mut(caller)
                && slot.sequence == sequence
            {
                slot.process_id = Some(handle.process_id().to_string());
            }
        }

        progress.send_replace(JobState::Submitted {
            process_id: handle.process_id().to_string(),
        });

        let orchestrator = self.orchestrator.clone();
        let poll_handle = handle.clone();
        tokio::spawn(async move {
            let terminal = match orchestrator.poll(&poll_handle, &cancel, &progress).await {
                Ok(images) => JobState::Completed {
                    process_id: poll_handle.process_id().to_string(),
                    images,
                },
                Err(err) => JobState::from(&err),
            };
            progress.send_replace(terminal);
        });

        Ok(JobTicket { handle, updates })
    }

    /// Snapshot of the caller's current job, if they ever started one.
    pub async fn current(&self, caller: &str) -> Option<JobSnapshot> {
        let slots = self.slots.read().await;
        slots.get(caller).map(|slot| {
            let state = slot.updates.borrow().clone();
            JobSnapshot::from_state(slot.process_id.clone(), state)
        })
    }

    /// Abandon the caller's in-flight job. Returns false when there was
    /// nothing to cancel.
    pub async fn cancel(&self, caller: &str) -> bool {
        let slots = self.slots.read().await;
        match slots.get(caller) {
            Some(slot) if !slot.updates.borrow().is_terminal() => {
                info!(
                    caller,
                    process_id = slot.process_id.as_deref().unwrap_or("-"),
                    "Cancelling generation job"
                );
                slot.cancel.cancel();
                true
            }
            _ => false,
        }
    }
}
