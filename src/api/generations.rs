//! Generation API endpoints.
//!
//! Each logged-in user owns one job slot. Submitting replaces the slot;
//! the previous job's polling stops and its results are discarded.

use actix_web::{HttpResponse, delete, get, post, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::SessionUser;
use crate::error::{AppError, AppResult};
use crate::middleware::JobTag;
use crate::models::generation::{GenerationRequest, JobState, SubmitGenerationResponse};
use crate::services::GenerationSessions;

/// Cancel response.
#[derive(Serialize, ToSchema)]
pub struct CancelGenerationResponse {
    /// False when no job was in flight.
    pub cancelled: bool,
}

/// Configure generation routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(submit_generation)
        .service(current_generation)
        .service(cancel_generation);
}

/// Submit a text-to-image job.
///
/// Returns once the provider has accepted the job; polling continues in
/// the background and is observed through `GET /generations/current`.
#[utoipa::path(
    post,
    path = "/api/v1/generations",
    tag = "Generations",
    request_body = GenerationRequest,
    responses(
        (status = 202, description = "Job accepted", body = SubmitGenerationResponse),
        (status = 400, description = "Blank prompt", body = crate::error::ErrorResponse),
        (status = 401, description = "Not logged in", body = crate::error::ErrorResponse),
        (status = 409, description = "Superseded by a newer submission", body = crate::error::ErrorResponse),
        (status = 502, description = "Generation API unavailable", body = crate::error::ErrorResponse)
    )
)]
#[post("/generations")]
pub async fn submit_generation(
    auth: SessionUser,
    sessions: web::Data<GenerationSessions>,
    body: web::Json<GenerationRequest>,
) -> AppResult<HttpResponse> {
    let ticket = sessions.start(&auth.caller_key(), &body).await?;
    let process_id = ticket.handle.process_id().to_string();

    let mut response = HttpResponse::Accepted().json(SubmitGenerationResponse {
        state: JobState::Submitted {
            process_id: process_id.clone(),
        },
        process_id: process_id.clone(),
    });
    response.extensions_mut().insert(JobTag(process_id));
    Ok(response)
}

/// Snapshot of the caller's latest job.
#[utoipa::path(
    get,
    path = "/api/v1/generations/current",
    tag = "Generations",
    responses(
        (status = 200, description = "Current job", body = crate::models::generation::JobSnapshot),
        (status = 401, description = "Not logged in", body = crate::error::ErrorResponse),
        (status = 404, description = "No job submitted yet", body = crate::error::ErrorResponse)
    )
)]
#[get("/generations/current")]
pub async fn current_generation(
    auth: SessionUser,
    sessions: web::Data<GenerationSessions>,
) -> AppResult<HttpResponse> {
    let snapshot = sessions
        .current(&auth.caller_key())
        .await
        .ok_or_else(|| AppError::NotFound("Generation job".to_string()))?;

    let mut response = HttpResponse::Ok().json(&snapshot);
    if let Some(process_id) = snapshot.process_id {
        response.extensions_mut().insert(JobTag(process_id));
    }
    Ok(response)
}

/// Abandon the caller's in-flight job.
#[utoipa::path(
    delete,
    path = "/api/v1/generations/current",
    tag = "Generations",
    responses(
        (status = 200, description = "Cancellation result", body = CancelGenerationResponse),
        (status = 401, description = "Not logged in", body = crate::error::ErrorResponse)
    )
)]
#[delete("/generations/current")]
pub async fn cancel_generation(
    auth: SessionUser,
    sessions: web::Data<GenerationSessions>,
) -> HttpResponse {
    let caller = auth.caller_key();
    let process_id = sessions.current(&caller).await.and_then(|s| s.process_id);
    let cancelled = sessions.cancel(&caller).await;

    let mut response = HttpResponse::Ok().json(CancelGenerationResponse { cancelled });
    if let Some(process_id) = process_id {
        response.extensions_mut().insert(JobTag(process_id));
    }
    response
}
