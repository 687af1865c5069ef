//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Imagine Server",
        version = "0.1.0",
        description = "OAuth login and text-to-image generation jobs backed by a hosted generation API"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Generation endpoints
        api::generations::submit_generation,
        api::generations::current_generation,
        api::generations::cancel_generation,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Generations
            models::generation::GenerationRequest,
            models::generation::JobState,
            models::generation::JobSnapshot,
            models::generation::SubmitGenerationResponse,
            api::generations::CancelGenerationResponse,
            // Users
            models::user::OAuthProvider,
            models::user::UserResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Generations", description = "Text-to-image job submission and status")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add the session cookie security scheme.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_cookie",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Cookie(
                        utoipa::openapi::security::ApiKeyValue::new(
                            crate::config::SESSION_COOKIE,
                        ),
                    ),
                ),
            );
        }
    }
}
