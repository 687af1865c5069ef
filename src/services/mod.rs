//! Business logic services.

pub mod cleanup;
pub mod generation;
pub mod identity;
pub mod oauth;
pub mod session;

pub use cleanup::{CleanupConfig, start_cleanup_task};
pub use generation::{GenerationSessions, HttpGenerationApi, JobOrchestrator};
pub use identity::{IdentityResolver, ResolutionError};
pub use oauth::{OAuthClient, configure_routes as configure_oauth_routes};
