//! Domain models for identities and generation jobs.

pub mod generation;
pub mod user;

// Re-export commonly used types
pub use generation::{GenerationRequest, JobSnapshot, JobState};
pub use user::{OAuthProvider, ProviderProfile, User, UserResponse};
