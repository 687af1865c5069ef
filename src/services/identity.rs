//! Resolves OAuth provider profiles to local user identities.
//!
//! Resolution is find-or-create against the store's uniqueness
//! constraints. Two first-time logins for the same provider identity may
//! race; the loser's insert hits `idx_users_provider_external_id` and
//! re-fetches the winner's row instead of failing.

use tracing::{debug, info, warn};

use crate::db::{DbPool, users};
use crate::error::AppError;
use crate::models::user::{ProviderProfile, User};

/// Why a login could not be resolved to a user.
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("identity store unavailable: {0}")]
    Store(String),

    /// Another identity already owns this email.
    #[error("email '{email}' is already linked to another account")]
    EmailConflict { email: String },
}

impl From<AppError> for ResolutionError {
    fn from(err: AppError) -> Self {
        ResolutionError::Store(err.to_string())
    }
}

impl From<ResolutionError> for AppError {
    fn from(err: ResolutionError) -> Self {
        warn!("Login aborted: {}", err);
        AppError::LoginFailed
    }
}

/// Maps provider profiles to local [`User`] records.
#[derive(Clone)]
pub struct IdentityResolver {
    pool: DbPool,
}

impl IdentityResolver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Resolve a profile to a user, creating one on first login.
    ///
    /// Repeat logins refresh display name, avatar and last-login time.
    pub async fn resolve(&self, profile: &ProviderProfile) -> Result<User, ResolutionError> {
        let db = self.pool.connection();

        if let Some(existing) =
            users::find_by_provider_identity(db, profile.provider, &profile.external_id).await?
        {
            let user = users::refresh_profile(db, existing.id, profile).await?;
            debug!(
                user_id = %user.id,
                provider = %user.provider,
                "Resolved existing identity"
            );
            return Ok(user);
        }

        match users::insert_from_profile(db, profile).await {
            Ok(user) => {
                info!(
                    user_id = %user.id,
                    provider = %user.provider,
                    "Created identity for first login"
                );
                Ok(user)
            }
            Err(e) if users::is_unique_violation(&e) => {
                match users::find_by_provider_identity(db, profile.provider, &profile.external_id)
                    .await?
                {
                    Some(user) => {
                        debug!(
                            user_id = %user.id,
                            "Concurrent first login settled on existing identity"
                        );
                        Ok(user)
                    }
                    None => Err(ResolutionError::EmailConflict {
                        email: profile.email_or_placeholder(),
                    }),
                }
            }
            Err(e) => Err(ResolutionError::Store(e.to_string())),
        }
    }
}
