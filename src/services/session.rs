//! Session tokens binding a resolved identity to later requests.
//!
//! The token is an HS256 JWT whose only identity payload is the user id.
//! Profile data is always re-read from the store, so a deleted identity
//! is detected on the next request.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::SessionSettings;
use crate::db::{DbPool, users};
use crate::error::{AppError, AppResult, ErrorResponse};
use crate::models::user::{SessionClaims, User};

/// Session JWT issuer.
pub const SESSION_ISSUER: &str = "imagine";

/// Why a request could not be bound to a user.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No token, or the token is invalid or expired.
    #[error("Not logged in")]
    NotLoggedIn,

    /// The token is valid but its identity no longer exists.
    #[error("Session refers to identity {0}, which no longer exists")]
    IdentityNotFound(Uuid),

    #[error("Session lookup failed: {0}")]
    Store(String),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotLoggedIn => "UNAUTHORIZED",
            Self::IdentityNotFound(_) => "SESSION_IDENTITY_MISSING",
            Self::Store(_) => "DATABASE_ERROR",
        }
    }
}

impl ResponseError for SessionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotLoggedIn | Self::IdentityNotFound(_) => StatusCode::UNAUTHORIZED,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            Self::Store(err) => {
                tracing::error!("Session lookup failed: {}", err);
                "An internal database error occurred".to_string()
            }
            Self::IdentityNotFound(_) => {
                "Your account no longer exists. Please log in again.".to_string()
            }
            Self::NotLoggedIn => self.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.code().to_string(),
            message,
        })
    }
}

/// Serialize a user into a signed session token.
pub fn serialize(user: &User, settings: &SessionSettings) -> AppResult<String> {
    let now = chrono::Utc::now();
    let exp = now + chrono::Duration::seconds(settings.access_token_ttl_secs as i64);

    let claims = SessionClaims {
        sub: user.id.to_string(),
        iss: SESSION_ISSUER.to_string(),
        exp: exp.timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    let key = EncodingKey::from_secret(settings.secret.expose_secret().as_bytes());
    encode(&Header::default(), &claims, &key)
        .map_err(|e| AppError::InvalidInput(format!("Failed to create session token: {}", e)))
}

/// Verify a token's signature, issuer and expiry, returning the user id.
pub fn verify(token: &str, settings: &SessionSettings) -> Result<Uuid, SessionError> {
    let key = DecodingKey::from_secret(settings.secret.expose_secret().as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[SESSION_ISSUER]);
    validation.validate_aud = false;

    let data = decode::<SessionClaims>(token, &key, &validation).map_err(|e| {
        debug!("Rejected session token: {}", e);
        SessionError::NotLoggedIn
    })?;

    Uuid::parse_str(&data.claims.sub).map_err(|_| SessionError::NotLoggedIn)
}

/// Reconstitute the full user for a session token.
pub async fn deserialize(
    token: &str,
    settings: &SessionSettings,
    pool: &DbPool,
) -> Result<User, SessionError> {
    let user_id = verify(token, settings)?;

    users::find_by_id(pool.connection(), user_id)
        .await
        .map_err(|e| SessionError::Store(e.to_string()))?
        .ok_or_else(|| {
            warn!(user_id = %user_id, "Session identity no longer exists");
            SessionError::IdentityNotFound(user_id)
        })
}
