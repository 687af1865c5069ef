//! Actix-web extractor binding a request to its session user.
//!
//! # Security
//! - The session cookie is verified (signature, issuer, expiry) before any lookup
//! - Only the user id is trusted from the token; the profile is re-read from the store
//! - A token for a deleted identity is rejected with `SESSION_IDENTITY_MISSING`

use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest, web};
use futures_util::future::LocalBoxFuture;

use crate::config::{Config, SESSION_COOKIE};
use crate::db::DbPool;
use crate::models::user::User;
use crate::services::session::{self, SessionError};

/// Extractor that requires a logged-in user.
///
/// ```ignore
/// async fn protected_handler(auth: SessionUser) -> impl Responder {
///     // auth.user is the resolved identity
/// }
/// ```
pub struct SessionUser {
    pub user: User,
}

impl SessionUser {
    /// Key identifying this user's generation job slot.
    pub fn caller_key(&self) -> String {
        self.user.id.to_string()
    }
}

impl FromRequest for SessionUser {
    type Error = SessionError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = req.cookie(SESSION_COOKIE).map(|c| c.value().to_string());
        let config = req.app_data::<web::Data<Config>>().cloned();
        let pool = req.app_data::<web::Data<DbPool>>().cloned();

        Box::pin(async move {
            let token = token.ok_or(SessionError::NotLoggedIn)?;
            let (config, pool) = match (config, pool) {
                (Some(config), Some(pool)) => (config, pool),
                _ => {
                    return Err(SessionError::Store(
                        "session dependencies are not configured".to_string(),
                    ));
                }
            };

            let user = session::deserialize(&token, &config.session, &pool).await?;
            Ok(SessionUser { user })
        })
    }
}
