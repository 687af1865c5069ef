//! Google and GitHub OAuth routes for browser login.
//!
//! Implements the authorization-code grant with a short-lived access
//! token and a rotating refresh token:
//! - Access token: HS256 JWT in the `imagine_session` HttpOnly cookie
//! - Refresh token: opaque token (SHA-256 hashed in DB) in `imagine_refresh`
//!
//! Endpoints:
//! 1. GET /auth/{google,github} - Redirect to the provider (with CSRF `state`)
//! 2. GET /auth/{google,github}/callback - Verify state, exchange code, resolve identity
//! 3. POST /auth/refresh - Rotate the refresh token and reissue the pair
//! 4. GET /auth/me - Return the current user, or null
//! 5. POST /auth/logout - Revoke the refresh token and clear both cookies

use std::time::Duration;

use actix_web::cookie::{Cookie, SameSite};
use actix_web::{HttpRequest, HttpResponse, get, post, web};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use super::identity::IdentityResolver;
use super::session::{self, SessionError};
use crate::config::{
    Config, OAUTH_STATE_COOKIE, OAuthClientSettings, REFRESH_COOKIE, SESSION_COOKIE,
};
use crate::db::{DbPool, refresh_tokens, users};
use crate::error::{AppError, AppResult};
use crate::models::user::{
    GitHubEmail, GitHubUserInfo, GoogleUserInfo, OAuthProvider, ProviderProfile, User,
    UserResponse,
};

/// HTTP connect timeout for provider calls.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// HTTP total timeout for provider calls.
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configure OAuth routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(google_login)
        .service(github_login)
        .service(google_callback)
        .service(github_callback)
        .service(refresh)
        .service(get_current_user)
        .service(logout);
}

/// Failure talking to an OAuth provider.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("request to provider failed: {0}")]
    Transport(String),

    #[error("provider rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl From<OAuthError> for AppError {
    fn from(err: OAuthError) -> Self {
        warn!("OAuth: {}", err);
        AppError::LoginFailed
    }
}

/// HTTP client for provider token and profile endpoints.
#[derive(Clone)]
pub struct OAuthClient {
    http_client: reqwest::Client,
}

impl OAuthClient {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(HTTP_REQUEST_TIMEOUT)
            .user_agent(concat!("imagine-server/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http_client })
    }

    /// Exchange an authorization code for a provider access token.
    ///
    /// Google expects a form-encoded body; GitHub accepts JSON and only
    /// answers in JSON when asked to.
    pub async fn exchange_code(
        &self,
        provider: OAuthProvider,
        settings: &OAuthClientSettings,
        code: &str,
    ) -> Result<SecretString, OAuthError> {
        let request = self
            .http_client
            .post(&settings.token_url)
            .header("Accept", "application/json");

        let request = match provider {
            OAuthProvider::Google => request.form(&[
                ("code", code),
                ("client_id", settings.client_id.as_str()),
                ("client_secret", settings.client_secret.expose_secret()),
                ("redirect_uri", settings.callback_url.as_str()),
                ("grant_type", "authorization_code"),
            ]),
            OAuthProvider::GitHub => request.json(&serde_json::json!({
                "client_id": settings.client_id,
                "client_secret": settings.client_secret.expose_secret(),
                "code": code,
                "redirect_uri": settings.callback_url,
            })),
        };

        let response: TokenResponse = request
            .send()
            .await
            .map_err(|e| OAuthError::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuthError::Decode(format!("token response: {}", e)))?;

        if let Some(err) = response.error {
            return Err(OAuthError::Rejected(format!(
                "{} ({})",
                err,
                response.error_description.as_deref().unwrap_or("no description")
            )));
        }

        response
            .access_token
            .filter(|t| !t.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| OAuthError::Decode("no access_token in token response".to_string()))
    }

    /// Fetch and normalize the user's profile.
    pub async fn fetch_profile(
        &self,
        provider: OAuthProvider,
        settings: &OAuthClientSettings,
        access_token: &SecretString,
    ) -> Result<ProviderProfile, OAuthError> {
        match provider {
            OAuthProvider::Google => {
                let info: GoogleUserInfo =
                    self.get_json(&settings.userinfo_url, access_token).await?;
                Ok(info.into())
            }
            OAuthProvider::GitHub => {
                let info: GitHubUserInfo =
                    self.get_json(&settings.userinfo_url, access_token).await?;
                let mut profile: ProviderProfile = info.into();

                if profile.email.is_none()
                    && let Some(emails_url) = settings.emails_url.as_deref()
                {
                    profile.email = self.primary_github_email(emails_url, access_token).await;
                }
                Ok(profile)
            }
        }
    }

    /// Primary verified address, when the token grants access to it.
    async fn primary_github_email(
        &self,
        emails_url: &str,
        access_token: &SecretString,
    ) -> Option<String> {
        match self.get_json::<Vec<GitHubEmail>>(emails_url, access_token).await {
            Ok(emails) => primary_verified_email(emails),
            Err(e) => {
                debug!("OAuth: GitHub email lookup unavailable: {}", e);
                None
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        access_token: &SecretString,
    ) -> Result<T, OAuthError> {
        let response = self
            .http_client
            .get(url)
            .header(
                "Authorization",
                format!("Bearer {}", access_token.expose_secret()),
            )
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| OAuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OAuthError::Rejected(format!(
                "{} returned HTTP {}",
                url,
                status.as_u16()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| OAuthError::Decode(format!("{}: {}", url, e)))
    }
}

fn primary_verified_email(emails: Vec<GitHubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email)
}

/// Generate a cryptographically random string.
fn generate_random_hex() -> String {
    let random_bytes: [u8; 32] = rand::random();
    hex::encode(random_bytes)
}

fn authorize_url(settings: &OAuthClientSettings, state: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}",
        settings.authorize_url,
        urlencoding::encode(&settings.client_id),
        urlencoding::encode(&settings.callback_url),
        urlencoding::encode(&settings.scope),
        urlencoding::encode(state),
    )
}

fn http_only_cookie(
    name: &'static str,
    value: String,
    same_site: SameSite,
    secure: bool,
) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(same_site);
    cookie.set_secure(secure);
    cookie
}

fn removal_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = http_only_cookie(name, String::new(), SameSite::Lax, secure);
    cookie.make_removal();
    cookie
}

// ============================================================================
// Endpoints
// ============================================================================

/// Redirect to Google's consent screen.
///
/// GET /auth/google
#[get("/auth/google")]
pub async fn google_login(config: web::Data<Config>) -> AppResult<HttpResponse> {
    begin_login(OAuthProvider::Google, &config)
}

/// Redirect to GitHub's consent screen.
///
/// GET /auth/github
#[get("/auth/github")]
pub async fn github_login(config: web::Data<Config>) -> AppResult<HttpResponse> {
    begin_login(OAuthProvider::GitHub, &config)
}

/// GET /auth/google/callback?code=...&state=...
#[get("/auth/google/callback")]
pub async fn google_callback(
    req: HttpRequest,
    query: web::Query<CallbackQuery>,
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
    oauth: web::Data<OAuthClient>,
    resolver: web::Data<IdentityResolver>,
) -> AppResult<HttpResponse> {
    let ctx = CallbackContext {
        config: &config,
        pool: &pool,
        oauth: &oauth,
        resolver: &resolver,
    };
    complete_login(OAuthProvider::Google, &req, &query, ctx).await
}

/// GET /auth/github/callback?code=...&state=...
#[get("/auth/github/callback")]
pub async fn github_callback(
    req: HttpRequest,
    query: web::Query<CallbackQuery>,
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
    oauth: web::Data<OAuthClient>,
    resolver: web::Data<IdentityResolver>,
) -> AppResult<HttpResponse> {
    let ctx = CallbackContext {
        config: &config,
        pool: &pool,
        oauth: &oauth,
        resolver: &resolver,
    };
    complete_login(OAuthProvider::GitHub, &req, &query, ctx).await
}

/// Refresh the access token using the refresh token.
///
/// Rotates: the old refresh token is claimed (revoked) exactly once and a
/// new pair is issued. A second use of the same token is rejected.
///
/// POST /auth/refresh
#[post("/auth/refresh")]
pub async fn refresh(
    req: HttpRequest,
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let refresh_token = req
        .cookie(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthorized("No refresh token".to_string()))?;

    let token_hash = refresh_tokens::hash_token(&refresh_token);
    let user_id = refresh_tokens::claim_by_hash(pool.connection(), &token_hash)
        .await?
        .ok_or_else(|| {
            warn!("Refresh: invalid, expired or already used refresh token");
            AppError::Unauthorized("Invalid refresh token".to_string())
        })?;

    let user = users::find_by_id(pool.connection(), user_id)
        .await?
        .ok_or_else(|| {
            warn!("Refresh: user {} not found", user_id);
            AppError::Unauthorized("User not found".to_string())
        })?;

    let (access, refresh_cookie) = issue_token_pair(&user, &config, &pool).await?;
    debug!(user_id = %user.id, "Session refreshed");

    Ok(HttpResponse::Ok()
        .cookie(access)
        .cookie(refresh_cookie)
        .json(serde_json::json!({ "user": UserResponse::from(user) })))
}

/// Get the current user from the access token.
///
/// GET /auth/me
#[get("/auth/me")]
pub async fn get_current_user(
    req: HttpRequest,
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let Some(token) = req.cookie(SESSION_COOKIE) else {
        return Ok(HttpResponse::Ok().json(serde_json::json!({ "user": null })));
    };

    match session::deserialize(token.value(), &config.session, &pool).await {
        Ok(user) => {
            let response: UserResponse = user.into();
            Ok(HttpResponse::Ok().json(serde_json::json!({ "user": response })))
        }
        Err(SessionError::Store(e)) => Err(AppError::Database(e)),
        Err(_) => Ok(HttpResponse::Ok().json(serde_json::json!({ "user": null }))),
    }
}

/// Logout: revoke the refresh token server-side and clear both cookies.
///
/// POST /auth/logout
#[post("/auth/logout")]
pub async fn logout(
    req: HttpRequest,
    config: web::Data<Config>,
    pool: web::Data<DbPool>,
) -> AppResult<HttpResponse> {
    let secure = config.environment.is_production();

    if let Some(refresh_cookie) = req.cookie(REFRESH_COOKIE) {
        let token_hash = refresh_tokens::hash_token(refresh_cookie.value());
        if let Err(e) = refresh_tokens::revoke_by_hash(pool.connection(), &token_hash).await {
            warn!("Logout: failed to revoke refresh token: {}", e);
        }
    }

    Ok(HttpResponse::Ok()
        .cookie(removal_cookie(SESSION_COOKIE, secure))
        .cookie(removal_cookie(REFRESH_COOKIE, secure))
        .json(serde_json::json!({ "message": "Logged out" })))
}

// ============================================================================
// Helpers
// ============================================================================

fn begin_login(provider: OAuthProvider, config: &Config) -> AppResult<HttpResponse> {
    let settings = config.oauth_client(provider);
    let state = generate_random_hex();

    let state_cookie = http_only_cookie(
        OAUTH_STATE_COOKIE,
        state.clone(),
        SameSite::Lax,
        config.environment.is_production(),
    );

    debug!(provider = %provider, "Redirecting to provider consent screen");
    Ok(HttpResponse::Found()
        .cookie(state_cookie)
        .append_header(("Location", authorize_url(settings, &state)))
        .finish())
}

struct CallbackContext<'a> {
    config: &'a Config,
    pool: &'a DbPool,
    oauth: &'a OAuthClient,
    resolver: &'a IdentityResolver,
}

async fn complete_login(
    provider: OAuthProvider,
    req: &HttpRequest,
    query: &CallbackQuery,
    ctx: CallbackContext<'_>,
) -> AppResult<HttpResponse> {
    // --- CSRF state verification ---
    let expected_state = req
        .cookie(OAUTH_STATE_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| {
            warn!(provider = %provider, "OAuth callback: missing state cookie");
            AppError::Unauthorized("OAuth state verification failed".to_string())
        })?;

    let provided_state = query.state.as_deref().unwrap_or("");
    let state_matches: bool = provided_state
        .as_bytes()
        .ct_eq(expected_state.as_bytes())
        .into();
    if provided_state.is_empty() || !state_matches {
        warn!(provider = %provider, "OAuth callback: state mismatch");
        return Err(AppError::Unauthorized(
            "OAuth state verification failed".to_string(),
        ));
    }

    if let Some(err) = &query.error {
        warn!(provider = %provider, "OAuth callback: provider returned '{}'", err);
        return Err(AppError::LoginFailed);
    }

    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Missing authorization code".to_string()))?;

    let settings = ctx.config.oauth_client(provider);
    let access_token = ctx.oauth.exchange_code(provider, settings, code).await?;
    let profile = ctx
        .oauth
        .fetch_profile(provider, settings, &access_token)
        .await?;

    let user = ctx.resolver.resolve(&profile).await?;

    info!(
        "{} OAuth login: user='{}' (id={})",
        provider, user.display_name, user.id
    );

    let (access, refresh_cookie) = issue_token_pair(&user, ctx.config, ctx.pool).await?;
    let secure = ctx.config.environment.is_production();

    Ok(HttpResponse::Found()
        .cookie(access)
        .cookie(refresh_cookie)
        .cookie(removal_cookie(OAUTH_STATE_COOKIE, secure))
        .append_header(("Location", ctx.config.session.post_login_redirect.as_str()))
        .finish())
}

/// Issue an access token + refresh token cookie pair.
async fn issue_token_pair(
    user: &User,
    config: &Config,
    pool: &DbPool,
) -> AppResult<(Cookie<'static>, Cookie<'static>)> {
    let secure = config.environment.is_production();
    let access_token = session::serialize(user, &config.session)?;

    let raw_refresh_token = refresh_tokens::generate_token();
    let refresh_hash = refresh_tokens::hash_token(&raw_refresh_token);
    refresh_tokens::insert(
        pool.connection(),
        user.id,
        &refresh_hash,
        config.session.refresh_token_ttl_secs,
    )
    .await?;

    let access = http_only_cookie(SESSION_COOKIE, access_token, SameSite::Lax, secure);
    let refresh_cookie = http_only_cookie(
        REFRESH_COOKIE,
        raw_refresh_token,
        SameSite::Strict,
        secure,
    );

    Ok((access, refresh_cookie))
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set when the user denies consent.
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}
