//! User models for OAuth-linked identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::NO_PUBLIC_EMAIL;

/// Supported OAuth providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    GitHub,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::GitHub => "github",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "google" => Some(Self::Google),
            "github" => Some(Self::GitHub),
            _ => None,
        }
    }
}

impl std::fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User stored in database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub provider: OAuthProvider,
    pub external_id: String,
    pub display_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User info response (returned by /auth/me).
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub provider: OAuthProvider,
    pub display_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            provider: u.provider,
            display_name: u.display_name,
            email: u.email,
            avatar_url: u.avatar_url,
        }
    }
}

/// Provider profile normalized from an OAuth callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider: OAuthProvider,
    pub external_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProviderProfile {
    /// The email to store, falling back to the placeholder.
    pub fn email_or_placeholder(&self) -> String {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(NO_PUBLIC_EMAIL)
            .to_string()
    }
}

/// Google OpenID Connect userinfo.
#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub picture: Option<String>,
}

impl From<GoogleUserInfo> for ProviderProfile {
    fn from(info: GoogleUserInfo) -> Self {
        let display_name = info
            .name
            .clone()
            .or_else(|| info.email.clone())
            .unwrap_or_else(|| info.sub.clone());
        Self {
            provider: OAuthProvider::Google,
            external_id: info.sub,
            display_name,
            email: info.email,
            avatar_url: info.picture,
        }
    }
}

/// GitHub user info from API.
#[derive(Debug, Deserialize)]
pub struct GitHubUserInfo {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
}

impl From<GitHubUserInfo> for ProviderProfile {
    fn from(info: GitHubUserInfo) -> Self {
        Self {
            provider: OAuthProvider::GitHub,
            external_id: info.id.to_string(),
            display_name: info.login,
            email: info.email,
            avatar_url: info.avatar_url,
        }
    }
}

/// Entry from GitHub's `/user/emails`.
#[derive(Debug, Deserialize)]
pub struct GitHubEmail {
    pub email: String,
    pub primary: bool,
    pub verified: bool,
}

/// Session JWT claims. Only the identity reference is embedded.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub iss: String,
    pub exp: usize,
    pub iat: usize,
}
