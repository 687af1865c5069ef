//! Database operations for users.

use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::entity::user;
use crate::error::{AppError, AppResult};
use crate::models::user::{OAuthProvider, ProviderProfile, User};

/// Find a user by provider-scoped identity.
pub async fn find_by_provider_identity(
    db: &DatabaseConnection,
    provider: OAuthProvider,
    external_id: &str,
) -> AppResult<Option<User>> {
    let result = user::Entity::find()
        .filter(user::Column::Provider.eq(provider.as_str()))
        .filter(user::Column::ExternalId.eq(external_id))
        .one(db)
        .await?;

    result.map(model_to_user).transpose()
}

/// Insert a new user for the given profile.
///
/// Returns the raw `DbErr` so callers can distinguish unique-constraint
/// violations from other failures.
pub async fn insert_from_profile(
    db: &DatabaseConnection,
    profile: &ProviderProfile,
) -> Result<User, DbErr> {
    let now = Utc::now();

    let model = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        provider: Set(profile.provider.as_str().to_string()),
        external_id: Set(profile.external_id.clone()),
        display_name: Set(profile.display_name.clone()),
        email: Set(profile.email_or_placeholder()),
        avatar_url: Set(profile.avatar_url.clone()),
        last_login_at: Set(Some(now)),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = model.insert(db).await?;
    model_to_user(inserted).map_err(|e| DbErr::Custom(e.to_string()))
}

/// Refresh the mutable profile fields on repeat login.
///
/// Email is left untouched so a login never introduces an email conflict.
pub async fn refresh_profile(
    db: &DatabaseConnection,
    id: Uuid,
    profile: &ProviderProfile,
) -> AppResult<User> {
    let existing = user::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", id)))?;

    let now = Utc::now();
    let mut active: user::ActiveModel = existing.into();
    active.display_name = Set(profile.display_name.clone());
    active.avatar_url = Set(profile.avatar_url.clone());
    active.last_login_at = Set(Some(now));
    active.updated_at = Set(now);
    let updated = active.update(db).await?;

    model_to_user(updated)
}

/// Find a user by ID.
pub async fn find_by_id(db: &DatabaseConnection, id: Uuid) -> AppResult<Option<User>> {
    let result = user::Entity::find_by_id(id).one(db).await?;
    result.map(model_to_user).transpose()
}

/// Count users (diagnostics and tests).
pub async fn count(db: &DatabaseConnection) -> AppResult<u64> {
    Ok(user::Entity::find().count(db).await?)
}

/// Whether a database error is a unique-constraint violation.
pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn model_to_user(m: user::Model) -> AppResult<User> {
    let provider = OAuthProvider::parse(&m.provider).ok_or_else(|| {
        AppError::Database(format!("Unknown provider '{}' for user {}", m.provider, m.id))
    })?;

    Ok(User {
        id: m.id,
        provider,
        external_id: m.external_id,
        display_name: m.display_name,
        email: m.email,
        avatar_url: m.avatar_url,
        last_login_at: m.last_login_at,
        created_at: m.created_at,
        updated_at: m.updated_at,
    })
}
