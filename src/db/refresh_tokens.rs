//! Database operations for refresh tokens.

use chrono::Utc;
use sea_orm::*;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::entity::refresh_token;
use crate::error::AppResult;

/// Hash a refresh token using SHA-256. Only the hash is persisted.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a random refresh token string.
pub fn generate_token() -> String {
    let random_bytes: [u8; 32] = rand::random();
    format!("imagine_rt_{}", hex::encode(random_bytes))
}

/// Insert a new refresh token (stores the hash, not the raw token).
pub async fn insert(
    db: &DatabaseConnection,
    user_id: Uuid,
    token_hash: &str,
    ttl_secs: u64,
) -> AppResult<()> {
    let now = Utc::now();
    let expires_at = now + chrono::Duration::seconds(ttl_secs as i64);

    let model = refresh_token::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        token_hash: Set(token_hash.to_string()),
        expires_at: Set(expires_at),
        revoked_at: Set(None),
        created_at: Set(now),
    };

    refresh_token::Entity::insert(model).exec(db).await?;

    Ok(())
}

/// Atomically revoke an active (non-revoked, non-expired) refresh token
/// and return its user_id.
///
/// Only one caller can claim a given token; every later or concurrent
/// claim gets `None`.
pub async fn claim_by_hash(
    db: &DatabaseConnection,
    token_hash: &str,
) -> AppResult<Option<Uuid>> {
    let now = Utc::now();
    let claimed = refresh_token::Entity::update_many()
        .col_expr(
            refresh_token::Column::RevokedAt,
            sea_orm::prelude::Expr::value(Some(now)),
        )
        .filter(refresh_token::Column::TokenHash.eq(token_hash))
        .filter(refresh_token::Column::RevokedAt.is_null())
        .filter(refresh_token::Column::ExpiresAt.gt(now))
        .exec(db)
        .await?;

    if claimed.rows_affected == 0 {
        return Ok(None);
    }

    let token = refresh_token::Entity::find()
        .filter(refresh_token::Column::TokenHash.eq(token_hash))
        .one(db)
        .await?;

    Ok(token.map(|m| m.user_id))
}

/// Revoke a refresh token by its hash.
pub async fn revoke_by_hash(db: &DatabaseConnection, token_hash: &str) -> AppResult<bool> {
    let result = refresh_token::Entity::update_many()
        .col_expr(
            refresh_token::Column::RevokedAt,
            sea_orm::prelude::Expr::value(Some(Utc::now())),
        )
        .filter(refresh_token::Column::TokenHash.eq(token_hash))
        .filter(refresh_token::Column::RevokedAt.is_null())
        .exec(db)
        .await?;

    Ok(result.rows_affected > 0)
}

/// Delete tokens that expired or were revoked before the given age.
pub async fn cleanup_expired(db: &DatabaseConnection, older_than_secs: u64) -> AppResult<u64> {
    let cutoff = Utc::now() - chrono::Duration::seconds(older_than_secs as i64);

    let result = refresh_token::Entity::delete_many()
        .filter(
            Condition::any()
                .add(refresh_token::Column::ExpiresAt.lt(cutoff))
                .add(refresh_token::Column::RevokedAt.lt(cutoff)),
        )
        .exec(db)
        .await?;

    Ok(result.rows_affected)
}
