//! Cleanup service for expired and revoked refresh tokens.

use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::db::{DbPool, refresh_tokens};
use crate::error::AppResult;

/// Configuration for the cleanup service.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Keep expired/revoked tokens this long before deleting them
    pub retention_secs: u64,
    /// How often to run cleanup (in seconds)
    pub interval_secs: u64,
}

/// Start the cleanup background task.
///
/// The task runs until `shutdown` is cancelled.
pub fn start_cleanup_task(pool: DbPool, config: CleanupConfig, shutdown: CancellationToken) {
    tokio::spawn(async move {
        info!(
            "Starting refresh token cleanup (retention: {} seconds, interval: {} seconds)",
            config.retention_secs, config.interval_secs
        );

        let mut ticker = interval(Duration::from_secs(config.interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Refresh token cleanup stopped");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = run_cleanup(&pool, &config).await {
                error!("Cleanup task error: {}", e);
            }
        }
    });
}

/// Run a single cleanup cycle, returning the number of deleted tokens.
pub async fn run_cleanup(pool: &DbPool, config: &CleanupConfig) -> AppResult<u64> {
    let deleted = refresh_tokens::cleanup_expired(pool.connection(), config.retention_secs).await?;

    if deleted > 0 {
        info!("Deleted {} expired or revoked refresh tokens", deleted);
    } else {
        debug!("No refresh tokens to clean up");
    }

    Ok(deleted)
}
