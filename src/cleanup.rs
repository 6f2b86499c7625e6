//! Scheduled deletion of long-expired rotation tokens.
//!
//! Expired, used and revoked rows are kept for a retention window so that a
//! late replay of a recently rotated token is still recognised.

use crate::db::Database;
use crate::jwt::now_secs;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Delete rotation tokens that expired more than `retention_secs` ago.
pub async fn run_cleanup(db: &Database, retention_secs: u64) {
    let now = match now_secs() {
        Ok(now) => now,
        Err(e) => {
            error!(error = %e, "Failed to read system time for cleanup");
            return;
        }
    };
    let cutoff = now.saturating_sub(retention_secs) as i64;

    match db.tokens().delete_expired_before(cutoff).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired rotation tokens", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired rotation tokens: {}", e),
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database, retention_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db, retention_secs).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::SessionClaims;

    #[tokio::test]
    async fn test_cleanup_respects_retention() {
        let db = Database::open(":memory:").await.unwrap();
        let now = now_secs().unwrap() as i64;
        let claims = SessionClaims::default();
        let tokens = db.tokens();

        tokens
            .create("owner-1", "ancient", &claims, now - 1000, now - 500)
            .await
            .unwrap();
        tokens
            .create("owner-1", "recent", &claims, now - 100, now - 10)
            .await
            .unwrap();
        tokens
            .create("owner-1", "live", &claims, now, now + 1000)
            .await
            .unwrap();

        run_cleanup(&db, 100).await;

        assert!(tokens.get_by_hash("ancient").await.unwrap().is_none());
        assert!(tokens.get_by_hash("recent").await.unwrap().is_some());
        assert!(tokens.get_by_hash("live").await.unwrap().is_some());
    }
}
