use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use tracing::debug;

use super::core::Database;
use crate::TARGET_DB;

/// Remembers which entry ids have already been notified.
#[async_trait]
pub trait SeenStore: Send + Sync {
    async fn is_seen(&self, id: &str) -> Result<bool>;
    async fn mark_seen(&self, id: &str) -> Result<()>;
    /// Forgets ids older than `older_than_days`; returns how many went.
    async fn cleanup(&self, older_than_days: u32) -> Result<u64>;
}

fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Database {
    pub async fn has_seen(&self, id: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM seen_entries WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    /// Records `id` as seen at `at`; an existing record is left untouched.
    pub async fn insert_seen(&self, id: &str, at: chrono::DateTime<Utc>) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("INSERT OR IGNORE INTO seen_entries (id, seen_at) VALUES (?1, ?2)")
            .bind(id)
            .bind(timestamp(at))
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_seen_before(&self, cutoff: chrono::DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM seen_entries WHERE seen_at < ?1")
            .bind(timestamp(cutoff))
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_seen(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM seen_entries")
            .fetch_one(self.pool())
            .await
    }
}

#[async_trait]
impl SeenStore for Database {
    async fn is_seen(&self, id: &str) -> Result<bool> {
        Ok(self.has_seen(id).await?)
    }

    async fn mark_seen(&self, id: &str) -> Result<()> {
        if !self.insert_seen(id, Utc::now()).await? {
            debug!(target: TARGET_DB, "Entry {} was already marked seen", id);
        }
        Ok(())
    }

    async fn cleanup(&self, older_than_days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
        let removed = self.delete_seen_before(cutoff).await?;
        debug!(target: TARGET_DB, "Removed {} seen entries older than {}", removed, timestamp(cutoff));
        Ok(removed)
    }
}
