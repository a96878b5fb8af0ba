//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `trades.rs` - Trade ledger and per-strategy stats
//! - `positions.rs` - Open position operations
//!
//! Events and the blacklist/whitelist live here.

mod positions;
mod trades;

use crate::domain::{Event, EventType, Mint, TimeMs};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    /// The trade is missing or already in a terminal status.
    #[error("trade {0} is not pending")]
    TradeNotPending(i64),
    #[error("position already exists for {0}")]
    PositionExists(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Event log
    // =========================================================================

    /// Append a detected event.
    pub async fn record_event(&self, event: &Event) -> Result<i64, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO events (event_type, mint, pair, lp_address, timestamp_ms, raw)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.event_type.as_str())
        .bind(event.mint.as_str())
        .bind(event.pair.as_deref())
        .bind(event.lp_address.as_deref())
        .bind(event.timestamp.as_ms())
        .bind(&event.raw)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent events, newest first.
    pub async fn recent_events(&self, limit: u32) -> Result<Vec<Event>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT event_type, mint, pair, lp_address, timestamp_ms, raw
            FROM events
            ORDER BY timestamp_ms DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let type_str: String = row.get("event_type");
                let event_type = EventType::parse(&type_str)
                    .ok_or_else(|| RepoError::Corrupt(format!("event_type {}", type_str)))?;
                Ok(Event {
                    mint: Mint::new(row.get::<String, _>("mint")),
                    event_type,
                    timestamp: TimeMs::new(row.get("timestamp_ms")),
                    pair: row.get("pair"),
                    lp_address: row.get("lp_address"),
                    raw: row.get::<Option<String>, _>("raw").unwrap_or_default(),
                })
            })
            .collect()
    }

    // =========================================================================
    // Blacklist / whitelist
    // =========================================================================

    pub async fn is_blacklisted(&self, mint: &Mint) -> Result<bool, RepoError> {
        self.list_contains("blacklist", mint).await
    }

    pub async fn add_to_blacklist(&self, mint: &Mint) -> Result<(), RepoError> {
        self.list_insert("blacklist", mint).await
    }

    pub async fn is_whitelisted(&self, mint: &Mint) -> Result<bool, RepoError> {
        self.list_contains("whitelist", mint).await
    }

    pub async fn add_to_whitelist(&self, mint: &Mint) -> Result<(), RepoError> {
        self.list_insert("whitelist", mint).await
    }

    // `table` is always one of the two literals above.
    async fn list_contains(&self, table: &'static str, mint: &Mint) -> Result<bool, RepoError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE mint = ?", table);
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(mint.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn list_insert(&self, table: &'static str, mint: &Mint) -> Result<(), RepoError> {
        let sql = format!(
            "INSERT INTO {} (mint, added_at_ms) VALUES (?, ?) ON CONFLICT(mint) DO NOTHING",
            table
        );
        sqlx::query(&sql)
            .bind(mint.as_str())
            .bind(TimeMs::now().as_ms())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Repository;
    use crate::db::init_db;
    use tempfile::TempDir;

    /// Fresh repository on a temp-dir database. Keep the TempDir alive.
    pub async fn temp_repo() -> (TempDir, Repository) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (temp_dir, Repository::new(pool))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::temp_repo;
    use super::*;

    #[tokio::test]
    async fn test_record_and_read_events() {
        let (_dir, repo) = temp_repo().await;
        let e1 = Event::new(Mint::new("m1"), EventType::NewPool, TimeMs::new(1_000), "{}".into())
            .with_pair("pool1");
        let e2 = Event::new(Mint::new("m2"), EventType::NewMint, TimeMs::new(2_000), "{}".into());
        repo.record_event(&e1).await.unwrap();
        repo.record_event(&e2).await.unwrap();

        let events = repo.recent_events(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], e2);
        assert_eq!(events[1], e1);

        let events = repo.recent_events(1).await.unwrap();
        assert_eq!(events, vec![e2]);
    }

    #[tokio::test]
    async fn test_blacklist_idempotent() {
        let (_dir, repo) = temp_repo().await;
        let mint = Mint::new("bad");
        assert!(!repo.is_blacklisted(&mint).await.unwrap());
        repo.add_to_blacklist(&mint).await.unwrap();
        repo.add_to_blacklist(&mint).await.unwrap();
        assert!(repo.is_blacklisted(&mint).await.unwrap());
        assert!(!repo.is_whitelisted(&mint).await.unwrap());
    }

    #[tokio::test]
    async fn test_whitelist() {
        let (_dir, repo) = temp_repo().await;
        let mint = Mint::new("good");
        repo.add_to_whitelist(&mint).await.unwrap();
        assert!(repo.is_whitelisted(&mint).await.unwrap());
    }
}
