//! Ledger schema setup: connection options and idempotent schema apply.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = include_str!("schema.sql");

/// Stored in `PRAGMA user_version` once the schema is applied.
pub const SCHEMA_VERSION: i64 = 1;

/// Open (creating if needed) the ledger database at `db_path` and apply the schema.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    apply_schema(&pool).await?;
    info!(path = db_path, version = SCHEMA_VERSION, "Ledger database ready");
    Ok(pool)
}

/// Apply every schema statement in one transaction. Statements are all
/// `IF NOT EXISTS`, so reapplying is a no-op.
async fn apply_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut applied = 0usize;
    for statement in schema_statements(SCHEMA) {
        sqlx::query(&statement).execute(&mut *tx).await?;
        applied += 1;
    }
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    debug!(statements = applied, "Schema applied");
    Ok(())
}

/// Split `sql` into statements, dropping `--` comment lines first so
/// comments may contain semicolons.
fn schema_statements(sql: &str) -> Vec<String> {
    let stripped: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    stripped
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fresh_db() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("nested")
            .join("ledger.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (temp_dir, pool)
    }

    async fn insert_trade(pool: &SqlitePool, side: &str, status: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO trades (timestamp_ms, side, mint, quantity, status) VALUES (1, ?, 'm1', '1', ?)",
        )
        .bind(side)
        .bind(status)
        .execute(pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    #[test]
    fn test_schema_statements_skip_comments() {
        let sql = "-- header; with a semicolon\nCREATE TABLE a (x INTEGER);\n\n  -- note\nCREATE INDEX i ON a(x);\n";
        assert_eq!(
            schema_statements(sql),
            vec!["CREATE TABLE a (x INTEGER)", "CREATE INDEX i ON a(x)"]
        );
    }

    #[tokio::test]
    async fn test_init_creates_ledger_tables_and_version() {
        let (_dir, pool) = fresh_db().await;

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec!["blacklist", "events", "positions", "trade_fills", "trades", "whitelist"]
        );

        let version: i64 = sqlx::query_scalar("PRAGMA user_version").fetch_one(&pool).await.unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        apply_schema(&pool).await.expect("reapply failed");
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 6);
    }

    #[tokio::test]
    async fn test_trades_reject_unknown_side_and_status() {
        let (_dir, pool) = fresh_db().await;
        assert!(insert_trade(&pool, "buy", "pending").await.is_ok());
        assert!(insert_trade(&pool, "hold", "pending").await.is_err());
        assert!(insert_trade(&pool, "sell", "bogus").await.is_err());
    }

    #[tokio::test]
    async fn test_one_position_per_mint() {
        let (_dir, pool) = fresh_db().await;
        let insert = "INSERT INTO positions (mint, quantity, avg_entry_price_usd, opened_at_ms, last_update_at_ms) \
                      VALUES ('m1', '20', '1', 0, 0)";
        sqlx::query(insert).execute(&pool).await.unwrap();
        assert!(sqlx::query(insert).execute(&pool).await.is_err());
    }

    #[tokio::test]
    async fn test_trade_fills_need_a_trade_and_are_single() {
        let (_dir, pool) = fresh_db().await;
        let fill = "INSERT INTO trade_fills (trade_id, quantity, price_usd) VALUES (?, '20', '1')";

        // Foreign keys are enforced on pooled connections.
        assert!(sqlx::query(fill).bind(42_i64).execute(&pool).await.is_err());

        let id = insert_trade(&pool, "buy", "executed").await.unwrap();
        sqlx::query(fill).bind(id).execute(&pool).await.unwrap();
        assert!(sqlx::query(fill).bind(id).execute(&pool).await.is_err());
    }

    #[tokio::test]
    async fn test_connection_pragmas() {
        let (_dir, pool) = fresh_db().await;
        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys").fetch_one(&pool).await.unwrap();
        assert_eq!(foreign_keys, 1);
        let journal: String = sqlx::query_scalar("PRAGMA journal_mode").fetch_one(&pool).await.unwrap();
        assert!(matches!(journal.as_str(), "wal" | "delete"), "journal_mode {}", journal);
    }
}
