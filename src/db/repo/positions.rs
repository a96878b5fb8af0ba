//! Open position operations for the repository.

use crate::domain::decimal::{parse_or_zero, to_canonical_string};
use crate::domain::{Mint, Position, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{RepoError, Repository};

impl Repository {
    /// Insert a new position.
    ///
    /// # Errors
    /// `RepoError::PositionExists` if the mint already has a position.
    pub async fn create_position(&self, position: &Position) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO positions
            (mint, quantity, avg_entry_price_usd, opened_at_ms, last_update_at_ms, strategy)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(mint) DO NOTHING
            "#,
        )
        .bind(position.mint.as_str())
        .bind(to_canonical_string(position.quantity))
        .bind(to_canonical_string(position.avg_entry_price_usd))
        .bind(position.opened_at.as_ms())
        .bind(position.last_update_at.as_ms())
        .bind(&position.strategy)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::PositionExists(position.mint.to_string()));
        }
        Ok(())
    }

    pub async fn get_position(&self, mint: &Mint) -> Result<Option<Position>, RepoError> {
        let row = sqlx::query(
            r#"
            SELECT mint, quantity, avg_entry_price_usd, opened_at_ms, last_update_at_ms, strategy
            FROM positions WHERE mint = ?
            "#,
        )
        .bind(mint.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(position_from_row))
    }

    /// All open positions, oldest first.
    pub async fn list_positions(&self) -> Result<Vec<Position>, RepoError> {
        let rows = sqlx::query(
            r#"
            SELECT mint, quantity, avg_entry_price_usd, opened_at_ms, last_update_at_ms, strategy
            FROM positions
            ORDER BY opened_at_ms ASC, mint ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(position_from_row).collect())
    }

    pub async fn count_positions(&self) -> Result<i64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM positions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Overwrite quantity, entry price and update time. Returns false if absent.
    pub async fn update_position(&self, position: &Position) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            UPDATE positions
            SET quantity = ?, avg_entry_price_usd = ?, last_update_at_ms = ?
            WHERE mint = ?
            "#,
        )
        .bind(to_canonical_string(position.quantity))
        .bind(to_canonical_string(position.avg_entry_price_usd))
        .bind(position.last_update_at.as_ms())
        .bind(position.mint.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a position. Returns false if there was none.
    pub async fn delete_position(&self, mint: &Mint) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM positions WHERE mint = ?")
            .bind(mint.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn position_from_row(row: &SqliteRow) -> Position {
    Position {
        mint: Mint::new(row.get::<String, _>("mint")),
        quantity: parse_or_zero(&row.get::<String, _>("quantity")),
        avg_entry_price_usd: parse_or_zero(&row.get::<String, _>("avg_entry_price_usd")),
        opened_at: TimeMs::new(row.get("opened_at_ms")),
        last_update_at: TimeMs::new(row.get("last_update_at_ms")),
        strategy: row.get("strategy"),
    }
}
