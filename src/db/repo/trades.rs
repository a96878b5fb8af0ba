//! Trade ledger operations for the repository.

use crate::domain::decimal::{parse_or_zero, to_canonical_string};
use crate::domain::{Decimal, Mint, NewTrade, Side, StrategyStats, TimeMs, Trade, TradeOutcome, TradeStatus};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::BTreeMap;

use super::{RepoError, Repository};

const TRADE_SELECT: &str = "SELECT t.id AS id, t.timestamp_ms AS timestamp_ms, t.side AS side, t.mint AS mint, \
     t.quantity AS quantity, t.tx_ref AS tx_ref, t.status AS status, t.strategy AS strategy, \
     f.quantity AS filled_quantity, f.price_usd AS price_usd \
     FROM trades t LEFT JOIN trade_fills f ON f.trade_id = t.id";

impl Repository {
    /// Insert a trade in `Pending` state and return its id.
    pub async fn create_trade(&self, trade: &NewTrade) -> Result<i64, RepoError> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (timestamp_ms, side, mint, quantity, tx_ref, status, strategy)
            VALUES (?, ?, ?, ?, NULL, 'pending', ?)
            "#,
        )
        .bind(trade.timestamp.as_ms())
        .bind(trade.side.as_str())
        .bind(trade.mint.as_str())
        .bind(to_canonical_string(trade.quantity))
        .bind(&trade.strategy)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Move a pending trade to its terminal status.
    ///
    /// Only `status` and `tx_ref` change on the trade row, and only while it
    /// is pending. A realized fill is inserted into `trade_fills` in the same
    /// transaction.
    ///
    /// # Errors
    /// `RepoError::TradeNotPending` if the trade is unknown or already terminal.
    pub async fn finish_trade(&self, id: i64, outcome: &TradeOutcome) -> Result<(), RepoError> {
        if !outcome.status.is_terminal() {
            return Err(RepoError::TradeNotPending(id));
        }

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE trades
            SET status = ?, tx_ref = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(outcome.status.as_str())
        .bind(&outcome.tx_ref)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepoError::TradeNotPending(id));
        }

        if let (Some(quantity), Some(price)) = (outcome.quantity, outcome.price_usd) {
            sqlx::query("INSERT INTO trade_fills (trade_id, quantity, price_usd) VALUES (?, ?, ?)")
                .bind(id)
                .bind(to_canonical_string(quantity))
                .bind(to_canonical_string(price))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_trade(&self, id: i64) -> Result<Option<Trade>, RepoError> {
        let sql = format!("{} WHERE t.id = ?", TRADE_SELECT);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(trade_from_row).transpose()
    }

    /// Most recent trades, newest first.
    pub async fn recent_trades(&self, limit: u32) -> Result<Vec<Trade>, RepoError> {
        let sql = format!(
            "{} ORDER BY t.timestamp_ms DESC, t.id DESC LIMIT ?",
            TRADE_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(trade_from_row).collect()
    }

    pub async fn count_trades(&self) -> Result<i64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trades")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Per-strategy aggregates over the whole ledger, ordered by strategy name.
    pub async fn strategy_stats(&self) -> Result<Vec<StrategyStats>, RepoError> {
        let rows = sqlx::query(
            "SELECT t.side AS side, t.status AS status, t.strategy AS strategy, \
             f.quantity AS filled_quantity, f.price_usd AS price_usd \
             FROM trades t LEFT JOIN trade_fills f ON f.trade_id = t.id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_strategy: BTreeMap<String, StatsAccumulator> = BTreeMap::new();
        for row in &rows {
            let strategy: String = row.get("strategy");
            let acc = by_strategy.entry(strategy).or_default();
            let side = Side::parse(row.get::<String, _>("side").as_str());
            let status = TradeStatus::parse(row.get::<String, _>("status").as_str());
            let fill = row
                .get::<Option<String>, _>("filled_quantity")
                .zip(row.get::<Option<String>, _>("price_usd"))
                .map(|(q, p)| (parse_or_zero(&q), parse_or_zero(&p)));

            acc.total += 1;
            match side {
                Some(Side::Buy) => acc.buys += 1,
                Some(Side::Sell) => acc.sells += 1,
                None => {}
            }
            match status {
                Some(TradeStatus::Executed) => {
                    acc.executed += 1;
                    if let Some((quantity, price)) = fill {
                        acc.volume_usd += quantity * price;
                        if side == Some(Side::Buy) {
                            acc.entry_price_sum += price;
                            acc.entry_count += 1;
                        }
                    }
                }
                Some(TradeStatus::Failed) => acc.failed += 1,
                _ => {}
            }
        }

        let open_rows = sqlx::query("SELECT strategy, COUNT(*) AS n FROM positions GROUP BY strategy")
            .fetch_all(&self.pool)
            .await?;
        for row in &open_rows {
            let strategy: String = row.get("strategy");
            by_strategy.entry(strategy).or_default().open_positions = row.get("n");
        }

        Ok(by_strategy
            .into_iter()
            .map(|(strategy, acc)| acc.finish(strategy))
            .collect())
    }
}

#[derive(Debug, Default)]
struct StatsAccumulator {
    total: i64,
    buys: i64,
    sells: i64,
    executed: i64,
    failed: i64,
    volume_usd: Decimal,
    entry_price_sum: Decimal,
    entry_count: i64,
    open_positions: i64,
}

impl StatsAccumulator {
    fn finish(self, strategy: String) -> StrategyStats {
        let avg_entry_price = if self.entry_count > 0 {
            self.entry_price_sum / Decimal::from(self.entry_count)
        } else {
            Decimal::ZERO
        };
        StrategyStats {
            strategy,
            total_trades: self.total,
            buy_trades: self.buys,
            sell_trades: self.sells,
            executed_trades: self.executed,
            failed_trades: self.failed,
            success_rate_pct: StrategyStats::compute_success_rate(self.executed, self.total),
            total_volume_usd: self.volume_usd.normalize(),
            avg_entry_price: avg_entry_price.normalize(),
            open_positions: self.open_positions,
        }
    }
}

fn trade_from_row(row: &SqliteRow) -> Result<Trade, RepoError> {
    let side_str: String = row.get("side");
    let status_str: String = row.get("status");
    Ok(Trade {
        id: row.get("id"),
        timestamp: TimeMs::new(row.get("timestamp_ms")),
        side: Side::parse(&side_str).ok_or_else(|| RepoError::Corrupt(format!("side {}", side_str)))?,
        mint: Mint::new(row.get::<String, _>("mint")),
        quantity: parse_or_zero(&row.get::<String, _>("quantity")),
        filled_quantity: row
            .get::<Option<String>, _>("filled_quantity")
            .map(|s| parse_or_zero(&s)),
        price_usd: row
            .get::<Option<String>, _>("price_usd")
            .map(|s| parse_or_zero(&s)),
        tx_ref: row.get("tx_ref"),
        status: TradeStatus::parse(&status_str)
            .ok_or_else(|| RepoError::Corrupt(format!("status {}", status_str)))?,
        strategy: row.get("strategy"),
    })
}
