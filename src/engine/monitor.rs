//! Periodic sweep of open positions for exit conditions.

use super::executor::Executor;
use super::exits::{duration_exceeded, price_exit, ExitReason};
use crate::config::RiskConfig;
use crate::datasource::MarketData;
use crate::db::{RepoError, Repository};
use crate::domain::{Decimal, Mint, TimeMs};
use crate::shutdown::cancelled;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// A sell the sweep completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitAction {
    pub mint: Mint,
    pub reason: ExitReason,
}

#[derive(Debug, Clone)]
pub struct PositionMonitor {
    repo: Arc<Repository>,
    market: Arc<dyn MarketData>,
    executor: Arc<Executor>,
    risk: RiskConfig,
    interval: Duration,
}

impl PositionMonitor {
    pub fn new(
        repo: Arc<Repository>,
        market: Arc<dyn MarketData>,
        executor: Arc<Executor>,
        risk: RiskConfig,
        interval: Duration,
    ) -> Self {
        Self {
            repo,
            market,
            executor,
            risk,
            interval,
        }
    }

    /// Check every open position once. One position's failure never stops
    /// the sweep; only the initial listing can fail.
    pub async fn sweep(&self, now: TimeMs) -> Result<Vec<ExitAction>, RepoError> {
        let positions = self.repo.list_positions().await?;
        if positions.is_empty() {
            return Ok(Vec::new());
        }
        debug!(positions = positions.len(), "Checking positions");

        let mut exits = Vec::new();
        for position in positions {
            let reason = if duration_exceeded(&position, now, &self.risk) {
                info!(
                    mint = %position.mint.short(),
                    age_secs = position.age(now).as_secs(),
                    max_secs = self.risk.max_trade_duration_sec,
                    "Position exceeded max duration"
                );
                ExitReason::MaxDurationExceeded
            } else {
                let price = match self.market.price_usd(&position.mint).await {
                    Ok(p) if p > Decimal::ZERO => p,
                    Ok(_) => {
                        debug!(mint = %position.mint.short(), "Price is zero, skipping");
                        continue;
                    }
                    Err(e) => {
                        debug!(mint = %position.mint.short(), error = %e, "Failed to get price");
                        continue;
                    }
                };
                debug!(
                    mint = %position.mint.short(),
                    entry_price = %position.avg_entry_price_usd,
                    current_price = %price,
                    pnl_pct = ?position.pnl_pct(price).map(|p| p.round_dp(2)),
                    "Price check"
                );
                match price_exit(&position, price, &self.risk) {
                    Some(reason) => {
                        info!(mint = %position.mint.short(), %reason, "Exit triggered");
                        reason
                    }
                    None => continue,
                }
            };

            match self.executor.sell(&position.mint, reason.as_str()).await {
                Ok(_) => exits.push(ExitAction {
                    mint: position.mint,
                    reason,
                }),
                Err(e) => error!(mint = %position.mint.short(), error = %e, "Failed to sell position"),
            }
        }
        Ok(exits)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Starting position monitor");
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancelled(&mut shutdown) => {
                    info!("Position monitor shutting down");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep(TimeMs::now()).await {
                        error!(error = %e, "Failed to check positions");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradingConfig;
    use crate::datasource::MockMarketData;
    use crate::db::repo::test_support::temp_repo;
    use crate::domain::{Mode, Position, Side, TradeStatus};
    use std::str::FromStr;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        repo: Arc<Repository>,
        mock: Arc<MockMarketData>,
        monitor: PositionMonitor,
    }

    async fn fixture(mock: MockMarketData) -> Fixture {
        let (dir, repo) = temp_repo().await;
        let repo = Arc::new(repo);
        let mock = Arc::new(mock);
        let trading = TradingConfig {
            max_spend_per_trade: Decimal::from_str("0.2").unwrap(),
            max_open_positions: 5,
            slippage_bps: 400,
            priority_fee_micro_lamports: 0,
        };
        let executor = Arc::new(Executor::new(mock.clone(), repo.clone(), trading, Mode::DryRun, "snipe_flip"));
        let risk = RiskConfig {
            stop_loss_pct: Decimal::from(8),
            take_profit_pct: Decimal::from(18),
            max_trade_duration_sec: 240,
        };
        let monitor = PositionMonitor::new(repo.clone(), mock.clone(), executor, risk, Duration::from_secs(5));
        Fixture {
            _dir: dir,
            repo,
            mock,
            monitor,
        }
    }

    async fn open(repo: &Repository, mint: &str, opened_at: TimeMs) {
        repo.create_position(&Position {
            mint: Mint::new(mint),
            quantity: Decimal::from(20),
            avg_entry_price_usd: Decimal::ONE,
            opened_at,
            last_update_at: opened_at,
            strategy: "snipe_flip".into(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_take_profit_exit() {
        let mock = MockMarketData::new()
            .with_safe_token("m1")
            .with_price("m1", Decimal::from_str("1.20").unwrap());
        let f = fixture(mock).await;
        open(&f.repo, "m1", TimeMs::new(0)).await;

        let exits = f.monitor.sweep(TimeMs::new(60_000)).await.unwrap();
        assert_eq!(
            exits,
            vec![ExitAction {
                mint: Mint::new("m1"),
                reason: ExitReason::TakeProfit
            }]
        );
        assert_eq!(f.repo.count_positions().await.unwrap(), 0);
        let trade = &f.repo.recent_trades(1).await.unwrap()[0];
        assert_eq!((trade.side, trade.status), (Side::Sell, TradeStatus::Executed));
    }

    #[tokio::test]
    async fn test_max_duration_skips_price_lookup() {
        let f = fixture(MockMarketData::new().with_safe_token("m1")).await;
        open(&f.repo, "m1", TimeMs::new(0)).await;

        let exits = f.monitor.sweep(TimeMs::new(300_000)).await.unwrap();
        assert_eq!(exits[0].reason, ExitReason::MaxDurationExceeded);
        assert_eq!(f.mock.call_count("price_usd"), 0);
    }

    #[tokio::test]
    async fn test_stop_loss_and_hold() {
        let mock = MockMarketData::new()
            .with_safe_token("down")
            .with_price("down", Decimal::from_str("0.90").unwrap())
            .with_safe_token("flat")
            .with_price("flat", Decimal::from_str("1.02").unwrap());
        let f = fixture(mock).await;
        open(&f.repo, "down", TimeMs::new(0)).await;
        open(&f.repo, "flat", TimeMs::new(0)).await;

        let exits = f.monitor.sweep(TimeMs::new(10_000)).await.unwrap();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].mint, Mint::new("down"));
        assert_eq!(exits[0].reason, ExitReason::StopLoss);
        assert!(f.repo.get_position(&Mint::new("flat")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_sweep() {
        let mock = MockMarketData::new()
            .with_safe_token("noprice")
            .with_safe_token("stuck")
            .with_price("stuck", Decimal::from(2))
            .with_safe_token("good")
            .with_price("good", Decimal::from(2));
        let f = fixture(mock).await;
        f.mock.set_price("noprice", Decimal::ZERO);
        f.mock.remove_sell_quote("stuck");
        open(&f.repo, "noprice", TimeMs::new(0)).await;
        open(&f.repo, "stuck", TimeMs::new(0)).await;
        open(&f.repo, "good", TimeMs::new(0)).await;

        let exits = f.monitor.sweep(TimeMs::new(10_000)).await.unwrap();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].mint, Mint::new("good"));
        assert_eq!(f.repo.count_positions().await.unwrap(), 2);
    }
}
