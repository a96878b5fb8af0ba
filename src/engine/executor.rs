//! Turns buy/sell decisions into trade and position state transitions.
//!
//! Every attempt records a pending trade before any external call and
//! finishes it exactly once. Fills use real quotes in both modes; only
//! dry-run completes them.

use crate::config::TradingConfig;
use crate::datasource::{MarketData, MarketDataError, QuoteRequest};
use crate::db::{RepoError, Repository};
use crate::domain::decimal::{from_raw, to_raw};
use crate::domain::{
    Decimal, Mint, Mode, NewTrade, Position, Side, TimeMs, TradeOutcome, BASE_DECIMALS, WRAPPED_SOL_MINT,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Used when the base-asset reference price cannot be fetched.
pub const FALLBACK_BASE_USD: Decimal = Decimal::ONE_HUNDRED;

/// `tx_ref` recorded on simulated fills.
pub const DRY_RUN_TX_REF: &str = "DRY_RUN";

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("position already exists for {0}")]
    PositionExists(Mint),
    #[error("max open positions reached ({current}/{max})")]
    MaxPositionsReached { current: usize, max: usize },
    #[error("no open position for {0}")]
    PositionNotFound(Mint),
    #[error("market data: {0}")]
    MarketData(#[from] MarketDataError),
    #[error("invalid quote: {0}")]
    InvalidQuote(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("live trading not implemented")]
    LiveTradingNotImplemented,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// A completed buy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyFill {
    pub trade_id: i64,
    pub quantity: Decimal,
    pub entry_price_usd: Decimal,
}

/// A completed sell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellFill {
    pub trade_id: i64,
    pub quantity: Decimal,
    pub proceeds_usd: Decimal,
    pub exit_price_usd: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SellAllSummary {
    pub sold: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct Executor {
    market: Arc<dyn MarketData>,
    repo: Arc<Repository>,
    trading: TradingConfig,
    mode: Mode,
    strategy: String,
}

impl Executor {
    pub fn new(
        market: Arc<dyn MarketData>,
        repo: Arc<Repository>,
        trading: TradingConfig,
        mode: Mode,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            market,
            repo,
            trading,
            mode,
            strategy: strategy.into(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub async fn has_position(&self, mint: &Mint) -> Result<bool, ExecutorError> {
        Ok(self.repo.get_position(mint).await?.is_some())
    }

    /// Open a position in `mint`, spending `max_spend_per_trade` of the base asset.
    pub async fn buy(&self, mint: &Mint, reason: &str) -> Result<BuyFill, ExecutorError> {
        if self.repo.get_position(mint).await?.is_some() {
            return Err(ExecutorError::PositionExists(mint.clone()));
        }
        let current = usize::try_from(self.repo.count_positions().await?).unwrap_or(usize::MAX);
        if current >= self.trading.max_open_positions {
            return Err(ExecutorError::MaxPositionsReached {
                current,
                max: self.trading.max_open_positions,
            });
        }
        let lamports = to_raw(self.trading.max_spend_per_trade, BASE_DECIMALS)
            .filter(|l| *l > 0)
            .ok_or_else(|| ExecutorError::InvalidAmount(self.trading.max_spend_per_trade.to_string()))?;

        info!(mint = %mint.short(), reason, mode = %self.mode, "Preparing to buy");
        let now = TimeMs::now();
        let trade_id = self
            .repo
            .create_trade(&NewTrade {
                timestamp: now,
                side: Side::Buy,
                mint: mint.clone(),
                quantity: self.trading.max_spend_per_trade,
                strategy: self.strategy.clone(),
            })
            .await?;

        let (quantity, spent) = match self.buy_fill(mint, lamports).await {
            Ok(fill) => fill,
            Err(e) => return Err(self.fail(trade_id, mint, e).await),
        };
        let base_usd = self.base_usd().await;
        let Some(price) = (spent * base_usd).checked_div(quantity) else {
            return Err(self
                .fail(trade_id, mint, ExecutorError::InvalidQuote("zero quantity".into()))
                .await);
        };
        info!(mint = %mint.short(), price_usd = %price, tokens = %quantity, "Quote received");

        if self.mode == Mode::Live {
            warn!(mint = %mint.short(), "Live swap execution not implemented");
            return Err(self.fail(trade_id, mint, ExecutorError::LiveTradingNotImplemented).await);
        }

        self.repo
            .finish_trade(trade_id, &TradeOutcome::executed(DRY_RUN_TX_REF, quantity, price))
            .await?;
        self.repo
            .create_position(&Position {
                mint: mint.clone(),
                quantity,
                avg_entry_price_usd: price,
                opened_at: now,
                last_update_at: now,
                strategy: self.strategy.clone(),
            })
            .await?;
        info!(mint = %mint.short(), entry_price = %price, "Position opened");

        Ok(BuyFill {
            trade_id,
            quantity,
            entry_price_usd: price,
        })
    }

    /// Token quantity received and base asset spent, both in UI units.
    async fn buy_fill(&self, mint: &Mint, lamports: u64) -> Result<(Decimal, Decimal), ExecutorError> {
        let quote = self
            .market
            .quote(&QuoteRequest {
                input_mint: Mint::new(WRAPPED_SOL_MINT),
                output_mint: mint.clone(),
                amount: lamports,
                slippage_bps: self.trading.slippage_bps,
            })
            .await?;
        if quote.out_amount == 0 {
            return Err(ExecutorError::InvalidQuote("zero output".into()));
        }
        let decimals = self.market.token_info(mint).await?.decimals;
        debug!(
            mint = %mint.short(),
            in_amount = quote.in_amount,
            out_amount = quote.out_amount,
            price_impact = ?quote.price_impact_pct,
            "Buy quote"
        );
        Ok((
            from_raw(quote.out_amount, decimals),
            from_raw(quote.in_amount, BASE_DECIMALS),
        ))
    }

    /// Close the whole position in `mint`.
    pub async fn sell(&self, mint: &Mint, reason: &str) -> Result<SellFill, ExecutorError> {
        let position = self
            .repo
            .get_position(mint)
            .await?
            .ok_or_else(|| ExecutorError::PositionNotFound(mint.clone()))?;

        info!(mint = %mint.short(), reason, mode = %self.mode, "Executing sell");
        let trade_id = self
            .repo
            .create_trade(&NewTrade {
                timestamp: TimeMs::now(),
                side: Side::Sell,
                mint: mint.clone(),
                quantity: position.quantity,
                strategy: position.strategy.clone(),
            })
            .await?;

        let received = match self.sell_proceeds(&position).await {
            Ok(received) => received,
            Err(e) => return Err(self.fail(trade_id, mint, e).await),
        };
        let proceeds_usd = received * self.base_usd().await;
        let exit_price = proceeds_usd.checked_div(position.quantity).unwrap_or_default();
        info!(
            mint = %mint.short(),
            base_received = %received,
            usd_received = %proceeds_usd,
            pnl_pct = ?position.pnl_pct(exit_price).map(|p| p.round_dp(2)),
            "Sell quote received"
        );

        if self.mode == Mode::Live {
            warn!(mint = %mint.short(), "Live swap execution not implemented");
            return Err(self.fail(trade_id, mint, ExecutorError::LiveTradingNotImplemented).await);
        }

        self.repo
            .finish_trade(
                trade_id,
                &TradeOutcome::executed(DRY_RUN_TX_REF, position.quantity, exit_price),
            )
            .await?;
        self.repo.delete_position(mint).await?;
        info!(mint = %mint.short(), reason, usd_received = %proceeds_usd, "Position closed");

        Ok(SellFill {
            trade_id,
            quantity: position.quantity,
            proceeds_usd,
            exit_price_usd: exit_price,
        })
    }

    /// Base asset received for the full position, in UI units.
    async fn sell_proceeds(&self, position: &Position) -> Result<Decimal, ExecutorError> {
        let decimals = self.market.token_info(&position.mint).await?.decimals;
        let amount = to_raw(position.quantity, decimals)
            .filter(|a| *a > 0)
            .ok_or_else(|| ExecutorError::InvalidAmount(position.quantity.to_string()))?;
        let quote = self
            .market
            .quote(&QuoteRequest {
                input_mint: position.mint.clone(),
                output_mint: Mint::new(WRAPPED_SOL_MINT),
                amount,
                slippage_bps: self.trading.slippage_bps,
            })
            .await?;
        if quote.out_amount == 0 {
            return Err(ExecutorError::InvalidQuote("zero output".into()));
        }
        Ok(from_raw(quote.out_amount, BASE_DECIMALS))
    }

    /// Sell every open position. Individual failures are logged and counted.
    pub async fn sell_all(&self, reason: &str) -> Result<SellAllSummary, ExecutorError> {
        let positions = self.repo.list_positions().await?;
        info!(count = positions.len(), reason, "Selling all positions");

        let mut summary = SellAllSummary::default();
        for position in positions {
            match self.sell(&position.mint, reason).await {
                Ok(_) => summary.sold += 1,
                Err(e) => {
                    error!(mint = %position.mint.short(), error = %e, "Failed to sell position");
                    summary.failed += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn base_usd(&self) -> Decimal {
        match self.market.base_usd_price().await {
            Ok(price) if price > Decimal::ZERO => price,
            Ok(_) => {
                warn!("Base price is zero, using fallback");
                FALLBACK_BASE_USD
            }
            Err(e) => {
                warn!(error = %e, "Failed to get base price, using fallback");
                FALLBACK_BASE_USD
            }
        }
    }

    /// Mark the pending trade failed and hand back the original error.
    async fn fail(&self, trade_id: i64, mint: &Mint, err: ExecutorError) -> ExecutorError {
        error!(mint = %mint.short(), trade_id, error = %err, "Trade failed");
        match self
            .repo
            .finish_trade(trade_id, &TradeOutcome::failed(err.to_string()))
            .await
        {
            Ok(()) => err,
            Err(repo_err) => ExecutorError::Repo(repo_err),
        }
    }
}
