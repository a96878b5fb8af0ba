//! Market data gateway: token metadata, holders, quotes, prices, liquidity.

use crate::domain::{Decimal, Mint, TimeMs};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod mock;
pub mod rpc;
pub mod solana;

pub use mock::MockMarketData;
pub use rpc::RpcClient;
pub use solana::SolanaMarketData;

/// Read-only market lookups used by the rule engine, executor and monitor.
///
/// Implementations handle their own retry/backoff for transient HTTP
/// failures within a single call. Callers never retry.
#[async_trait]
pub trait MarketData: Send + Sync + fmt::Debug {
    /// Mint account metadata (decimals, authorities).
    async fn token_info(&self, mint: &Mint) -> Result<TokenInfo, MarketDataError>;

    /// Holder distribution over all non-empty token accounts.
    async fn holders(&self, mint: &Mint) -> Result<HolderDistribution, MarketDataError>;

    /// Swap quote for `amount` raw units of the input mint.
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, MarketDataError>;

    /// Current USD price for one UI unit of `mint`.
    async fn price_usd(&self, mint: &Mint) -> Result<Decimal, MarketDataError>;

    /// Current USD price of the base asset (SOL).
    async fn base_usd_price(&self) -> Result<Decimal, MarketDataError>;

    /// Time of the oldest known on-chain activity for `mint`.
    async fn first_activity(&self, mint: &Mint) -> Result<TimeMs, MarketDataError>;

    /// Pool liquidity in USD; `None` when no pool is known.
    async fn liquidity_usd(&self, mint: &Mint) -> Result<Option<Decimal>, MarketDataError>;
}

/// Mint account metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub decimals: u32,
    pub has_freeze_authority: bool,
    pub has_mint_authority: bool,
    pub supply: Option<u64>,
}

/// Holder concentration metrics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HolderDistribution {
    pub holder_count: usize,
    pub top_holder_pct: Decimal,
    pub top10_pct: Decimal,
}

impl HolderDistribution {
    /// Build metrics from raw balances. Zero balances are ignored.
    pub fn from_balances(balances: &[u64]) -> Self {
        let mut sorted: Vec<u64> = balances.iter().copied().filter(|b| *b > 0).collect();
        sorted.sort_unstable_by(|a, b| b.cmp(a));

        let total: u128 = sorted.iter().map(|b| *b as u128).sum();
        if total == 0 {
            return Self {
                holder_count: sorted.len(),
                ..Default::default()
            };
        }

        let pct = |amount: u128| -> Decimal {
            let (Ok(part), Ok(whole)) = (
                Decimal::try_from_i128_with_scale(amount as i128, 0),
                Decimal::try_from_i128_with_scale(total as i128, 0),
            ) else {
                return Decimal::ZERO;
            };
            part.checked_mul(Decimal::ONE_HUNDRED)
                .and_then(|v| v.checked_div(whole))
                .unwrap_or_default()
        };

        let top10: u128 = sorted.iter().take(10).map(|b| *b as u128).sum();
        Self {
            holder_count: sorted.len(),
            top_holder_pct: pct(sorted[0] as u128),
            top10_pct: pct(top10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: Mint,
    pub output_mint: Mint,
    /// Raw units of the input mint.
    pub amount: u64,
    pub slippage_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub in_amount: u64,
    pub out_amount: u64,
    pub price_impact_pct: Option<Decimal>,
}

/// Error type for market data lookups.
#[derive(Debug, Clone, Error)]
pub enum MarketDataError {
    /// Network error (e.g., connection timeout, DNS failure)
    #[error("Network error: {0}")]
    Network(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    /// JSON-RPC error object returned by the node
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// Parsing error (invalid JSON or malformed response)
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("No route for {0}")]
    NoRoute(String),
}
