//! Mock market data for testing without network calls.

use super::{HolderDistribution, MarketData, MarketDataError, Quote, QuoteRequest, TokenInfo};
use crate::domain::{Decimal, Mint, TimeMs, WRAPPED_SOL_MINT};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Mock gateway returning predefined data.
///
/// Anything not configured behaves like an unavailable lookup, except
/// liquidity which reports "no pool" (`Ok(None)`). State can be changed
/// after construction so tests can model a token maturing over time.
#[derive(Debug, Default)]
pub struct MockMarketData {
    state: RwLock<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    tokens: HashMap<Mint, TokenInfo>,
    holders: HashMap<Mint, HolderDistribution>,
    prices: HashMap<Mint, Decimal>,
    base_price: Option<Decimal>,
    first_activity: HashMap<Mint, TimeMs>,
    liquidity: HashMap<Mint, Decimal>,
    buy_out: HashMap<Mint, u64>,
    sell_out: HashMap<Mint, u64>,
    calls: HashMap<&'static str, usize>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MockState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MockState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: &'static str) {
        *self.write().calls.entry(call).or_default() += 1;
    }

    /// A token that passes every rule: no authorities, 10 evenly spread
    /// holders, $50k of liquidity, sellable, priced at $1.
    pub fn with_safe_token(self, mint: &str) -> Self {
        self.with_token(mint, TokenInfo {
            decimals: 6,
            has_freeze_authority: false,
            has_mint_authority: false,
            supply: Some(1_000_000_000),
        })
        .with_holders(mint, 10, Decimal::from(10))
        .with_liquidity(mint, Decimal::from(50_000))
        .with_buy_quote(mint, 20_000_000)
        .with_sell_quote(mint, 200_000_000)
        .with_price(mint, Decimal::ONE)
    }

    pub fn with_token(self, mint: &str, info: TokenInfo) -> Self {
        self.write().tokens.insert(Mint::new(mint), info);
        self
    }

    pub fn with_holders(self, mint: &str, count: usize, top_holder_pct: Decimal) -> Self {
        self.set_holders(mint, count, top_holder_pct);
        self
    }

    pub fn with_price(self, mint: &str, price: Decimal) -> Self {
        self.set_price(mint, price);
        self
    }

    pub fn with_base_price(self, price: Decimal) -> Self {
        self.write().base_price = Some(price);
        self
    }

    pub fn with_first_activity(self, mint: &str, at: TimeMs) -> Self {
        self.write().first_activity.insert(Mint::new(mint), at);
        self
    }

    pub fn with_liquidity(self, mint: &str, usd: Decimal) -> Self {
        self.write().liquidity.insert(Mint::new(mint), usd);
        self
    }

    /// Output (raw token units) for a base -> mint quote.
    pub fn with_buy_quote(self, mint: &str, out_amount: u64) -> Self {
        self.write().buy_out.insert(Mint::new(mint), out_amount);
        self
    }

    /// Output (lamports) for a mint -> base quote. Zero models a honeypot.
    pub fn with_sell_quote(self, mint: &str, out_amount: u64) -> Self {
        self.set_sell_quote(mint, out_amount);
        self
    }

    pub fn set_holders(&self, mint: &str, count: usize, top_holder_pct: Decimal) {
        self.write().holders.insert(
            Mint::new(mint),
            HolderDistribution {
                holder_count: count,
                top_holder_pct,
                top10_pct: top_holder_pct,
            },
        );
    }

    pub fn set_price(&self, mint: &str, price: Decimal) {
        self.write().prices.insert(Mint::new(mint), price);
    }

    pub fn set_sell_quote(&self, mint: &str, out_amount: u64) {
        self.write().sell_out.insert(Mint::new(mint), out_amount);
    }

    pub fn remove_sell_quote(&self, mint: &str) {
        self.write().sell_out.remove(&Mint::new(mint));
    }

    /// Number of times `call` (a trait method name) was invoked.
    pub fn call_count(&self, call: &str) -> usize {
        self.read().calls.get(call).copied().unwrap_or(0)
    }
}

#[async_trait]
impl MarketData for MockMarketData {
    async fn token_info(&self, mint: &Mint) -> Result<TokenInfo, MarketDataError> {
        self.record("token_info");
        self.read()
            .tokens
            .get(mint)
            .cloned()
            .ok_or_else(|| MarketDataError::NotFound(mint.to_string()))
    }

    async fn holders(&self, mint: &Mint) -> Result<HolderDistribution, MarketDataError> {
        self.record("holders");
        self.read()
            .holders
            .get(mint)
            .cloned()
            .ok_or_else(|| MarketDataError::NotFound(mint.to_string()))
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, MarketDataError> {
        self.record("quote");
        let state = self.read();
        let out = if request.input_mint.as_str() == WRAPPED_SOL_MINT {
            state.buy_out.get(&request.output_mint)
        } else {
            state.sell_out.get(&request.input_mint)
        };
        match out {
            Some(out_amount) => Ok(Quote {
                in_amount: request.amount,
                out_amount: *out_amount,
                price_impact_pct: None,
            }),
            None => Err(MarketDataError::NoRoute(request.input_mint.short())),
        }
    }

    async fn price_usd(&self, mint: &Mint) -> Result<Decimal, MarketDataError> {
        self.record("price_usd");
        self.read()
            .prices
            .get(mint)
            .copied()
            .ok_or_else(|| MarketDataError::NotFound(mint.to_string()))
    }

    async fn base_usd_price(&self) -> Result<Decimal, MarketDataError> {
        self.record("base_usd_price");
        self.read()
            .base_price
            .ok_or_else(|| MarketDataError::NotFound("base price".to_string()))
    }

    async fn first_activity(&self, mint: &Mint) -> Result<TimeMs, MarketDataError> {
        self.record("first_activity");
        self.read()
            .first_activity
            .get(mint)
            .copied()
            .ok_or_else(|| MarketDataError::NotFound(mint.to_string()))
    }

    async fn liquidity_usd(&self, mint: &Mint) -> Result<Option<Decimal>, MarketDataError> {
        self.record("liquidity_usd");
        Ok(self.read().liquidity.get(mint).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_safe_token() {
        let mock = MockMarketData::new().with_safe_token("m1");
        let mint = Mint::new("m1");
        let info = mock.token_info(&mint).await.unwrap();
        assert_eq!(info.decimals, 6);
        assert_eq!(mock.holders(&mint).await.unwrap().holder_count, 10);
        assert_eq!(mock.price_usd(&mint).await.unwrap(), Decimal::ONE);
        assert_eq!(mock.call_count("token_info"), 1);
    }

    #[tokio::test]
    async fn test_mock_quote_direction() {
        let mock = MockMarketData::new()
            .with_buy_quote("m1", 42)
            .with_sell_quote("m1", 7);
        let buy = mock
            .quote(&QuoteRequest {
                input_mint: Mint::new(WRAPPED_SOL_MINT),
                output_mint: Mint::new("m1"),
                amount: 100,
                slippage_bps: 50,
            })
            .await
            .unwrap();
        assert_eq!((buy.in_amount, buy.out_amount), (100, 42));

        let sell = mock
            .quote(&QuoteRequest {
                input_mint: Mint::new("m1"),
                output_mint: Mint::new(WRAPPED_SOL_MINT),
                amount: 5,
                slippage_bps: 50,
            })
            .await
            .unwrap();
        assert_eq!(sell.out_amount, 7);
    }

    #[tokio::test]
    async fn test_mock_unconfigured_lookups() {
        let mock = MockMarketData::new();
        let mint = Mint::new("nope");
        assert!(matches!(mock.token_info(&mint).await, Err(MarketDataError::NotFound(_))));
        assert!(mock.base_usd_price().await.is_err());
        assert_eq!(mock.liquidity_usd(&mint).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mock_mutation_after_build() {
        let mock = MockMarketData::new().with_holders("m1", 3, Decimal::from(20));
        mock.set_holders("m1", 6, Decimal::from(15));
        let holders = mock.holders(&Mint::new("m1")).await.unwrap();
        assert_eq!(holders.holder_count, 6);
    }
}
