//! Buy-side rule evaluation.
//!
//! Checks run in a fixed order and the first failure ends evaluation, so a
//! rejection always carries exactly one reason. Every lookup failure is a
//! rejection; nothing is retried here.

use crate::config::RulesConfig;
use crate::datasource::{MarketData, QuoteRequest};
use crate::db::{RepoError, Repository};
use crate::domain::{Decimal, Event, Mint, TimeMs, WRAPPED_SOL_MINT};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Raw token units offered in the honeypot sell probe.
pub const HONEYPOT_PROBE_AMOUNT: u64 = 1_000_000;
pub const HONEYPOT_PROBE_SLIPPAGE_BPS: u32 = 500;

/// Whether a rejection can change if the token is looked at again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    Permanent,
    Provisional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    NoMint,
    Blacklisted,
    TokenInfoUnavailable,
    FreezeAuthority,
    MintAuthority,
    HoldersUnavailable,
    TooFewHolders,
    TopHolderConcentration,
    TooOld,
    LiquidityUnavailable,
    LowLiquidity,
    Honeypot,
}

impl RejectCode {
    pub fn kind(&self) -> ReasonKind {
        match self {
            RejectCode::TooFewHolders
            | RejectCode::TopHolderConcentration
            | RejectCode::TooOld
            | RejectCode::LiquidityUnavailable
            | RejectCode::LowLiquidity => ReasonKind::Provisional,
            _ => ReasonKind::Permanent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::NoMint => "no_mint",
            RejectCode::Blacklisted => "blacklisted",
            RejectCode::TokenInfoUnavailable => "token_info_unavailable",
            RejectCode::FreezeAuthority => "freeze_authority",
            RejectCode::MintAuthority => "mint_authority",
            RejectCode::HoldersUnavailable => "holders_unavailable",
            RejectCode::TooFewHolders => "too_few_holders",
            RejectCode::TopHolderConcentration => "top_holder_concentration",
            RejectCode::TooOld => "too_old",
            RejectCode::LiquidityUnavailable => "liquidity_unavailable",
            RejectCode::LowLiquidity => "low_liquidity",
            RejectCode::Honeypot => "honeypot",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reason {
    pub kind: ReasonKind,
    pub code: RejectCode,
    pub message: String,
}

impl Reason {
    pub fn new(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            kind: code.kind(),
            code,
            message: message.into(),
        }
    }

    pub fn is_provisional(&self) -> bool {
        self.kind == ReasonKind::Provisional
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of evaluating one event. `reasons` is empty iff `allow`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allow: bool,
    pub reasons: Vec<Reason>,
}

impl Decision {
    pub fn accept() -> Self {
        Self {
            allow: true,
            reasons: Vec::new(),
        }
    }

    pub fn reject(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            allow: false,
            reasons: vec![Reason::new(code, message)],
        }
    }

    /// The reason that ended evaluation.
    pub fn primary_reason(&self) -> Option<&Reason> {
        self.reasons.first()
    }
}

#[derive(Debug, Clone)]
pub struct RuleEngine {
    market: Arc<dyn MarketData>,
    repo: Arc<Repository>,
    rules: RulesConfig,
}

impl RuleEngine {
    pub fn new(market: Arc<dyn MarketData>, repo: Arc<Repository>, rules: RulesConfig) -> Self {
        Self { market, repo, rules }
    }

    pub fn rules(&self) -> &RulesConfig {
        &self.rules
    }

    /// Evaluate `event` as of `now`.
    ///
    /// Only a repository failure during the blacklist check is returned as
    /// an error; every market lookup failure becomes a rejection.
    pub async fn evaluate(&self, event: &Event, now: TimeMs) -> Result<Decision, RepoError> {
        let decision = self.check(&event.mint, now).await?;
        match decision.primary_reason() {
            Some(reason) => info!(
                mint = %event.mint.short(),
                code = %reason.code,
                reason = %reason.message,
                "Rejected"
            ),
            None => info!(mint = %event.mint.short(), "Passed all checks"),
        }
        Ok(decision)
    }

    async fn check(&self, mint: &Mint, now: TimeMs) -> Result<Decision, RepoError> {
        let rules = &self.rules;

        if mint.is_empty() {
            return Ok(Decision::reject(RejectCode::NoMint, "no mint address"));
        }

        if self.repo.is_blacklisted(mint).await? {
            return Ok(Decision::reject(RejectCode::Blacklisted, "mint is blacklisted"));
        }

        let info = match self.market.token_info(mint).await {
            Ok(info) => info,
            Err(e) => {
                debug!(mint = %mint.short(), error = %e, "Token info lookup failed");
                return Ok(Decision::reject(
                    RejectCode::TokenInfoUnavailable,
                    "failed to fetch token info",
                ));
            }
        };
        if rules.block_freeze_authority && info.has_freeze_authority {
            return Ok(Decision::reject(RejectCode::FreezeAuthority, "has freeze authority"));
        }
        if !rules.allow_mint_authority && info.has_mint_authority {
            return Ok(Decision::reject(RejectCode::MintAuthority, "has mint authority"));
        }

        let holders = match self.market.holders(mint).await {
            Ok(h) => h,
            Err(e) => {
                debug!(mint = %mint.short(), error = %e, "Holder lookup failed");
                return Ok(Decision::reject(
                    RejectCode::HoldersUnavailable,
                    "failed to fetch holders",
                ));
            }
        };
        if holders.holder_count < rules.min_holders {
            return Ok(Decision::reject(
                RejectCode::TooFewHolders,
                format!("holders: {} < {}", holders.holder_count, rules.min_holders),
            ));
        }
        if holders.top_holder_pct > rules.dev_wallet_max_pct {
            return Ok(Decision::reject(
                RejectCode::TopHolderConcentration,
                format!(
                    "top holder: {:.1}% > {:.1}%",
                    holders.top_holder_pct, rules.dev_wallet_max_pct
                ),
            ));
        }

        if rules.max_mint_age_sec > 0 {
            match self.market.first_activity(mint).await {
                Ok(first) => {
                    let age = now.since(first).as_secs();
                    if age > rules.max_mint_age_sec {
                        return Ok(Decision::reject(RejectCode::TooOld, format!("too old: {}s", age)));
                    }
                }
                Err(e) => debug!(mint = %mint.short(), error = %e, "Age lookup failed, skipping age check"),
            }
        }

        if rules.min_liquidity_usd > Decimal::ZERO {
            match self.market.liquidity_usd(mint).await {
                Ok(Some(liquidity)) if liquidity < rules.min_liquidity_usd => {
                    return Ok(Decision::reject(
                        RejectCode::LowLiquidity,
                        format!("liquidity: ${:.2} < ${:.2}", liquidity, rules.min_liquidity_usd),
                    ));
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    return Ok(Decision::reject(RejectCode::LiquidityUnavailable, "liquidity: unavailable"));
                }
                Err(e) => {
                    debug!(mint = %mint.short(), error = %e, "Liquidity lookup failed");
                    return Ok(Decision::reject(RejectCode::LiquidityUnavailable, "liquidity: unavailable"));
                }
            }
        }

        if let Some(detail) = self.honeypot_probe(mint).await {
            return Ok(Decision::reject(
                RejectCode::Honeypot,
                format!("honeypot detected: {}", detail),
            ));
        }

        Ok(Decision::accept())
    }

    /// Ask for a reverse quote. `Some(detail)` when the token looks unsellable.
    async fn honeypot_probe(&self, mint: &Mint) -> Option<&'static str> {
        let request = QuoteRequest {
            input_mint: mint.clone(),
            output_mint: Mint::new(WRAPPED_SOL_MINT),
            amount: HONEYPOT_PROBE_AMOUNT,
            slippage_bps: HONEYPOT_PROBE_SLIPPAGE_BPS,
        };
        match self.market.quote(&request).await {
            Ok(quote) if quote.out_amount == 0 => Some("zero output on sell"),
            Ok(quote) => {
                debug!(mint = %mint.short(), out_amount = quote.out_amount, "Honeypot check passed");
                None
            }
            Err(e) => {
                debug!(mint = %mint.short(), error = %e, "Sell probe failed");
                Some("cannot get sell quote")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{MockMarketData, TokenInfo};
    use crate::db::repo::test_support::temp_repo;
    use crate::domain::EventType;
    use tempfile::TempDir;

    fn rules() -> RulesConfig {
        RulesConfig {
            min_liquidity_usd: Decimal::from(3000),
            max_mint_age_sec: 300,
            min_holders: 5,
            dev_wallet_max_pct: Decimal::from(40),
            block_freeze_authority: true,
            allow_mint_authority: false,
        }
    }

    fn event(mint: &str) -> Event {
        Event::new(Mint::new(mint), EventType::NewPool, TimeMs::new(0), "{}".into())
    }

    async fn engine(mock: MockMarketData) -> (TempDir, Arc<Repository>, RuleEngine) {
        let (dir, repo) = temp_repo().await;
        let repo = Arc::new(repo);
        let engine = RuleEngine::new(Arc::new(mock), repo.clone(), rules());
        (dir, repo, engine)
    }

    async fn first_reason(engine: &RuleEngine, mint: &str) -> Reason {
        let decision = engine.evaluate(&event(mint), TimeMs::new(1_000_000)).await.unwrap();
        assert!(!decision.allow);
        assert_eq!(decision.reasons.len(), 1);
        decision.reasons[0].clone()
    }

    #[tokio::test]
    async fn test_safe_token_allowed() {
        let (_dir, _repo, engine) = engine(MockMarketData::new().with_safe_token("m1")).await;
        let decision = engine.evaluate(&event("m1"), TimeMs::new(1_000_000)).await.unwrap();
        assert_eq!(decision, Decision::accept());
    }

    #[tokio::test]
    async fn test_missing_mint() {
        let (_dir, _repo, engine) = engine(MockMarketData::new()).await;
        let reason = first_reason(&engine, "").await;
        assert_eq!(reason.code, RejectCode::NoMint);
        assert_eq!(reason.message, "no mint address");
        assert_eq!(reason.kind, ReasonKind::Permanent);
    }

    #[tokio::test]
    async fn test_blacklist_short_circuits_lookups() {
        let mock = Arc::new(MockMarketData::new().with_safe_token("m1"));
        let (_dir, repo) = temp_repo().await;
        let repo = Arc::new(repo);
        repo.add_to_blacklist(&Mint::new("m1")).await.unwrap();
        let engine = RuleEngine::new(mock.clone(), repo, rules());

        let reason = first_reason(&engine, "m1").await;
        assert_eq!(reason.message, "mint is blacklisted");
        assert_eq!(mock.call_count("token_info"), 0);
    }

    #[tokio::test]
    async fn test_authorities() {
        let mock = MockMarketData::new()
            .with_safe_token("frozen")
            .with_token("frozen", TokenInfo {
                decimals: 6,
                has_freeze_authority: true,
                has_mint_authority: true,
                supply: None,
            })
            .with_safe_token("mintable")
            .with_token("mintable", TokenInfo {
                decimals: 6,
                has_freeze_authority: false,
                has_mint_authority: true,
                supply: None,
            });
        let (_dir, _repo, engine) = engine(mock).await;

        assert_eq!(first_reason(&engine, "frozen").await.message, "has freeze authority");
        let reason = first_reason(&engine, "mintable").await;
        assert_eq!(reason.message, "has mint authority");
        assert_eq!(reason.kind, ReasonKind::Permanent);
    }

    #[tokio::test]
    async fn test_unknown_token_is_permanent() {
        let (_dir, _repo, engine) = engine(MockMarketData::new()).await;
        let reason = first_reason(&engine, "ghost").await;
        assert_eq!(reason.message, "failed to fetch token info");
        assert_eq!(reason.kind, ReasonKind::Permanent);
    }

    #[tokio::test]
    async fn test_holder_checks_are_provisional() {
        let mock = MockMarketData::new()
            .with_safe_token("thin")
            .with_holders("thin", 3, Decimal::from(10))
            .with_safe_token("whale")
            .with_holders("whale", 10, Decimal::new(455, 1));
        let (_dir, _repo, engine) = engine(mock).await;

        let reason = first_reason(&engine, "thin").await;
        assert_eq!(reason.message, "holders: 3 < 5");
        assert!(reason.is_provisional());

        let reason = first_reason(&engine, "whale").await;
        assert_eq!(reason.message, "top holder: 45.5% > 40.0%");
        assert_eq!(reason.code, RejectCode::TopHolderConcentration);
    }

    #[tokio::test]
    async fn test_age_check() {
        let mock = MockMarketData::new()
            .with_safe_token("old")
            .with_first_activity("old", TimeMs::new(0));
        let (_dir, _repo, engine) = engine(mock).await;

        let reason = first_reason(&engine, "old").await;
        assert_eq!(reason.message, "too old: 1000s");
        assert!(reason.is_provisional());

        // Within the limit.
        let decision = engine.evaluate(&event("old"), TimeMs::new(200_000)).await.unwrap();
        assert!(decision.allow);
    }

    #[tokio::test]
    async fn test_liquidity_checks() {
        let mock = MockMarketData::new()
            .with_safe_token("shallow")
            .with_liquidity("shallow", Decimal::from(1500));
        let (_dir, _repo, engine) = engine(mock).await;
        let reason = first_reason(&engine, "shallow").await;
        assert_eq!(reason.message, "liquidity: $1500.00 < $3000.00");
        assert_eq!(reason.code, RejectCode::LowLiquidity);
        assert!(reason.is_provisional());
    }

    #[tokio::test]
    async fn test_liquidity_disabled_when_zero() {
        let (dir, repo) = temp_repo().await;
        let mut rules = rules();
        rules.min_liquidity_usd = Decimal::ZERO;
        let mock = Arc::new(MockMarketData::new().with_safe_token("m1"));
        let engine = RuleEngine::new(mock.clone(), Arc::new(repo), rules);

        assert!(engine.evaluate(&event("m1"), TimeMs::new(0)).await.unwrap().allow);
        assert_eq!(mock.call_count("liquidity_usd"), 0);
        drop(dir);
    }

    #[tokio::test]
    async fn test_honeypot_detection() {
        let mock = MockMarketData::new()
            .with_safe_token("trap")
            .with_sell_quote("trap", 0)
            .with_safe_token("noroute");
        mock.remove_sell_quote("noroute");
        let (_dir, _repo, engine) = engine(mock).await;

        let reason = first_reason(&engine, "trap").await;
        assert_eq!(reason.message, "honeypot detected: zero output on sell");
        assert_eq!(reason.kind, ReasonKind::Permanent);
        assert_eq!(
            first_reason(&engine, "noroute").await.message,
            "honeypot detected: cannot get sell quote"
        );
    }

    #[tokio::test]
    async fn test_evaluation_is_deterministic() {
        let mock = MockMarketData::new()
            .with_safe_token("m1")
            .with_holders("m1", 4, Decimal::from(5));
        let (_dir, _repo, engine) = engine(mock).await;
        let now = TimeMs::new(5_000);
        let a = engine.evaluate(&event("m1"), now).await.unwrap();
        let b = engine.evaluate(&event("m1"), now).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reason_kinds() {
        assert_eq!(RejectCode::LiquidityUnavailable.kind(), ReasonKind::Provisional);
        assert_eq!(RejectCode::HoldersUnavailable.kind(), ReasonKind::Permanent);
        assert_eq!(RejectCode::Honeypot.as_str(), "honeypot");
    }
}
