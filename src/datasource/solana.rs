//! Production gateway: Solana RPC, Jupiter quote/price APIs and DexScreener.

use super::{HolderDistribution, MarketData, MarketDataError, Quote, QuoteRequest, RpcClient, TokenInfo};
use crate::config::SolanaConfig;
use crate::domain::decimal::from_raw;
use crate::domain::{Decimal, Mint, TimeMs, WRAPPED_SOL_MINT};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// USDC mint, used to derive a price from a quote when the price API has none.
const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
const USDC_DECIMALS: u32 = 6;

/// Upper bound on signatures scanned when looking for a mint's first activity.
const FIRST_ACTIVITY_SCAN_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct SolanaEndpoints {
    pub rpc_url: String,
    pub jupiter_quote_url: String,
    pub jupiter_price_url: String,
    pub dexscreener_url: String,
    pub request_timeout: Duration,
}

impl Default for SolanaEndpoints {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            jupiter_quote_url: "https://quote-api.jup.ag/v6".to_string(),
            jupiter_price_url: "https://api.jup.ag/price/v2".to_string(),
            dexscreener_url: "https://api.dexscreener.com/token-pairs/v1/solana".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&SolanaConfig> for SolanaEndpoints {
    fn from(config: &SolanaConfig) -> Self {
        Self {
            rpc_url: config.rpc_url.clone(),
            jupiter_quote_url: config.jupiter_quote_url.clone(),
            jupiter_price_url: config.jupiter_price_url.clone(),
            dexscreener_url: config.dexscreener_url.clone(),
            request_timeout: config.request_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolanaMarketData {
    rpc: RpcClient,
    http: Client,
    endpoints: SolanaEndpoints,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JupiterQuote {
    in_amount: String,
    out_amount: String,
    #[serde(default)]
    price_impact_pct: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DexScreenerPair {
    #[serde(default)]
    liquidity: Option<DexScreenerLiquidity>,
}

#[derive(Debug, Deserialize)]
struct DexScreenerLiquidity {
    #[serde(default)]
    usd: Option<f64>,
}

impl SolanaMarketData {
    pub fn new(endpoints: SolanaEndpoints) -> Self {
        let http = Client::builder()
            .timeout(endpoints.request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            rpc: RpcClient::new(endpoints.rpc_url.clone(), endpoints.request_timeout),
            http,
            endpoints,
        }
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    async fn get_json(&self, url: &str) -> Result<Value, MarketDataError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(5)),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(MarketDataError::Network(e.to_string())))?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(MarketDataError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(MarketDataError::Http {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(backoff::Error::permanent(MarketDataError::Http {
                    status: status.as_u16(),
                    message,
                }));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| backoff::Error::permanent(MarketDataError::Parse(e.to_string())))
        })
        .await
    }

    async fn price_via_quote(&self, mint: &Mint) -> Result<Decimal, MarketDataError> {
        let info = self.token_info(mint).await?;
        let one_token = 10u64
            .checked_pow(info.decimals)
            .ok_or_else(|| MarketDataError::Parse(format!("decimals {} out of range", info.decimals)))?;
        let quote = self
            .quote(&QuoteRequest {
                input_mint: mint.clone(),
                output_mint: Mint::new(USDC_MINT),
                amount: one_token,
                slippage_bps: 100,
            })
            .await?;
        Ok(from_raw(quote.out_amount, USDC_DECIMALS))
    }
}

#[async_trait]
impl MarketData for SolanaMarketData {
    async fn token_info(&self, mint: &Mint) -> Result<TokenInfo, MarketDataError> {
        debug!(mint = %mint.short(), "Fetching token info");
        let account = self
            .rpc
            .get_account_info_parsed(mint.as_str())
            .await?
            .ok_or_else(|| MarketDataError::NotFound(format!("mint account {}", mint)))?;
        parse_mint_account(&account)
    }

    async fn holders(&self, mint: &Mint) -> Result<HolderDistribution, MarketDataError> {
        let balances = self.rpc.token_account_balances(mint.as_str()).await?;
        Ok(HolderDistribution::from_balances(&balances))
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, MarketDataError> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.endpoints.jupiter_quote_url,
            request.input_mint,
            request.output_mint,
            request.amount,
            request.slippage_bps
        );
        let body = match self.get_json(&url).await {
            Ok(body) => body,
            Err(MarketDataError::Http { status: 400, message }) if message.contains("ROUTE") => {
                return Err(MarketDataError::NoRoute(request.input_mint.short()))
            }
            Err(e) => return Err(e),
        };
        parse_quote(body)
    }

    async fn price_usd(&self, mint: &Mint) -> Result<Decimal, MarketDataError> {
        let url = format!("{}?ids={}", self.endpoints.jupiter_price_url, mint);
        match self.get_json(&url).await {
            Ok(body) => match parse_price(&body, mint.as_str()) {
                Some(price) => return Ok(price),
                None => debug!(mint = %mint.short(), "Price API has no entry, falling back to quote"),
            },
            Err(e) => warn!(mint = %mint.short(), error = %e, "Price API failed, falling back to quote"),
        }
        self.price_via_quote(mint).await
    }

    async fn base_usd_price(&self) -> Result<Decimal, MarketDataError> {
        self.price_usd(&Mint::new(WRAPPED_SOL_MINT)).await
    }

    async fn first_activity(&self, mint: &Mint) -> Result<TimeMs, MarketDataError> {
        let signatures = self
            .rpc
            .get_signatures_for_address(mint.as_str(), None, FIRST_ACTIVITY_SCAN_LIMIT)
            .await?;
        // Newest first; the oldest entry with a block time wins.
        match signatures.iter().rev().find_map(|s| s.block_time) {
            Some(secs) => Ok(TimeMs::new(secs.saturating_mul(1000))),
            None => Ok(TimeMs::now()),
        }
    }

    async fn liquidity_usd(&self, mint: &Mint) -> Result<Option<Decimal>, MarketDataError> {
        let url = format!("{}/{}", self.endpoints.dexscreener_url, mint);
        let body = self.get_json(&url).await?;
        let pairs: Vec<DexScreenerPair> =
            serde_json::from_value(body).map_err(|e| MarketDataError::Parse(e.to_string()))?;
        Ok(best_liquidity(&pairs))
    }
}

fn parse_mint_account(account: &Value) -> Result<TokenInfo, MarketDataError> {
    let info = account
        .pointer("/data/parsed/info")
        .ok_or_else(|| MarketDataError::Parse("account is not a parsed mint".to_string()))?;
    let decimals = info
        .get("decimals")
        .and_then(Value::as_u64)
        .ok_or_else(|| MarketDataError::Parse("Missing decimals field".to_string()))?;
    let authority_set = |field: &str| info.get(field).map_or(false, |v| !v.is_null());

    Ok(TokenInfo {
        decimals: decimals as u32,
        has_freeze_authority: authority_set("freezeAuthority"),
        has_mint_authority: authority_set("mintAuthority"),
        supply: info
            .get("supply")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok()),
    })
}

fn parse_quote(body: Value) -> Result<Quote, MarketDataError> {
    let quote: JupiterQuote =
        serde_json::from_value(body).map_err(|e| MarketDataError::Parse(e.to_string()))?;
    let parse_amount = |s: &str| {
        s.parse::<u64>()
            .map_err(|_| MarketDataError::Parse(format!("Invalid amount: {}", s)))
    };
    Ok(Quote {
        in_amount: parse_amount(&quote.in_amount)?,
        out_amount: parse_amount(&quote.out_amount)?,
        price_impact_pct: quote
            .price_impact_pct
            .as_deref()
            .and_then(|s| Decimal::from_str(s).ok()),
    })
}

fn parse_price(body: &Value, mint: &str) -> Option<Decimal> {
    let price = body.get("data")?.get(mint)?.get("price")?;
    match price {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => n.as_f64().and_then(|f| Decimal::try_from(f).ok()),
        _ => None,
    }
    .filter(|p| p.is_sign_positive() && !p.is_zero())
}

fn best_liquidity(pairs: &[DexScreenerPair]) -> Option<Decimal> {
    pairs
        .iter()
        .filter_map(|p| p.liquidity.as_ref()?.usd)
        .filter_map(|usd| Decimal::try_from(usd).ok())
        .max()
}
