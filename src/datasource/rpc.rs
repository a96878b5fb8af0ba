//! Minimal Solana JSON-RPC client over reqwest.

use super::MarketDataError;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// SPL Token program id.
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGqPDpnZtQoZn9vBbkwQZbRrKj";

/// Size of an SPL token account, used to filter getProgramAccounts.
const TOKEN_ACCOUNT_SIZE: u64 = 165;

/// Signature entry from getSignaturesForAddress.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    pub block_time: Option<i64>,
    #[serde(default)]
    pub err: Option<Value>,
}

impl SignatureInfo {
    pub fn succeeded(&self) -> bool {
        self.err.as_ref().map_or(true, Value::is_null)
    }
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue a JSON-RPC call and return its `result` field.
    ///
    /// 429 and 5xx responses are retried with exponential backoff for a
    /// short window; node-level error objects are returned immediately.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, MarketDataError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(5)),
            ..Default::default()
        };

        debug!(method, "rpc call");
        let body = retry(backoff, || async {
            let response = self
                .client
                .post(&self.url)
                .json(&payload)
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
                return Err(backoff::Error::permanent(MarketDataError::Http {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| backoff::Error::permanent(MarketDataError::Parse(e.to_string())))
        })
        .await?;

        extract_result(body)
    }

    /// getAccountInfo with jsonParsed encoding. `None` when the account does not exist.
    pub async fn get_account_info_parsed(&self, pubkey: &str) -> Result<Option<Value>, MarketDataError> {
        let result = self
            .call(
                "getAccountInfo",
                json!([pubkey, {"encoding": "jsonParsed", "commitment": "confirmed"}]),
            )
            .await?;
        Ok(result.get("value").filter(|v| !v.is_null()).cloned())
    }

    /// Raw balances of every token account holding `mint`.
    pub async fn token_account_balances(&self, mint: &str) -> Result<Vec<u64>, MarketDataError> {
        let result = self
            .call(
                "getProgramAccounts",
                json!([
                    TOKEN_PROGRAM_ID,
                    {
                        "encoding": "jsonParsed",
                        "commitment": "confirmed",
                        "filters": [
                            {"dataSize": TOKEN_ACCOUNT_SIZE},
                            {"memcmp": {"offset": 0, "bytes": mint}}
                        ]
                    }
                ]),
            )
            .await?;

        let accounts = result
            .as_array()
            .ok_or_else(|| MarketDataError::Parse("Expected array of accounts".to_string()))?;

        Ok(accounts.iter().filter_map(parse_token_account_amount).collect())
    }

    /// Signatures for an address, newest first.
    pub async fn get_signatures_for_address(
        &self,
        address: &str,
        until: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, MarketDataError> {
        let mut options = json!({"limit": limit, "commitment": "confirmed"});
        if let Some(until) = until {
            options["until"] = Value::String(until.to_string());
        }
        let result = self
            .call("getSignaturesForAddress", json!([address, options]))
            .await?;
        serde_json::from_value(result).map_err(|e| MarketDataError::Parse(e.to_string()))
    }

    /// Full transaction with jsonParsed instructions. `None` if not yet available.
    pub async fn get_transaction(&self, signature: &str) -> Result<Option<Value>, MarketDataError> {
        let result = self
            .call(
                "getTransaction",
                json!([
                    signature,
                    {
                        "encoding": "jsonParsed",
                        "commitment": "confirmed",
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await?;
        Ok(Some(result).filter(|v| !v.is_null()))
    }
}

fn extract_result(body: Value) -> Result<Value, MarketDataError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Err(MarketDataError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        });
    }
    body.get("result")
        .cloned()
        .ok_or_else(|| MarketDataError::Parse("Missing result field".to_string()))
}

fn parse_token_account_amount(account: &Value) -> Option<u64> {
    account
        .pointer("/account/data/parsed/info/tokenAmount/amount")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<u64>().ok())
}
