//! Webhook source: an axum endpoint receiving Helius-style enhanced transactions.

use super::{EventSender, EventSource, SourceError, RECONNECT_DELAY};
use crate::domain::{Event, EventType, Mint, TimeMs, WRAPPED_SOL_MINT};
use crate::shutdown::{cancelled, sleep_or_cancel};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeliusTransaction {
    #[serde(default)]
    pub signature: String,
    #[serde(default, rename = "type")]
    pub tx_type: String,
    #[serde(default)]
    pub account_keys: Vec<String>,
    #[serde(default)]
    pub account_data: Vec<HeliusAccountData>,
    #[serde(default)]
    pub instructions: Vec<HeliusInstruction>,
    #[serde(default)]
    pub token_transfers: Vec<HeliusTokenTransfer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeliusAccountData {
    #[serde(default)]
    pub account: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeliusInstruction {
    #[serde(default)]
    pub program_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeliusTokenTransfer {
    #[serde(default)]
    pub mint: String,
}

impl HeliusTransaction {
    fn touches(&self, program: &str) -> bool {
        self.account_keys.iter().any(|k| k == program)
            || self.account_data.iter().any(|a| a.account == program)
            || self.instructions.iter().any(|i| i.program_id == program)
    }

    fn event_type(&self) -> EventType {
        match self.tx_type.as_str() {
            "ADD_LIQUIDITY" => EventType::LpAdd,
            "TOKEN_MINT" | "INIT_MINT" | "CREATE_MINT" => EventType::NewMint,
            _ => EventType::NewPool,
        }
    }

    fn new_mint(&self) -> Option<&str> {
        self.token_transfers
            .iter()
            .map(|t| t.mint.as_str())
            .find(|m| !m.is_empty() && *m != WRAPPED_SOL_MINT)
    }
}

/// Transactions from either `{type, transactions: [...]}` or a bare array.
pub fn parse_payload(body: &Value) -> Result<Vec<HeliusTransaction>, serde_json::Error> {
    let list = match body {
        Value::Array(_) => body.clone(),
        other => other.get("transactions").cloned().unwrap_or(Value::Array(Vec::new())),
    };
    serde_json::from_value(list)
}

/// Events for transactions that touch a watched program and move a non-SOL mint.
pub fn extract_events(transactions: &[HeliusTransaction], programs: &[String]) -> Vec<Event> {
    transactions
        .iter()
        .filter(|tx| programs.iter().any(|p| tx.touches(p)))
        .filter_map(|tx| {
            let mint = tx.new_mint()?;
            let raw = json!({"signature": tx.signature, "type": tx.tx_type}).to_string();
            Some(Event::new(Mint::new(mint), tx.event_type(), TimeMs::now(), raw))
        })
        .collect()
}

#[derive(Clone)]
struct WebhookState {
    sender: EventSender,
    secret: Option<Arc<str>>,
    programs: Arc<Vec<String>>,
}

fn authorized(headers: &HeaderMap, secret: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v))
        .map_or(false, |v| v == secret)
}

async fn receive(State(state): State<WebhookState>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if let Some(secret) = &state.secret {
        if !authorized(&headers, secret) {
            warn!("Rejected webhook with bad authorization");
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"}))).into_response();
        }
    }

    let transactions = match parse_payload(&body) {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "Failed to parse webhook payload");
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"}))).into_response();
        }
    };
    debug!(transactions = transactions.len(), "Received webhook");

    let mut queued = 0;
    for event in extract_events(&transactions, &state.programs) {
        if state.sender.publish(event).await {
            queued += 1;
        }
    }
    Json(json!({"status": "ok", "events": queued})).into_response()
}

fn router(path: &str, state: WebhookState) -> Router {
    Router::new().route(path, post(receive)).with_state(state)
}

#[derive(Debug)]
pub struct WebhookSource {
    port: u16,
    path: String,
    secret: Option<String>,
    programs: Vec<String>,
}

impl WebhookSource {
    pub fn new(port: u16, path: String, secret: Option<String>, programs: Vec<String>) -> Self {
        Self {
            port,
            path,
            secret,
            programs,
        }
    }

    fn router(&self, sender: EventSender) -> Router {
        router(
            &self.path,
            WebhookState {
                sender,
                secret: self.secret.as_deref().map(Arc::from),
                programs: Arc::new(self.programs.clone()),
            },
        )
    }
}

#[async_trait]
impl EventSource for WebhookSource {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn run(&self, sender: EventSender, mut shutdown: watch::Receiver<bool>) -> Result<(), SourceError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        loop {
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    warn!(%addr, error = %e, "Failed to bind webhook server, retrying in 5s");
                    if sleep_or_cancel(RECONNECT_DELAY, &mut shutdown).await {
                        return Ok(());
                    }
                    continue;
                }
            };
            info!(%addr, path = %self.path, "Webhook server started");

            let mut stop = shutdown.clone();
            return axum::serve(listener, self.router(sender.clone()))
                .with_graceful_shutdown(async move { cancelled(&mut stop).await })
                .await
                .map_err(|e| SourceError::Bind(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RAYDIUM_AMM_V4;
    use axum::body::Body;
    use axum::http::Request;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn pool_payload() -> Value {
        json!({
            "type": "CREATE_POOL",
            "transactions": [{
                "signature": "sig1",
                "type": "CREATE_POOL",
                "accountData": [{"account": RAYDIUM_AMM_V4}],
                "tokenTransfers": [
                    {"mint": WRAPPED_SOL_MINT, "tokenAmount": 1.0},
                    {"mint": "HookMint", "tokenAmount": 100.0}
                ]
            }]
        })
    }

    #[test]
    fn test_extract_events_picks_non_sol_mint() {
        let txs = parse_payload(&pool_payload()).unwrap();
        let events = extract_events(&txs, &[RAYDIUM_AMM_V4.to_string()]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].mint, Mint::new("HookMint"));
        assert_eq!(events[0].event_type, EventType::NewPool);
    }

    #[test]
    fn test_unwatched_program_ignored() {
        let txs = parse_payload(&pool_payload()).unwrap();
        assert!(extract_events(&txs, &["OtherProgram".to_string()]).is_empty());
    }

    #[test]
    fn test_bare_array_and_event_types() {
        let body = json!([
            {"type": "ADD_LIQUIDITY", "instructions": [{"programId": "P"}], "tokenTransfers": [{"mint": "A"}]},
            {"type": "TOKEN_MINT", "accountKeys": ["P"], "tokenTransfers": [{"mint": "B"}]},
            {"type": "SWAP", "accountKeys": ["P"], "tokenTransfers": [{"mint": WRAPPED_SOL_MINT}]}
        ]);
        let txs = parse_payload(&body).unwrap();
        let events = extract_events(&txs, &["P".to_string()]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::LpAdd);
        assert_eq!(events[1].event_type, EventType::NewMint);
    }

    #[tokio::test]
    async fn test_endpoint_queues_events() {
        let (tx, mut rx) = mpsc::channel(4);
        let source = WebhookSource::new(0, "/webhook".into(), None, vec![RAYDIUM_AMM_V4.to_string()]);
        let app = source.router(EventSender::new(tx, None));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook")
                    .header("content-type", "application/json")
                    .body(Body::from(pool_payload().to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(rx.recv().await.unwrap().mint, Mint::new("HookMint"));
    }

    #[tokio::test]
    async fn test_endpoint_rejects_bad_secret() {
        let (tx, _rx) = mpsc::channel(4);
        let source = WebhookSource::new(0, "/webhook".into(), Some("s3cret".into()), vec![RAYDIUM_AMM_V4.to_string()]);
        let app = source.router(EventSender::new(tx, None));

        let request = |auth: &str| {
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .header("authorization", auth)
                .body(Body::from(pool_payload().to_string()))
                .unwrap()
        };

        let response = app.clone().oneshot(request("wrong")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let response = app.oneshot(request("Bearer s3cret")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
