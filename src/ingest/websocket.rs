//! `logsSubscribe` websocket source: one connection, one handler task per program.

use super::parsers::{classify_logs, ParserRegistry};
use super::{EventSender, EventSource, SourceError, RECONNECT_DELAY};
use crate::datasource::RpcClient;
use crate::domain::{Event, Mint, TimeMs};
use crate::shutdown::{cancelled, is_cancelled, sleep_or_cancel};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Per-program buffer between the socket reader and its handler task.
const HANDLER_BUFFER: usize = 256;

/// Upper bound on the websocket handshake.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A `logsNotification` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LogNotification {
    pub signature: String,
    pub failed: bool,
    pub logs: Vec<String>,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WsMessage {
    /// Reply to a subscribe request: request id -> subscription id.
    Subscribed { request_id: u64, subscription: u64 },
    Notification { subscription: u64, log: LogNotification },
    Error { request_id: Option<u64>, message: String },
    Other,
}

pub fn parse_ws_message(text: &str) -> WsMessage {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return WsMessage::Other;
    };

    if value.get("method").and_then(Value::as_str) == Some("logsNotification") {
        let subscription = value.pointer("/params/subscription").and_then(Value::as_u64);
        let result = value.pointer("/params/result/value");
        return match (subscription, result) {
            (Some(subscription), Some(result)) => WsMessage::Notification {
                subscription,
                log: LogNotification {
                    signature: result
                        .get("signature")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    failed: result.get("err").map_or(false, |e| !e.is_null()),
                    logs: result
                        .get("logs")
                        .and_then(Value::as_array)
                        .map(|l| l.iter().filter_map(Value::as_str).map(str::to_string).collect())
                        .unwrap_or_default(),
                    raw: result.clone(),
                },
            },
            _ => WsMessage::Other,
        };
    }

    let request_id = value.get("id").and_then(Value::as_u64);
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return WsMessage::Error {
            request_id,
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        };
    }
    match (request_id, value.get("result").and_then(Value::as_u64)) {
        (Some(request_id), Some(subscription)) => WsMessage::Subscribed {
            request_id,
            subscription,
        },
        _ => WsMessage::Other,
    }
}

fn subscribe_request(request_id: u64, program: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": request_id,
        "method": "logsSubscribe",
        "params": [{"mentions": [program]}, {"commitment": "confirmed"}]
    })
    .to_string()
}

#[derive(Debug)]
pub struct WebsocketSource {
    ws_url: String,
    rpc: RpcClient,
    programs: Vec<String>,
    registry: Arc<ParserRegistry>,
}

impl WebsocketSource {
    pub fn new(ws_url: String, rpc: RpcClient, programs: Vec<String>) -> Self {
        Self {
            ws_url,
            rpc,
            programs,
            registry: Arc::new(ParserRegistry::default()),
        }
    }

    /// One connection lifetime. `Ok` only on shutdown.
    async fn stream(&self, sender: &EventSender, shutdown: &mut watch::Receiver<bool>) -> Result<(), SourceError> {
        let connect = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(self.ws_url.as_str()));
        let (ws, _) = tokio::select! {
            _ = cancelled(shutdown) => return Ok(()),
            connected = connect => match connected {
                Ok(result) => result.map_err(|e| SourceError::Connect(e.to_string()))?,
                Err(_) => return Err(SourceError::Connect("handshake timed out".to_string())),
            },
        };
        let (mut write, mut read) = ws.split();

        let mut pending: HashMap<u64, usize> = HashMap::new();
        for (index, program) in self.programs.iter().enumerate() {
            let request_id = index as u64 + 1;
            write
                .send(Message::Text(subscribe_request(request_id, program)))
                .await
                .map_err(|e| SourceError::Connect(e.to_string()))?;
            pending.insert(request_id, index);
        }
        info!(programs = self.programs.len(), "Connected, monitoring for new tokens");

        let mut routes: HashMap<u64, mpsc::Sender<LogNotification>> = HashMap::new();
        let mut handlers: Vec<JoinHandle<()>> = Vec::new();

        let result = loop {
            let frame = tokio::select! {
                _ = cancelled(shutdown) => break Ok(()),
                frame = read.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => match parse_ws_message(&text) {
                    WsMessage::Subscribed { request_id, subscription } => {
                        let Some(index) = pending.remove(&request_id) else {
                            continue;
                        };
                        let program = self.programs[index].clone();
                        debug!(program = %program, subscription, "Subscribed to program logs");
                        let (tx, rx) = mpsc::channel(HANDLER_BUFFER);
                        routes.insert(subscription, tx);
                        handlers.push(tokio::spawn(handle_program(
                            program,
                            rx,
                            self.rpc.clone(),
                            self.registry.clone(),
                            sender.clone(),
                            shutdown.clone(),
                        )));
                    }
                    WsMessage::Notification { subscription, log } => {
                        if let Some(route) = routes.get(&subscription) {
                            if route.try_send(log).is_err() {
                                warn!(subscription, "Program handler backlogged, dropping log");
                            }
                        }
                    }
                    WsMessage::Error { request_id, message } => {
                        break Err(SourceError::Protocol(format!(
                            "request {:?} failed: {}",
                            request_id, message
                        )));
                    }
                    WsMessage::Other => {}
                },
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(e) = write.send(Message::Pong(payload)).await {
                        break Err(SourceError::Protocol(e.to_string()));
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    break Err(SourceError::Protocol("connection closed".to_string()));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(SourceError::Protocol(e.to_string())),
            }
        };

        // Closing the routes ends each handler once it drains.
        drop(routes);
        for handler in handlers {
            let _ = handler.await;
        }
        let _ = write.send(Message::Close(None)).await;
        result
    }
}

async fn handle_program(
    program: String,
    mut rx: mpsc::Receiver<LogNotification>,
    rpc: RpcClient,
    registry: Arc<ParserRegistry>,
    sender: EventSender,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let log = tokio::select! {
            _ = cancelled(&mut shutdown) => return,
            log = rx.recv() => match log {
                Some(log) => log,
                None => return,
            },
        };
        if log.failed {
            continue;
        }
        let Some(event_type) = classify_logs(&log.logs[..]) else {
            continue;
        };

        let tx = match rpc.get_transaction(&log.signature).await {
            Ok(Some(tx)) => tx,
            Ok(None) => continue,
            Err(e) => {
                debug!(signature = %log.signature, error = %e, "Failed to fetch transaction");
                continue;
            }
        };
        let Some(detection) = registry.detect(&tx, &program) else {
            continue;
        };

        info!(mint = %Mint::new(detection.mint.as_str()).short(), dex = detection.dex, "New token detected");
        let mut event = Event::new(Mint::new(detection.mint), event_type, TimeMs::now(), log.raw.to_string());
        event.pair = detection.pool;
        sender.publish(event).await;
    }
}

#[async_trait]
impl EventSource for WebsocketSource {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn run(&self, sender: EventSender, mut shutdown: watch::Receiver<bool>) -> Result<(), SourceError> {
        while !is_cancelled(&shutdown) {
            match self.stream(&sender, &mut shutdown).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "Listener connection failed, retrying in 5s");
                    if sleep_or_cancel(RECONNECT_DELAY, &mut shutdown).await {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }
}
