//! Event ingestion: sources that detect new tokens and feed the processor queue.

use crate::config::{Config, ListenerMode};
use crate::datasource::{MarketDataError, RpcClient};
use crate::db::Repository;
use crate::domain::Event;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

pub mod parsers;
pub mod polling;
pub mod webhook;
pub mod websocket;

pub use parsers::{Detection, ParserRegistry};
pub use polling::PollingSource;
pub use webhook::WebhookSource;
pub use websocket::WebsocketSource;

/// Delay before a failed connection is retried.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("bind failed: {0}")]
    Bind(String),
    #[error("source already consumed")]
    AlreadyRunning,
    #[error(transparent)]
    MarketData(#[from] MarketDataError),
}

/// A producer of candidate events. Runs until `shutdown` fires.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, sender: EventSender, shutdown: watch::Receiver<bool>) -> Result<(), SourceError>;
}

/// Handle used by sources to publish events.
///
/// Each event is recorded to the event log (failures are logged and the
/// event is still forwarded), then offered to the bounded queue. A full
/// queue drops the event.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
    repo: Option<Arc<Repository>>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<Event>, repo: Option<Arc<Repository>>) -> Self {
        Self {
            tx,
            repo,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns true if the event was queued.
    pub async fn publish(&self, event: Event) -> bool {
        if let Some(repo) = &self.repo {
            if let Err(e) = repo.record_event(&event).await {
                warn!(mint = %event.mint.short(), error = %e, "Failed to store event");
            }
        }

        info!(
            event_type = %event.event_type,
            mint = %event.mint.short(),
            "New event detected"
        );

        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(mint = %event.mint.short(), "Event queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event queue closed");
                false
            }
        }
    }

    /// Number of events dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Source fed by an in-process handle, for replaying captured events.
pub struct ReplaySource {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
}

#[derive(Debug, Clone)]
pub struct ReplayHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl ReplayHandle {
    /// Returns false once the source has stopped.
    pub fn push(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }
}

impl ReplaySource {
    pub fn channel() -> (Self, ReplayHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Mutex::new(Some(rx)),
            },
            ReplayHandle { tx },
        )
    }
}

#[async_trait]
impl EventSource for ReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn run(&self, sender: EventSender, mut shutdown: watch::Receiver<bool>) -> Result<(), SourceError> {
        let mut rx = self.rx.lock().await.take().ok_or(SourceError::AlreadyRunning)?;
        loop {
            tokio::select! {
                _ = crate::shutdown::cancelled(&mut shutdown) => return Ok(()),
                event = rx.recv() => match event {
                    Some(event) => {
                        sender.publish(event).await;
                    }
                    None => {
                        crate::shutdown::cancelled(&mut shutdown).await;
                        return Ok(());
                    }
                },
            }
        }
    }
}

/// Build the configured source, or `None` when the listener is disabled.
pub fn build_source(config: &Config) -> Option<Arc<dyn EventSource>> {
    if !config.listener.enabled {
        return None;
    }
    let listener = &config.listener;
    let source: Arc<dyn EventSource> = match listener.mode {
        ListenerMode::Websocket => Arc::new(WebsocketSource::new(
            config.solana.ws_url.clone(),
            RpcClient::new(config.solana.rpc_url.clone(), config.solana.request_timeout),
            listener.programs.clone(),
        )),
        ListenerMode::Polling => Arc::new(PollingSource::new(
            RpcClient::new(config.solana.rpc_url.clone(), config.solana.request_timeout),
            listener.programs.clone(),
            listener.polling_interval,
        )),
        ListenerMode::Webhook => Arc::new(WebhookSource::new(
            listener.webhook_port,
            listener.webhook_path.clone(),
            listener.webhook_secret.clone(),
            listener.programs.clone(),
        )),
    };
    Some(source)
}
