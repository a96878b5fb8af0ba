//! RPC polling source for endpoints without websocket support.

use super::parsers::{classify_logs, transaction_logs, ParserRegistry};
use super::{EventSender, EventSource, SourceError};
use crate::datasource::rpc::SignatureInfo;
use crate::datasource::RpcClient;
use crate::domain::{Event, Mint, TimeMs};
use crate::shutdown::cancelled;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Signatures requested per program per tick.
const SIGNATURE_LIMIT: usize = 10;

#[derive(Debug)]
pub struct PollingSource {
    rpc: RpcClient,
    programs: Vec<String>,
    interval: Duration,
    registry: ParserRegistry,
}

impl PollingSource {
    pub fn new(rpc: RpcClient, programs: Vec<String>, interval: Duration) -> Self {
        Self {
            rpc,
            programs,
            interval,
            registry: ParserRegistry::default(),
        }
    }

    async fn poll_program(
        &self,
        program: &str,
        last_seen: &mut HashMap<String, String>,
        sender: &EventSender,
    ) -> Result<usize, SourceError> {
        let until = last_seen.get(program).map(String::as_str);
        let signatures = self
            .rpc
            .get_signatures_for_address(program, until, SIGNATURE_LIMIT)
            .await?;
        let Some(newest) = signatures.first() else {
            return Ok(0);
        };
        last_seen.insert(program.to_string(), newest.signature.clone());

        let mut published = 0;
        for signature in pending_signatures(&signatures) {
            let tx = match self.rpc.get_transaction(signature).await {
                Ok(Some(tx)) => tx,
                Ok(None) => continue,
                Err(e) => {
                    debug!(signature, error = %e, "Failed to get transaction");
                    continue;
                }
            };
            if let Some(event) = event_from_transaction(&self.registry, &tx, program) {
                if sender.publish(event).await {
                    published += 1;
                }
            }
        }
        Ok(published)
    }
}

/// Successful signatures, oldest first. RPC returns newest first.
fn pending_signatures(signatures: &[SignatureInfo]) -> Vec<&str> {
    signatures
        .iter()
        .rev()
        .filter(|s| s.succeeded())
        .map(|s| s.signature.as_str())
        .collect()
}

/// Build an event from a fetched transaction, if its logs and instructions
/// describe a new pool or mint.
pub fn event_from_transaction(registry: &ParserRegistry, tx: &Value, program: &str) -> Option<Event> {
    let event_type = classify_logs(&transaction_logs(tx)[..])?;
    let detection = registry.detect(tx, program)?;
    let mut event = Event::new(Mint::new(detection.mint), event_type, TimeMs::now(), tx.to_string());
    event.pair = detection.pool;
    Some(event)
}

#[async_trait]
impl EventSource for PollingSource {
    fn name(&self) -> &'static str {
        "polling"
    }

    async fn run(&self, sender: EventSender, mut shutdown: watch::Receiver<bool>) -> Result<(), SourceError> {
        info!(
            programs = self.programs.len(),
            interval_secs = self.interval.as_secs(),
            "Starting RPC poller"
        );
        let mut last_seen: HashMap<String, String> = HashMap::new();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancelled(&mut shutdown) => {
                    info!("Poller shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            for program in &self.programs {
                match self.poll_program(program, &mut last_seen, &sender).await {
                    Ok(0) => {}
                    Ok(published) => debug!(program = %program, published, "Poll cycle produced events"),
                    Err(e) => error!(program = %program, error = %e, "Failed to poll program"),
                }
            }
        }
    }
}
