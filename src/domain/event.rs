//! Candidate events produced by ingestion.

use super::{Mint, TimeMs};
use serde::{Deserialize, Serialize};

/// Kind of on-chain activity that surfaced the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    NewMint,
    NewPool,
    LpAdd,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NewMint => "NEW_MINT",
            EventType::NewPool => "NEW_POOL",
            EventType::LpAdd => "LP_ADD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW_MINT" => Some(EventType::NewMint),
            "NEW_POOL" => Some(EventType::NewPool),
            "LP_ADD" => Some(EventType::LpAdd),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected token candidate. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub mint: Mint,
    pub event_type: EventType,
    pub timestamp: TimeMs,
    /// Pool / pair account, when the source knows it.
    pub pair: Option<String>,
    pub lp_address: Option<String>,
    /// Raw source payload (JSON).
    pub raw: String,
}

impl Event {
    pub fn new(mint: Mint, event_type: EventType, timestamp: TimeMs, raw: String) -> Self {
        Self {
            mint,
            event_type,
            timestamp,
            pair: None,
            lp_address: None,
            raw,
        }
    }

    pub fn with_pair(mut self, pair: impl Into<String>) -> Self {
        self.pair = Some(pair.into());
        self
    }
}
