//! Append-only trade ledger entries.

use super::{Decimal, Mint, TimeMs};
use serde::{Deserialize, Serialize};

/// Trade side: Buy or Sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade status. `Executed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Pending,
    Executed,
    Failed,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Executed => "executed",
            TradeStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TradeStatus::Pending),
            "executed" => Some(TradeStatus::Executed),
            "failed" => Some(TradeStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeStatus::Pending)
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ledger row. `id` is assigned by the repository on insert.
///
/// `quantity` is the amount requested when the trade was opened: base asset
/// spent for a buy, tokens offered for a sell. The realized fill lives in
/// `filled_quantity` and `price_usd`, present only once executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub timestamp: TimeMs,
    pub side: Side,
    pub mint: Mint,
    pub quantity: Decimal,
    pub filled_quantity: Option<Decimal>,
    pub price_usd: Option<Decimal>,
    pub tx_ref: Option<String>,
    pub status: TradeStatus,
    pub strategy: String,
}

/// A trade about to be inserted in `Pending` state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrade {
    pub timestamp: TimeMs,
    pub side: Side,
    pub mint: Mint,
    pub quantity: Decimal,
    pub strategy: String,
}

/// Terminal transition applied to a pending trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeOutcome {
    pub status: TradeStatus,
    pub tx_ref: String,
    /// Realized fill, when the external call produced one. Written once,
    /// alongside the status change.
    pub quantity: Option<Decimal>,
    pub price_usd: Option<Decimal>,
}

impl TradeOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: TradeStatus::Failed,
            tx_ref: message.into(),
            quantity: None,
            price_usd: None,
        }
    }

    pub fn executed(tx_ref: impl Into<String>, quantity: Decimal, price_usd: Decimal) -> Self {
        Self {
            status: TradeStatus::Executed,
            tx_ref: tx_ref.into(),
            quantity: Some(quantity),
            price_usd: Some(price_usd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!TradeStatus::Pending.is_terminal());
        assert!(TradeStatus::Executed.is_terminal());
        assert!(TradeStatus::Failed.is_terminal());
    }

    #[test]
    fn test_side_and_status_parse() {
        assert_eq!(Side::parse("sell"), Some(Side::Sell));
        assert_eq!(Side::parse("SELL"), None);
        assert_eq!(TradeStatus::parse("failed"), Some(TradeStatus::Failed));
    }
}
