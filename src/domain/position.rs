//! Open positions. At most one per mint.

use super::{Decimal, Mint, TimeMs};
use crate::domain::decimal::pct_change;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub mint: Mint,
    pub quantity: Decimal,
    pub avg_entry_price_usd: Decimal,
    pub opened_at: TimeMs,
    pub last_update_at: TimeMs,
    pub strategy: String,
}

impl Position {
    pub fn age(&self, now: TimeMs) -> std::time::Duration {
        now.since(self.opened_at)
    }

    /// Unrealized PnL in percent at `price_usd`. `None` when entry price is zero.
    pub fn pnl_pct(&self, price_usd: Decimal) -> Option<Decimal> {
        pct_change(self.avg_entry_price_usd, price_usd)
    }

    /// Position value in USD at `price_usd`.
    pub fn value_usd(&self, price_usd: Decimal) -> Decimal {
        self.quantity * price_usd
    }
}
