//! Aggregated per-strategy reporting.

use super::Decimal;
use serde::Serialize;

/// Trade statistics grouped by strategy name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct StrategyStats {
    pub strategy: String,
    pub total_trades: i64,
    pub buy_trades: i64,
    pub sell_trades: i64,
    pub executed_trades: i64,
    pub failed_trades: i64,
    pub success_rate_pct: Decimal,
    pub total_volume_usd: Decimal,
    pub avg_entry_price: Decimal,
    pub open_positions: i64,
}

impl StrategyStats {
    /// Executed / total as a percentage; zero when no trades exist.
    pub fn compute_success_rate(executed: i64, total: i64) -> Decimal {
        if total <= 0 {
            return Decimal::ZERO;
        }
        (Decimal::from(executed) * Decimal::ONE_HUNDRED / Decimal::from(total)).round_dp(2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        assert_eq!(StrategyStats::compute_success_rate(0, 0), Decimal::ZERO);
        assert_eq!(StrategyStats::compute_success_rate(3, 4), Decimal::from(75));
        assert_eq!(
            StrategyStats::compute_success_rate(1, 3).to_string(),
            "33.33"
        );
    }
}
