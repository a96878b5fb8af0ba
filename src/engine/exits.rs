use crate::config::RiskConfig;
use crate::domain::{Decimal, Position, TimeMs};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    MaxDurationExceeded,
    TakeProfit,
    StopLoss,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::MaxDurationExceeded => "max_duration_exceeded",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLoss => "stop_loss",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True once the position has been held longer than the configured maximum.
/// A maximum of 0 disables the check.
pub fn duration_exceeded(position: &Position, now: TimeMs, risk: &RiskConfig) -> bool {
    risk.max_trade_duration_sec > 0 && position.age(now).as_secs() > risk.max_trade_duration_sec
}

/// Price-based exit at `price_usd`. A zero threshold disables that exit.
///
/// Take-profit is checked first and wins when both thresholds are met. With
/// validated (non-negative) thresholds the two ranges are disjoint; they can
/// only overlap when a negative take-profit is set directly.
pub fn price_exit(position: &Position, price_usd: Decimal, risk: &RiskConfig) -> Option<ExitReason> {
    let pnl = position.pnl_pct(price_usd)?;
    if !risk.take_profit_pct.is_zero() && pnl >= risk.take_profit_pct {
        return Some(ExitReason::TakeProfit);
    }
    if !risk.stop_loss_pct.is_zero() && pnl <= -risk.stop_loss_pct {
        return Some(ExitReason::StopLoss);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Mint;
    use std::str::FromStr;

    fn risk(sl: i64, tp: i64) -> RiskConfig {
        RiskConfig {
            stop_loss_pct: Decimal::from(sl),
            take_profit_pct: Decimal::from(tp),
            max_trade_duration_sec: 240,
        }
    }

    fn position() -> Position {
        Position {
            mint: Mint::new("m1"),
            quantity: Decimal::from(100),
            avg_entry_price_usd: Decimal::ONE,
            opened_at: TimeMs::new(0),
            last_update_at: TimeMs::new(0),
            strategy: "snipe_flip".into(),
        }
    }

    fn px(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_take_profit_and_stop_loss() {
        let r = risk(8, 18);
        assert_eq!(price_exit(&position(), px("1.20"), &r), Some(ExitReason::TakeProfit));
        assert_eq!(price_exit(&position(), px("1.18"), &r), Some(ExitReason::TakeProfit));
        assert_eq!(price_exit(&position(), px("0.92"), &r), Some(ExitReason::StopLoss));
        assert_eq!(price_exit(&position(), px("1.05"), &r), None);
    }

    #[test]
    fn test_take_profit_wins_when_both_met() {
        // Take-profit at -10% and stop-loss at 5%: a 6% drop meets both.
        let r = risk(5, -10);
        assert_eq!(price_exit(&position(), px("0.94"), &r), Some(ExitReason::TakeProfit));
        assert_eq!(price_exit(&position(), px("0.90"), &r), Some(ExitReason::TakeProfit));
        // Below -10% only the stop-loss is met.
        assert_eq!(price_exit(&position(), px("0.80"), &r), Some(ExitReason::StopLoss));
    }

    #[test]
    fn test_validated_thresholds_never_overlap() {
        let r = risk(8, 18);
        for p in ["0.50", "0.92", "0.93", "1.00", "1.17", "1.18", "2.00"] {
            let pnl = position().pnl_pct(px(p)).unwrap();
            let tp = pnl >= r.take_profit_pct;
            let sl = pnl <= -r.stop_loss_pct;
            assert!(!(tp && sl), "both exits met at {}", p);
        }
    }

    #[test]
    fn test_zero_thresholds_disable() {
        let r = risk(0, 0);
        assert_eq!(price_exit(&position(), px("5"), &r), None);
        assert_eq!(price_exit(&position(), px("0.01"), &r), None);
    }

    #[test]
    fn test_duration() {
        let r = risk(8, 18);
        assert!(duration_exceeded(&position(), TimeMs::new(300_000), &r));
        assert!(!duration_exceeded(&position(), TimeMs::new(240_000), &r));
        let unlimited = RiskConfig {
            max_trade_duration_sec: 0,
            ..r
        };
        assert!(!duration_exceeded(&position(), TimeMs::new(10_000_000), &unlimited));
    }
}
