//! Built-in strategy presets.
//!
//! A preset replaces the trading, rules and risk sections of the config.
//! RPC, listener and timing settings are never touched by a preset.

use crate::config::{RiskConfig, RulesConfig, TradingConfig};
use crate::domain::Decimal;
use serde::Serialize;

pub const DEFAULT_STRATEGY: &str = "snipe_flip";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyPreset {
    pub name: &'static str,
    pub description: &'static str,
    pub trading: TradingConfig,
    pub rules: RulesConfig,
    pub risk: RiskConfig,
}

fn dec(value: i64, scale: u32) -> Decimal {
    Decimal::new(value, scale)
}

fn snipe_flip() -> StrategyPreset {
    StrategyPreset {
        name: "snipe_flip",
        description: "Catch early pumps, exit fast before rugs (3-5 min holds)",
        trading: TradingConfig {
            max_spend_per_trade: dec(2, 1),
            max_open_positions: 5,
            slippage_bps: 400,
            priority_fee_micro_lamports: 20_000,
        },
        rules: RulesConfig {
            min_liquidity_usd: dec(3000, 0),
            max_mint_age_sec: 300,
            min_holders: 3,
            dev_wallet_max_pct: dec(40, 0),
            block_freeze_authority: true,
            allow_mint_authority: false,
        },
        risk: RiskConfig {
            stop_loss_pct: dec(8, 0),
            take_profit_pct: dec(18, 0),
            max_trade_duration_sec: 240,
        },
    }
}

fn conservative() -> StrategyPreset {
    StrategyPreset {
        name: "conservative",
        description: "Safer entry with established tokens, longer holds (10-20 min)",
        trading: TradingConfig {
            max_spend_per_trade: dec(5, 1),
            max_open_positions: 3,
            slippage_bps: 200,
            priority_fee_micro_lamports: 10_000,
        },
        rules: RulesConfig {
            min_liquidity_usd: dec(10_000, 0),
            max_mint_age_sec: 900,
            min_holders: 50,
            dev_wallet_max_pct: dec(20, 0),
            block_freeze_authority: true,
            allow_mint_authority: false,
        },
        risk: RiskConfig {
            stop_loss_pct: dec(10, 0),
            take_profit_pct: dec(25, 0),
            max_trade_duration_sec: 900,
        },
    }
}

fn scalping() -> StrategyPreset {
    StrategyPreset {
        name: "scalping",
        description: "Ultra-fast micro-flips, immediate exits (30 sec - 2 min holds)",
        trading: TradingConfig {
            max_spend_per_trade: dec(1, 1),
            max_open_positions: 10,
            slippage_bps: 500,
            priority_fee_micro_lamports: 50_000,
        },
        rules: RulesConfig {
            min_liquidity_usd: dec(2000, 0),
            max_mint_age_sec: 180,
            min_holders: 2,
            dev_wallet_max_pct: dec(50, 0),
            block_freeze_authority: true,
            allow_mint_authority: false,
        },
        risk: RiskConfig {
            stop_loss_pct: dec(5, 0),
            take_profit_pct: dec(10, 0),
            max_trade_duration_sec: 90,
        },
    }
}

/// Observation only: zero positions, every filter relaxed.
fn data_collection() -> StrategyPreset {
    StrategyPreset {
        name: "data_collection",
        description: "Observe and learn patterns, no actual trading",
        trading: TradingConfig {
            max_spend_per_trade: Decimal::ZERO,
            max_open_positions: 0,
            slippage_bps: 200,
            priority_fee_micro_lamports: 5_000,
        },
        rules: RulesConfig {
            min_liquidity_usd: dec(500, 0),
            max_mint_age_sec: 600,
            min_holders: 1,
            dev_wallet_max_pct: dec(100, 0),
            block_freeze_authority: false,
            allow_mint_authority: true,
        },
        risk: RiskConfig {
            stop_loss_pct: Decimal::ZERO,
            take_profit_pct: Decimal::ZERO,
            max_trade_duration_sec: 3600,
        },
    }
}

fn momentum_rider() -> StrategyPreset {
    StrategyPreset {
        name: "momentum_rider",
        description: "Enter early with volume, ride pumps for bigger gains (5-15 min)",
        trading: TradingConfig {
            max_spend_per_trade: dec(3, 1),
            max_open_positions: 4,
            slippage_bps: 300,
            priority_fee_micro_lamports: 15_000,
        },
        rules: RulesConfig {
            min_liquidity_usd: dec(5000, 0),
            max_mint_age_sec: 600,
            min_holders: 10,
            dev_wallet_max_pct: dec(30, 0),
            block_freeze_authority: true,
            allow_mint_authority: false,
        },
        risk: RiskConfig {
            stop_loss_pct: dec(15, 0),
            take_profit_pct: dec(40, 0),
            max_trade_duration_sec: 600,
        },
    }
}

/// All presets, ordered by name.
pub fn presets() -> Vec<StrategyPreset> {
    let mut all = vec![
        snipe_flip(),
        conservative(),
        scalping(),
        data_collection(),
        momentum_rider(),
    ];
    all.sort_by_key(|p| p.name);
    all
}

pub fn preset(name: &str) -> Option<StrategyPreset> {
    presets().into_iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_lookup() {
        let p = preset("scalping").unwrap();
        assert_eq!(p.trading.max_open_positions, 10);
        assert_eq!(p.risk.max_trade_duration_sec, 90);
        assert!(preset("yolo").is_none());
    }

    #[test]
    fn test_presets_sorted_and_unique() {
        let names: Vec<&str> = presets().iter().map(|p| p.name).collect();
        assert_eq!(
            names,
            vec!["conservative", "data_collection", "momentum_rider", "scalping", "snipe_flip"]
        );
    }

    #[test]
    fn test_default_preset_values() {
        let p = preset(DEFAULT_STRATEGY).unwrap();
        assert_eq!(p.trading.max_spend_per_trade.to_string(), "0.2");
        assert_eq!(p.trading.slippage_bps, 400);
        assert_eq!(p.rules.min_holders, 3);
        assert_eq!(p.risk.take_profit_pct, Decimal::from(18));
    }

    #[test]
    fn test_data_collection_never_trades() {
        let p = preset("data_collection").unwrap();
        assert_eq!(p.trading.max_open_positions, 0);
        assert!(p.trading.max_spend_per_trade.is_zero());
    }
}
