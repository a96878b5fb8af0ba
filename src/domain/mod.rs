//! Domain types for the sniping engine.
//!
//! This module provides:
//! - Primitives: TimeMs, Mint, Mode
//! - Decimal helpers for raw on-chain amounts
//! - Candidate events, trades, positions and per-strategy stats

pub mod decimal;
pub mod event;
pub mod position;
pub mod primitives;
pub mod stats;
pub mod trade;

pub use decimal::Decimal;
pub use event::{Event, EventType};
pub use position::Position;
pub use primitives::{short_mint, Mint, Mode, TimeMs, BASE_DECIMALS, WRAPPED_SOL_MINT};
pub use stats::StrategyStats;
pub use trade::{NewTrade, Side, Trade, TradeOutcome, TradeStatus};
