pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod orchestration;
pub mod shutdown;
pub mod strategy;

pub use config::Config;
pub use datasource::{MarketData, MarketDataError, MockMarketData, SolanaMarketData};
pub use db::{init_db, Repository};
pub use domain::{Decimal, Event, EventType, Mint, Mode, Position, Side, TimeMs, Trade, TradeStatus};
pub use engine::{Decision, Executor, RuleEngine};
pub use error::AppError;
pub use orchestration::{Engine, EngineError, EngineState, EngineStatus};
