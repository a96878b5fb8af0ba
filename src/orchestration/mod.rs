pub mod orchestrator;
pub mod wallet;

pub use orchestrator::{Engine, EngineError, EngineState, EngineStatus};
pub use wallet::{Wallet, WalletError};
