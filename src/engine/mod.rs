//! Trading engine: rule evaluation, event processing, execution, and exits.

pub mod activity;
pub mod executor;
pub mod exits;
pub mod monitor;
pub mod processor;
pub mod rules;

pub use activity::{ActivityEntry, ActivityKind, ActivityLog};
pub use executor::{BuyFill, Executor, ExecutorError, SellAllSummary, SellFill};
pub use exits::ExitReason;
pub use monitor::{ExitAction, PositionMonitor};
pub use processor::{EventOutcome, Processor, ProcessorHandle, ProcessorStats, WatchedCandidate};
pub use rules::{Decision, Reason, ReasonKind, RejectCode, RuleEngine};
