use super::wallet::Wallet;
use crate::config::Config;
use crate::datasource::MarketData;
use crate::db::{RepoError, Repository};
use crate::domain::{Mode, Position, StrategyStats, Trade};
use crate::engine::{
    ActivityEntry, ActivityLog, Executor, ExecutorError, PositionMonitor, Processor, ProcessorHandle,
    ProcessorStats, RuleEngine, SellAllSummary, WatchedCandidate,
};
use crate::ingest::{EventSender, EventSource};
use crate::shutdown::cancelled;
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub running: bool,
    pub state: EngineState,
    pub mode: Mode,
    pub strategy: String,
    pub open_positions: i64,
    pub total_trades: i64,
    pub watching: usize,
    pub dropped_events: u64,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine already running")]
    AlreadyRunning,
    #[error("engine not running")]
    NotRunning,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

struct Runtime {
    state: EngineState,
    mode: Mode,
    executor: Arc<Executor>,
    processor: ProcessorHandle,
    sender: Option<EventSender>,
    shutdown: Option<watch::Sender<bool>>,
}

/// Owns the engine lifecycle and wires the ingestion source, processor and
/// position monitor together.
pub struct Engine {
    config: Arc<Config>,
    repo: Arc<Repository>,
    market: Arc<dyn MarketData>,
    source: Option<Arc<dyn EventSource>>,
    activity: Arc<ActivityLog>,
    runtime: RwLock<Runtime>,
}

impl Engine {
    pub fn new(config: Arc<Config>, repo: Arc<Repository>, market: Arc<dyn MarketData>) -> Self {
        let executor = Arc::new(Executor::new(
            market.clone(),
            repo.clone(),
            config.trading.clone(),
            Mode::DryRun,
            config.strategy.clone(),
        ));
        Self {
            runtime: RwLock::new(Runtime {
                state: EngineState::Stopped,
                mode: Mode::DryRun,
                executor,
                processor: ProcessorHandle::default(),
                sender: None,
                shutdown: None,
            }),
            config,
            repo,
            market,
            source: None,
            activity: Arc::new(ActivityLog::new()),
        }
    }

    /// Event source started with the engine. Without one the engine only
    /// monitors existing positions.
    pub fn with_source(mut self, source: Option<Arc<dyn EventSource>>) -> Self {
        self.source = source;
        self
    }

    fn runtime(&self) -> RwLockReadGuard<'_, Runtime> {
        self.runtime.read().unwrap_or_else(|e| e.into_inner())
    }

    fn runtime_mut(&self) -> RwLockWriteGuard<'_, Runtime> {
        self.runtime.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Run until [`Engine::stop`] is called. Returns once every task has
    /// finished or the shutdown grace period has elapsed.
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut shutdown = {
            let mut rt = self.runtime_mut();
            if rt.state != EngineState::Stopped {
                return Err(EngineError::AlreadyRunning);
            }
            rt.state = EngineState::Starting;
            let (tx, rx) = watch::channel(false);
            rt.shutdown = Some(tx);
            rx
        };

        let timing = &self.config.timing;
        let mode = self.resolve_mode();
        info!(mode = %mode, strategy = %self.config.strategy, "Starting engine");

        let executor = Arc::new(Executor::new(
            self.market.clone(),
            self.repo.clone(),
            self.config.trading.clone(),
            mode,
            self.config.strategy.clone(),
        ));
        let rules = RuleEngine::new(self.market.clone(), self.repo.clone(), self.config.rules.clone());
        let processor = Processor::new(rules, executor.clone(), timing.clone(), self.activity.clone());
        let monitor = PositionMonitor::new(
            self.repo.clone(),
            self.market.clone(),
            executor.clone(),
            self.config.risk.clone(),
            timing.monitor_interval,
        );

        let (tx, rx) = mpsc::channel(timing.event_queue_capacity);
        let sender = EventSender::new(tx, Some(self.repo.clone()));

        let mut tasks = JoinSet::new();
        {
            let mut rt = self.runtime_mut();
            rt.mode = mode;
            rt.executor = executor;
            rt.processor = processor.handle();
            rt.sender = Some(sender.clone());
            if rt.state == EngineState::Starting {
                rt.state = EngineState::Running;
            }
        }

        tasks.spawn(processor.run(rx, shutdown.clone()));
        tasks.spawn(monitor.run(shutdown.clone()));
        match &self.source {
            Some(source) => {
                let source = source.clone();
                let rx = shutdown.clone();
                tasks.spawn(async move {
                    info!(source = source.name(), "Starting event source");
                    if let Err(e) = source.run(sender, rx).await {
                        error!(source = source.name(), error = %e, "Event source stopped");
                    }
                });
            }
            None => {
                drop(sender);
                info!("Listener disabled, monitoring positions only");
            }
        }

        info!("Engine running");
        cancelled(&mut shutdown).await;

        self.runtime_mut().state = EngineState::Stopping;
        info!("Engine stopping");
        let drained = tokio::time::timeout(timing.shutdown_grace, async {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    warn!(error = %e, "Engine task failed");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                grace_secs = timing.shutdown_grace.as_secs(),
                "Tasks did not stop within grace period, aborting"
            );
            tasks.abort_all();
        }

        let mut rt = self.runtime_mut();
        rt.state = EngineState::Stopped;
        rt.shutdown = None;
        info!("Engine stopped");
        Ok(())
    }

    /// Signal a running engine to stop.
    pub fn stop(&self) -> Result<(), EngineError> {
        let rt = self.runtime();
        match (&rt.state, &rt.shutdown) {
            (EngineState::Starting | EngineState::Running, Some(tx)) => {
                info!("Stop requested");
                let _ = tx.send(true);
                Ok(())
            }
            _ => Err(EngineError::NotRunning),
        }
    }

    /// Live mode needs a loadable wallet; otherwise the engine simulates.
    fn resolve_mode(&self) -> Mode {
        if self.config.mode != Mode::Live {
            return Mode::DryRun;
        }
        match Wallet::load(&self.config.solana.wallet_path) {
            Ok(wallet) => {
                info!(address = %wallet.address(), "Wallet loaded");
                Mode::Live
            }
            Err(e) => {
                warn!(error = %e, "Failed to load wallet, falling back to dry-run");
                Mode::DryRun
            }
        }
    }

    pub fn state(&self) -> EngineState {
        self.runtime().state
    }

    pub fn mode(&self) -> Mode {
        self.runtime().mode
    }

    fn processor(&self) -> ProcessorHandle {
        self.runtime().processor.clone()
    }

    fn executor(&self) -> Arc<Executor> {
        self.runtime().executor.clone()
    }

    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let (state, mode, dropped_events) = {
            let rt = self.runtime();
            (rt.state, rt.mode, rt.sender.as_ref().map(|s| s.dropped()).unwrap_or(0))
        };
        Ok(EngineStatus {
            running: state == EngineState::Running,
            state,
            mode,
            strategy: self.config.strategy.clone(),
            open_positions: self.repo.count_positions().await?,
            total_trades: self.repo.count_trades().await?,
            watching: self.processor().stats().await.watching,
            dropped_events,
        })
    }

    pub async fn stats(&self) -> ProcessorStats {
        self.processor().stats().await
    }

    pub async fn watch_list(&self) -> Vec<WatchedCandidate> {
        self.processor().watch_list().await
    }

    pub async fn positions(&self) -> Result<Vec<Position>, EngineError> {
        Ok(self.repo.list_positions().await?)
    }

    pub async fn recent_trades(&self, limit: u32) -> Result<Vec<Trade>, EngineError> {
        Ok(self.repo.recent_trades(limit).await?)
    }

    pub async fn strategy_stats(&self) -> Result<Vec<StrategyStats>, EngineError> {
        Ok(self.repo.strategy_stats().await?)
    }

    /// Close every open position. Works whether or not the engine is running.
    pub async fn sell_all(&self, reason: &str) -> Result<SellAllSummary, EngineError> {
        Ok(self.executor().sell_all(reason).await?)
    }

    pub fn recent_activity(&self) -> Vec<ActivityEntry> {
        self.activity.recent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MockMarketData;
    use crate::db::repo::test_support::temp_repo;
    use crate::domain::{Event, EventType, Mint, TimeMs};
    use crate::ingest::ReplaySource;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn engine(mock: MockMarketData, config: Config) -> (TempDir, Arc<Engine>, crate::ingest::ReplayHandle) {
        let (dir, repo) = temp_repo().await;
        let (source, handle) = ReplaySource::channel();
        let engine = Engine::new(Arc::new(config), Arc::new(repo), Arc::new(mock))
            .with_source(Some(Arc::new(source)));
        (dir, Arc::new(engine), handle)
    }

    async fn wait_for_state(engine: &Engine, state: EngineState) {
        for _ in 0..200 {
            if engine.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("engine never reached {:?}", state);
    }

    #[tokio::test]
    async fn test_lifecycle_buys_replayed_event() {
        let (_dir, engine, replay) = engine(MockMarketData::new().with_safe_token("m1"), Config::default()).await;
        assert!(matches!(engine.stop(), Err(EngineError::NotRunning)));

        let runner = tokio::spawn({
            let engine = engine.clone();
            async move { engine.start().await }
        });
        wait_for_state(&engine, EngineState::Running).await;
        assert!(matches!(engine.start().await, Err(EngineError::AlreadyRunning)));

        assert!(replay.push(Event::new(Mint::new("m1"), EventType::NewPool, TimeMs::now(), "{}".into())));
        for _ in 0..200 {
            if engine.stats().await.bought == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let status = engine.status().await.unwrap();
        assert!(status.running);
        assert_eq!(status.mode, Mode::DryRun);
        assert_eq!(status.open_positions, 1);
        assert_eq!(status.total_trades, 1);
        assert_eq!(engine.recent_activity().len(), 1);

        engine.stop().unwrap();
        runner.await.unwrap().unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(!engine.status().await.unwrap().running);
    }

    #[tokio::test]
    async fn test_live_without_wallet_degrades_to_dry_run() {
        let mut config = Config::default();
        config.mode = Mode::Live;
        config.solana.wallet_path = "/nonexistent/id.json".into();
        let (_dir, engine, _replay) = engine(MockMarketData::new(), config).await;

        let runner = tokio::spawn({
            let engine = engine.clone();
            async move { engine.start().await }
        });
        wait_for_state(&engine, EngineState::Running).await;
        assert_eq!(engine.mode(), Mode::DryRun);
        engine.stop().unwrap();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_status_readers_share_the_runtime_lock() {
        let (_dir, engine, _replay) = engine(MockMarketData::new(), Config::default()).await;
        let held = engine.runtime();
        assert_eq!(held.state, EngineState::Stopped);
        // Readers proceed while another read guard is alive.
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.mode(), Mode::DryRun);
        let status = engine.status().await.unwrap();
        assert!(!status.running);
        drop(held);
        assert!(matches!(engine.stop(), Err(EngineError::NotRunning)));
    }

    #[tokio::test]
    async fn test_sell_all_when_stopped() {
        let (_dir, engine, _replay) = engine(MockMarketData::new().with_safe_token("m1"), Config::default()).await;
        engine
            .repo
            .create_position(&Position {
                mint: Mint::new("m1"),
                quantity: crate::domain::Decimal::from(20),
                avg_entry_price_usd: crate::domain::Decimal::ONE,
                opened_at: TimeMs::now(),
                last_update_at: TimeMs::now(),
                strategy: "snipe_flip".into(),
            })
            .await
            .unwrap();

        let summary = engine.sell_all("manual").await.unwrap();
        assert_eq!(summary, SellAllSummary { sold: 1, failed: 0 });
        assert!(engine.positions().await.unwrap().is_empty());
    }
}
