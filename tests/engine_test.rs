use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokenscout::config::RiskConfig;
use tokenscout::datasource::TokenInfo;
use tokenscout::ingest::{ReplayHandle, ReplaySource};
use tokenscout::{
    init_db, Config, Decimal, Engine, EngineState, Event, EventType, MarketData, Mint, MockMarketData,
    Repository, Side, TimeMs, TradeStatus,
};

struct TestEngine {
    engine: Arc<Engine>,
    mock: Arc<MockMarketData>,
    repo: Arc<Repository>,
    replay: ReplayHandle,
    runner: tokio::task::JoinHandle<Result<(), tokenscout::EngineError>>,
    _temp: TempDir,
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.rules.min_holders = 5;
    config.risk = RiskConfig {
        stop_loss_pct: Decimal::from(8),
        take_profit_pct: Decimal::from(18),
        max_trade_duration_sec: 240,
    };
    config.timing.recheck_interval = Duration::from_millis(50);
    config.timing.cleanup_interval = Duration::from_millis(50);
    config.timing.monitor_interval = Duration::from_millis(50);
    config.timing.shutdown_grace = Duration::from_secs(2);
    config
}

async fn start_engine(mock: MockMarketData, config: Config) -> TestEngine {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let mock = Arc::new(mock);
    let market: Arc<dyn MarketData> = mock.clone();

    let (source, replay) = ReplaySource::channel();
    let engine = Arc::new(
        Engine::new(Arc::new(config), repo.clone(), market).with_source(Some(Arc::new(source))),
    );
    let runner = tokio::spawn({
        let engine = engine.clone();
        async move { engine.start().await }
    });
    eventually("engine running", || {
        let engine = engine.clone();
        async move { engine.state() == EngineState::Running }
    })
    .await;

    TestEngine {
        engine,
        mock,
        repo,
        replay,
        runner,
        _temp: temp_dir,
    }
}

async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

fn new_pool(mint: &str) -> Event {
    Event::new(Mint::new(mint), EventType::NewPool, TimeMs::now(), "{}".into()).with_pair("pool")
}

impl TestEngine {
    async fn shutdown(self) {
        self.engine.stop().unwrap();
        self.runner.await.unwrap().unwrap();
        assert_eq!(self.engine.state(), EngineState::Stopped);
    }
}

#[tokio::test]
async fn test_watch_promote_then_take_profit() {
    let mock = MockMarketData::new()
        .with_safe_token("m1")
        .with_holders("m1", 3, Decimal::from(10));
    let t = start_engine(mock, fast_config()).await;

    assert!(t.replay.push(new_pool("m1")));
    eventually("m1 watched", || {
        let engine = t.engine.clone();
        async move { engine.stats().await.watching == 1 }
    })
    .await;
    assert_eq!(t.repo.count_trades().await.unwrap(), 0);

    t.mock.set_holders("m1", 6, Decimal::from(10));
    eventually("m1 bought", || {
        let repo = t.repo.clone();
        async move { repo.count_positions().await.unwrap() == 1 }
    })
    .await;

    let position = t.repo.get_position(&Mint::new("m1")).await.unwrap().unwrap();
    assert_eq!(position.avg_entry_price_usd, Decimal::ONE);

    t.mock.set_price("m1", Decimal::from_str("1.20").unwrap());
    eventually("m1 sold", || {
        let repo = t.repo.clone();
        async move { repo.count_positions().await.unwrap() == 0 }
    })
    .await;

    let trades = t.repo.recent_trades(10).await.unwrap();
    assert_eq!(trades.len(), 2);
    assert!(trades.iter().all(|tr| tr.status == TradeStatus::Executed));
    assert!(trades.iter().any(|tr| tr.side == Side::Buy));
    assert!(trades.iter().any(|tr| tr.side == Side::Sell));
    assert_eq!(t.repo.recent_events(10).await.unwrap().len(), 1);

    t.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_and_unsafe_events() {
    let mock = MockMarketData::new()
        .with_safe_token("good")
        .with_safe_token("frozen")
        .with_token(
            "frozen",
            TokenInfo {
                decimals: 6,
                has_freeze_authority: true,
                has_mint_authority: false,
                supply: None,
            },
        );
    let t = start_engine(mock, fast_config()).await;

    t.replay.push(new_pool("good"));
    t.replay.push(new_pool("good"));
    t.replay.push(new_pool("frozen"));
    eventually("events processed", || {
        let engine = t.engine.clone();
        async move {
            let stats = engine.stats().await;
            stats.bought + stats.rejected == 2
        }
    })
    .await;

    let stats = t.engine.stats().await;
    assert_eq!(stats.detected, 2);
    assert_eq!(stats.bought, 1);
    assert_eq!(stats.rejection_reasons.get("freeze_authority"), Some(&1));
    assert_eq!(t.repo.count_positions().await.unwrap(), 1);

    t.shutdown().await;
}
