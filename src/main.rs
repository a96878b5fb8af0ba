use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokenscout::datasource::solana::SolanaEndpoints;
use tokenscout::ingest::build_source;
use tokenscout::{api, init_db, Config, Engine, MarketData, Repository, SolanaMarketData};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Arc::new(Config::from_env().context("configuration error")?);
    tracing::info!(
        mode = %config.mode,
        strategy = %config.strategy,
        listener = ?config.listener.mode,
        "Configuration loaded"
    );

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("failed to initialize database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));
    let market: Arc<dyn MarketData> = Arc::new(SolanaMarketData::new(SolanaEndpoints::from(&config.solana)));

    let engine = Arc::new(
        Engine::new(config.clone(), repo, market).with_source(build_source(&config)),
    );

    let app = api::create_router(api::AppState::new(engine.clone(), config.clone()));
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    let runner = tokio::spawn({
        let engine = engine.clone();
        async move { engine.start().await }
    });

    let server_engine = engine.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
            }
            tracing::info!("Shutdown signal received");
            if let Err(e) = server_engine.stop() {
                tracing::warn!(error = %e, "Engine stop failed");
            }
        })
        .await
        .context("server error")?;

    runner.await.context("engine task panicked")??;
    Ok(())
}
