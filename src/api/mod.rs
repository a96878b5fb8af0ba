pub mod health;
pub mod positions;
pub mod sell_all;
pub mod status;
pub mod strategies;
pub mod trades;

use crate::config::Config;
use crate::orchestration::Engine;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, config: Arc<Config>) -> Self {
        Self { engine, config }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/v1/status", get(status::get_status))
        .route("/v1/positions", get(positions::get_positions))
        .route("/v1/trades", get(trades::get_trades))
        .route("/v1/strategies", get(strategies::get_strategies))
        .route("/v1/sell-all", post(sell_all::sell_all))
        .layer(cors)
        .with_state(state)
}
