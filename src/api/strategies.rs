use super::AppState;
use crate::domain::StrategyStats;
use crate::error::AppError;
use crate::strategy::{presets, StrategyPreset};
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategiesResponse {
    pub active: String,
    pub presets: Vec<StrategyPreset>,
    pub stats: Vec<StrategyStats>,
}

/// Built-in presets plus per-strategy trade stats.
pub async fn get_strategies(State(state): State<AppState>) -> Result<Json<StrategiesResponse>, AppError> {
    Ok(Json(StrategiesResponse {
        active: state.config.strategy.clone(),
        presets: presets(),
        stats: state.engine.strategy_stats().await?,
    }))
}
