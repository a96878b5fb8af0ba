use super::AppState;
use crate::engine::SellAllSummary;
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use tracing::info;

pub const MANUAL_SELL_REASON: &str = "manual_sell_all";

pub async fn sell_all(State(state): State<AppState>) -> Result<Json<SellAllSummary>, AppError> {
    info!("Sell-all requested over HTTP");
    let summary = state.engine.sell_all(MANUAL_SELL_REASON).await?;
    Ok(Json(summary))
}
