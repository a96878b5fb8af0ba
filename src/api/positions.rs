use crate::api::AppState;
use crate::domain::decimal::to_canonical_string;
use crate::domain::{Position, TimeMs};
use crate::error::AppError;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionsResponse {
    pub positions: Vec<PositionDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionDto {
    pub mint: String,
    pub quantity: String,
    pub avg_entry_price_usd: String,
    pub opened_at: i64,
    pub age_secs: u64,
    pub strategy: String,
}

impl PositionDto {
    fn new(position: Position, now: TimeMs) -> Self {
        Self {
            age_secs: position.age(now).as_secs(),
            mint: position.mint.to_string(),
            quantity: to_canonical_string(position.quantity),
            avg_entry_price_usd: to_canonical_string(position.avg_entry_price_usd),
            opened_at: position.opened_at.as_ms(),
            strategy: position.strategy,
        }
    }
}

pub async fn get_positions(State(state): State<AppState>) -> Result<Json<PositionsResponse>, AppError> {
    let now = TimeMs::now();
    let positions = state
        .engine
        .positions()
        .await?
        .into_iter()
        .map(|p| PositionDto::new(p, now))
        .collect();
    Ok(Json(PositionsResponse { positions }))
}
