use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::domain::decimal::to_canonical_string;
use crate::domain::Trade;
use crate::error::AppError;

pub const DEFAULT_TRADES_LIMIT: u32 = 20;
pub const MAX_TRADES_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradesResponse {
    pub trades: Vec<TradeDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeDto {
    pub id: i64,
    pub timestamp: i64,
    pub side: String,
    pub mint: String,
    pub quantity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled_quantity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    pub status: String,
    pub strategy: String,
}

impl From<Trade> for TradeDto {
    fn from(trade: Trade) -> Self {
        Self {
            id: trade.id,
            timestamp: trade.timestamp.as_ms(),
            side: trade.side.as_str().to_string(),
            mint: trade.mint.to_string(),
            quantity: to_canonical_string(trade.quantity),
            filled_quantity: trade.filled_quantity.map(to_canonical_string),
            price_usd: trade.price_usd.map(to_canonical_string),
            tx_ref: trade.tx_ref,
            status: trade.status.as_str().to_string(),
            strategy: trade.strategy,
        }
    }
}

/// Newest first. `limit` defaults to 20 and is capped at 500.
pub async fn get_trades(
    Query(params): Query<TradesQuery>,
    State(state): State<AppState>,
) -> Result<Json<TradesResponse>, AppError> {
    let limit = match params.limit {
        None => DEFAULT_TRADES_LIMIT,
        Some(0) => return Err(AppError::BadRequest("limit must be positive".into())),
        Some(n) => n.min(MAX_TRADES_LIMIT),
    };

    let trades = state
        .engine
        .recent_trades(limit)
        .await?
        .into_iter()
        .map(TradeDto::from)
        .collect();
    Ok(Json(TradesResponse { trades }))
}
