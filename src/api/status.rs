use super::AppState;
use crate::engine::{ActivityEntry, ProcessorStats};
use crate::error::AppError;
use crate::orchestration::EngineStatus;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub engine: EngineStatus,
    pub stats: ProcessorStats,
    pub watch_list: Vec<WatchedDto>,
    pub recent_activity: Vec<ActivityEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedDto {
    pub mint: String,
    pub first_seen_at: i64,
    pub last_checked_at: i64,
    pub check_count: u32,
    pub reason: String,
}

pub async fn get_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let engine = state.engine.status().await?;
    let stats = state.engine.stats().await;
    let watch_list = state
        .engine
        .watch_list()
        .await
        .into_iter()
        .map(|c| WatchedDto {
            mint: c.mint.to_string(),
            first_seen_at: c.first_seen_at.as_ms(),
            last_checked_at: c.last_checked_at.as_ms(),
            check_count: c.check_count,
            reason: c.reject_reason.message,
        })
        .collect();

    Ok(Json(StatusResponse {
        engine,
        stats,
        watch_list,
        recent_activity: state.engine.recent_activity(),
    }))
}
