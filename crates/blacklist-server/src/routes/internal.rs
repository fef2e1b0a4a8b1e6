use axum::extract::State;
use axum::Json;
use blacklist_core::store::AddressStore;
use serde::Deserialize;

use super::RecordResponse;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReactivateRequest {
    pub ip: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /internal/reactivate — put an archived address back on the list.
pub async fn reactivate<S: AddressStore>(
    State(app): State<AppState<S>>,
    Json(body): Json<ReactivateRequest>,
) -> Result<Json<RecordResponse>, AppError> {
    let record = app
        .engine
        .reactivate(&body.ip, body.reason.as_deref())
        .await?;
    Ok(Json(record.into()))
}
