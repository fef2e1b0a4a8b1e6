use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use blacklist_core::store::AddressStore;

use crate::state::AppState;

/// GET / — service banner.
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "IP Blacklist Service" }))
}

/// GET /health — database reachability; 503 when the store does not answer.
pub async fn health<S: AddressStore>(
    State(app): State<AppState<S>>,
) -> (StatusCode, Json<serde_json::Value>) {
    let database = app.engine.healthcheck().await;
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(serde_json::json!({ "database": database })))
}
