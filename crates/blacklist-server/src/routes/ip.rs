use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use blacklist_core::store::AddressStore;
use serde::Deserialize;

use super::RecordResponse;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddIpRequest {
    pub ip: String,
    /// Days; the configured default applies when absent.
    #[serde(default)]
    pub ttl: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
}

/// POST /ip/add — blacklist a new address.
pub async fn add_ip<S: AddressStore>(
    State(app): State<AppState<S>>,
    Json(body): Json<AddIpRequest>,
) -> Result<Json<RecordResponse>, AppError> {
    let record = app
        .engine
        .create(&body.ip, body.ttl, body.description)
        .await?;
    Ok(Json(record.into()))
}

/// GET /ip/blacklist — plain-text list, one address per line.
pub async fn blacklist<S: AddressStore>(
    State(app): State<AppState<S>>,
) -> Result<impl IntoResponse, AppError> {
    let addresses = app.engine.list_blacklisted().await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        render_plaintext(&addresses),
    ))
}

fn render_plaintext(addresses: &[String]) -> String {
    let mut body = String::with_capacity(addresses.iter().map(|a| a.len() + 1).sum());
    for address in addresses {
        body.push_str(address);
        body.push('\n');
    }
    body
}
