use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use blacklist_core::store::AddressStore;
use subtle::ConstantTimeEq;

use crate::state::AppState;

pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// Gate the internal router behind the shared `X-Internal-Token`.
///
/// 1. No token configured → 403 for every request
/// 2. Header missing or different → 403
/// 3. Header matches → passthrough
pub async fn internal_token_middleware<S: AddressStore>(
    State(app): State<AppState<S>>,
    req: Request,
    next: Next,
) -> Response {
    let authorized = {
        let presented = req
            .headers()
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        match (app.internal_token.as_deref(), presented) {
            (Some(expected), Some(got)) => tokens_match(expected, got),
            _ => false,
        }
    };

    if authorized {
        return next.run(req).await;
    }
    tracing::warn!(path = %req.uri().path(), "internal request rejected");
    forbidden()
}

fn forbidden() -> Response {
    let body = serde_json::json!({ "error": "Invalid token", "error_code": "FORBIDDEN" });
    (StatusCode::FORBIDDEN, Json(body)).into_response()
}

fn tokens_match(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
