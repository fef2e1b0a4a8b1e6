use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use blacklist_core::error::BlacklistError;

// ---------------------------------------------------------------------------
// AppError — unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
///
/// Body shape is always `{"error": <message>, "error_code": <code>}`.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

fn status_for(err: &BlacklistError) -> StatusCode {
    match err {
        BlacklistError::InvalidTtl(_)
        | BlacklistError::InvalidAddress(_)
        | BlacklistError::PrivateAddress(_) => StatusCode::BAD_REQUEST,
        BlacklistError::DuplicateAddress(_) => StatusCode::CONFLICT,
        BlacklistError::NotFound(_) => StatusCode::NOT_FOUND,
        BlacklistError::UnknownStatus(_)
        | BlacklistError::InvalidConfig(_)
        | BlacklistError::ExpiryOutOfRange { .. }
        | BlacklistError::Database(_)
        | BlacklistError::Migrate(_)
        | BlacklistError::Io(_)
        | BlacklistError::Yaml(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self.0.downcast_ref::<BlacklistError>() {
            Some(e) => {
                let status = status_for(e);
                // Driver errors can carry connection details; keep them in the log.
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %e, "request failed");
                    "internal server error".to_string()
                } else {
                    e.to_string()
                };
                (status, e.code(), message)
            }
            None => {
                let error = format!("{:#}", self.0);
                tracing::error!(%error, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal server error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message, "error_code": code });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn invalid_ttl_maps_to_400() {
        let response = AppError(BlacklistError::InvalidTtl(0).into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn invalid_address_maps_to_400() {
        let err = AppError(BlacklistError::InvalidAddress("x".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn private_address_maps_to_400() {
        let err = AppError(BlacklistError::PrivateAddress("10.0.0.1".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn duplicate_maps_to_409() {
        let err = AppError(BlacklistError::DuplicateAddress("8.8.8.8".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError(BlacklistError::NotFound("8.8.8.8".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn io_error_maps_to_500() {
        let err = AppError(BlacklistError::Io(std::io::Error::other("disk full")).into());
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn foreign_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn response_is_json() {
        let response = AppError(BlacklistError::InvalidTtl(0).into()).into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
