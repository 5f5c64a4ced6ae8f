use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use cinebook_catalog::CatalogError;
use cinebook_core::repository::StoreError;
use cinebook_order::BookingError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    /// Server-side misconfiguration or corrupt data; the message is safe to show.
    ConfigurationError(String),
    UpstreamError(String),
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::ConfigurationError(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::UpstreamError(msg) => {
                tracing::warn!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "message": message,
        }));

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::InvalidInput(_) => AppError::ValidationError(message),
            BookingError::Unauthenticated => AppError::AuthenticationError(message),
            BookingError::SeatsUnavailable(_) => AppError::ConflictError(message),
            BookingError::NotFound(_) => AppError::NotFoundError(message),
            BookingError::ConfigError(_) | BookingError::InvalidState(_) => AppError::ConfigurationError(message),
            BookingError::UpstreamError(_) => AppError::UpstreamError(message),
            BookingError::Internal(_) => AppError::InternalServerError(message),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::InvalidInput(msg) => AppError::ValidationError(msg),
            CatalogError::NotFound(msg) => AppError::NotFoundError(msg),
            CatalogError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinebook_core::SeatId;

    fn status_of(err: BookingError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_booking_error_status_mapping() {
        let seat: SeatId = "A1".parse().unwrap();
        assert_eq!(status_of(BookingError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(BookingError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(BookingError::SeatsUnavailable(vec![seat])), StatusCode::CONFLICT);
        assert_eq!(status_of(BookingError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(BookingError::ConfigError("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_of(BookingError::InvalidState("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_of(BookingError::UpstreamError("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_of(BookingError::Internal("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
