use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use cinebook_core::webhook::SIGNATURE_HEADER;
use cinebook_order::{ConfirmationError, WebhookOutcome};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/stripe", post(handle_stripe_webhook))
}

/// POST /api/stripe
/// Payment provider callback. The raw body is needed to check the signature.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match state.confirmations.handle(&body, signature, Utc::now()).await {
        Ok(outcome) => {
            if let WebhookOutcome::Confirmed { booking_id } = &outcome {
                state.metrics.bookings_paid.inc();
                info!(%booking_id, "Payment confirmed via webhook");
            }
            Json(json!({ "received": true })).into_response()
        }
        Err(err @ (ConfirmationError::BadSignature(_) | ConfirmationError::MalformedEvent(_))) => {
            state.metrics.webhook_rejections.inc();
            (StatusCode::BAD_REQUEST, err.to_string()).into_response()
        }
        Err(err @ ConfirmationError::Processing(_)) => {
            tracing::error!("Webhook processing failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "received": false }))).into_response()
        }
    }
}
