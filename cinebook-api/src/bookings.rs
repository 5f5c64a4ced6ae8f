use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use cinebook_core::{BookingRecord, SeatId};
use cinebook_order::BookingRequest;

use crate::error::AppError;
use crate::middleware::{auth_middleware, Claims};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingBody {
    pub show_id: Option<String>,
    pub selected_seats: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OccupiedSeatsResponse {
    success: bool,
    occupied_seats: Vec<SeatId>,
}

#[derive(Debug, Serialize)]
struct BookingsResponse {
    success: bool,
    bookings: Vec<BookingRecord>,
}

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/api/booking/create", post(create_booking))
        .route("/api/user/bookings", get(user_bookings))
        .route_layer(from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/api/booking/seats/{show_id}", get(occupied_seats))
        .merge(protected)
}

/// POST /api/booking/create
async fn create_booking(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    body: Result<Json<CreateBookingBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(body) = body.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let origin = redirect_origin(&headers, &state.frontend_url);

    let created = state
        .workflow
        .create_booking(
            &claims.sub,
            BookingRequest {
                show_id: body.show_id,
                selected_seats: body.selected_seats,
            },
            &origin,
        )
        .await?;

    state.metrics.bookings_created.inc();
    if created.booking.is_paid {
        state.metrics.bookings_paid.inc();
    }
    info!(booking_id = %created.booking.id, user_id = %claims.sub, "Booking accepted");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "url": created.redirect_url })),
    ))
}

/// GET /api/booking/seats/{show_id}
async fn occupied_seats(
    State(state): State<AppState>,
    Path(show_id): Path<String>,
) -> Result<Json<OccupiedSeatsResponse>, AppError> {
    let show_id = Uuid::parse_str(show_id.trim())
        .map_err(|_| AppError::ValidationError("Invalid show ID".into()))?;
    let occupied_seats = state.catalog.occupied_seats(show_id).await?;

    Ok(Json(OccupiedSeatsResponse {
        success: true,
        occupied_seats,
    }))
}

/// GET /api/user/bookings
async fn user_bookings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<BookingsResponse>, AppError> {
    let bookings = state.bookings.list_for_user(&claims.sub).await?;
    Ok(Json(BookingsResponse {
        success: true,
        bookings,
    }))
}

/// Where the client should land after checkout: the page's own origin when
/// the browser says so, else the configured frontend.
pub fn redirect_origin(headers: &HeaderMap, fallback: &str) -> String {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty() && *v != "null")
    };

    if let Some(origin) = header_value(header::ORIGIN) {
        return origin.trim_end_matches('/').to_string();
    }
    if let Some(origin) = header_value(header::REFERER).and_then(origin_of_url) {
        return origin;
    }
    fallback.trim_end_matches('/').to_string()
}

fn origin_of_url(url: &str) -> Option<String> {
    let scheme_end = url.find("://")? + 3;
    let host_end = url[scheme_end..]
        .find(['/', '?', '#'])
        .map(|i| scheme_end + i)
        .unwrap_or(url.len());
    (host_end > scheme_end).then(|| url[..host_end].to_string())
}
