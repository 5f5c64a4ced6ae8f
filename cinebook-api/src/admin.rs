use axum::{extract::State, middleware::from_fn_with_state, routing::get, Json, Router};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

use cinebook_core::{BookingRecord, Show};

use crate::error::AppError;
use crate::middleware::admin_middleware;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub total_bookings: usize,
    pub total_revenue: Decimal,
    pub active_shows: Vec<Show>,
    pub total_user: usize,
}

/// Totals over paid bookings only; unpaid holds are not revenue.
pub fn summarize(bookings: &[BookingRecord]) -> (usize, Decimal) {
    bookings
        .iter()
        .filter(|b| b.is_paid)
        .fold((0, Decimal::ZERO), |(count, revenue), b| (count + 1, revenue + b.amount))
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/is-admin", get(is_admin))
        .route("/api/admin/dashboard", get(dashboard))
        .route("/api/admin/all-shows", get(all_shows))
        .route("/api/admin/all-bookings", get(all_bookings))
        .route_layer(from_fn_with_state(state, admin_middleware))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/admin/is-admin
async fn is_admin() -> Json<Value> {
    Json(json!({ "success": true, "isAdmin": true }))
}

/// GET /api/admin/dashboard
async fn dashboard(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let bookings = state.bookings.list_all().await?;
    let (total_bookings, total_revenue) = summarize(&bookings);
    let active_shows = state.catalog.upcoming(Utc::now()).await?;
    let total_user = state.users.list_users().await?.len();

    let dashboard_data = DashboardData {
        total_bookings,
        total_revenue,
        active_shows,
        total_user,
    };
    Ok(Json(json!({ "success": true, "dashboardData": dashboard_data })))
}

/// GET /api/admin/all-shows
async fn all_shows(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let shows = state.catalog.upcoming(Utc::now()).await?;
    Ok(Json(json!({ "success": true, "shows": shows })))
}

/// GET /api/admin/all-bookings
async fn all_bookings(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let bookings = state.bookings.list_all().await?;
    Ok(Json(json!({ "success": true, "bookings": bookings })))
}
