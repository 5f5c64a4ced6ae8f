use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};

use cinebook_catalog::AddShowsRequest;

use crate::error::AppError;
use crate::middleware::admin_middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/api/show/add", post(add_shows))
        .route_layer(from_fn_with_state(state, admin_middleware));

    Router::new()
        .route("/api/show/all", get(upcoming_shows))
        .route("/api/show/{movie_id}", get(movie_showtimes))
        .merge(admin)
}

/// POST /api/show/add
async fn add_shows(
    State(state): State<AppState>,
    body: Result<Json<AddShowsRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(request) = body.map_err(|e| AppError::ValidationError(e.body_text()))?;
    state.catalog.add_shows(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": "Show Added successfully." })),
    ))
}

/// GET /api/show/all
async fn upcoming_shows(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let shows = state.catalog.upcoming(Utc::now()).await?;
    Ok(Json(json!({ "success": true, "shows": shows })))
}

/// GET /api/show/{movie_id}
async fn movie_showtimes(
    State(state): State<AppState>,
    Path(movie_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let showtimes = state.catalog.showtimes_for_movie(&movie_id, Utc::now()).await?;
    Ok(Json(json!({
        "success": true,
        "movie": { "id": showtimes.movie_id, "title": showtimes.movie_title },
        "dateTime": showtimes.date_time,
    })))
}
