use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use cinebook_core::User;
use cinebook_shared::Masked;

use crate::error::AppError;
use crate::state::AppState;

const ADMIN_ROLE: &str = "admin";

// ============================================================================
// JWT Claims
// ============================================================================

/// Session token issued by the external identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ADMIN_ROLE)
    }
}

fn bearer_claims(req: &Request, secret: &str) -> Result<Claims, AppError> {
    let unauthenticated = || AppError::AuthenticationError("Authentication required. Please login to proceed.".into());

    let Authorization(bearer) = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(unauthenticated)?;

    decode::<Claims>(bearer.token(), &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| {
            warn!(error = %e, "Rejected bearer token");
            unauthenticated()
        })
}

// ============================================================================
// Customer Authentication Middleware
// ============================================================================

/// Any signed-in user. Keeps the user directory in step with the token so
/// notifications can find an address.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_claims(&req, &state.auth.secret)?;

    if let Some(email) = claims.email.as_deref().filter(|e| !e.is_empty()) {
        let user = User::new(claims.sub.clone(), email, claims.name.clone().unwrap_or_default());
        if let Err(e) = state.users.upsert_user(&user).await {
            warn!(user_id = %claims.sub, email = %Masked(email), error = %e, "Failed to record user");
        }
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

pub async fn admin_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = bearer_claims(&req, &state.auth.secret)?;

    if !claims.is_admin() {
        return Err(AppError::AuthorizationError("not authorized".into()));
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
