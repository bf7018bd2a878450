//! Bearer authentication middleware

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{debug, warn};

use super::router::AppState;
use super::tokens::TokenClaims;

/// Require a valid access token; the verified claims are put in the request
/// extensions for handlers
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim);

    let Some(token) = token.filter(|t| !t.is_empty()) else {
        debug!(path = %path, "Missing bearer token");
        return unauthorized_response("Unauthorized: Missing or invalid token format");
    };

    match state.tokens.verify_access(token) {
        Ok(claims) => {
            debug!(user = %claims.user_id, path = %path, "Authenticated request");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            warn!(path = %path, error = %e, "Invalid access token");
            unauthorized_response("Unauthorized: Invalid token")
        }
    }
}

/// Admin-only routes; must run after [`require_bearer`]
pub async fn require_admin(request: Request<Body>, next: Next) -> Response {
    let is_admin = request
        .extensions()
        .get::<TokenClaims>()
        .is_some_and(|c| c.role == "admin");

    if is_admin {
        next.run(request).await
    } else {
        (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Forbidden: Insufficient permissions" })),
        )
            .into_response()
    }
}

/// Create a 401 Unauthorized response
pub(super) fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(json!({ "message": message })),
    )
        .into_response()
}
