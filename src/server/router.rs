//! HTTP router and handlers

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    Extension, Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use super::auth::{require_admin, require_bearer, unauthorized_response};
use super::tokens::{TokenClaims, TokenIssuer};
use super::users::{UserDirectory, UserRecord};

/// Shared application state
pub struct AppState {
    /// Token signing and verification
    pub tokens: TokenIssuer,
    /// Accounts and current refresh tokens
    pub users: UserDirectory,
    /// Refresh requests served
    pub refresh_calls: AtomicU64,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/api/users", get(list_users_handler))
        .layer(middleware::from_fn(require_admin));

    let protected = Router::new()
        .route("/api/auth/me", get(me_handler))
        .merge(admin)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            require_bearer,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/refresh", post(refresh_handler))
        .route("/api/auth/logout", post(logout_handler))
        .merge(protected)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn message(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

fn user_json(user: &UserRecord) -> serde_json::Value {
    json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "role": user.role,
    })
}

/// GET /health
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Deserialize)]
struct LoginBody {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// POST /api/auth/login
async fn login_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Response {
    let credentials = body.ok().and_then(|Json(b)| {
        Some((b.email.filter(|e| !e.is_empty())?, b.password.filter(|p| !p.is_empty())?))
    });
    let Some((email, password)) = credentials else {
        return message(StatusCode::BAD_REQUEST, "Email and password are required");
    };

    let Some(user) = state.users.authenticate(&email, &password) else {
        warn!("Login failed");
        return message(StatusCode::UNAUTHORIZED, "Invalid credentials");
    };

    match state.tokens.issue_pair(user) {
        Ok((access, refresh)) => {
            state.users.set_refresh(&user.id, refresh.clone());
            info!(user = %user.id, "User logged in");
            Json(json!({
                "accessToken": access,
                "refreshToken": refresh,
                "user": user_json(user),
            }))
            .into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to sign tokens");
            message(StatusCode::INTERNAL_SERVER_ERROR, "An error occurred during login")
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    #[serde(default)]
    refresh_token: Option<String>,
}

/// POST /api/auth/refresh
async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RefreshBody>, JsonRejection>,
) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::Relaxed);

    let Some(token) = body
        .ok()
        .and_then(|Json(b)| b.refresh_token)
        .filter(|t| !t.is_empty())
    else {
        return message(StatusCode::BAD_REQUEST, "Refresh token is required");
    };

    let claims = match state.tokens.verify_refresh(&token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "Refresh token failed verification");
            return message(StatusCode::UNAUTHORIZED, "Invalid or expired refresh token");
        }
    };

    let user = state.users.by_id(&claims.user_id);
    let Some(user) = user.filter(|u| state.users.is_current_refresh(&u.id, &token)) else {
        warn!(user = %claims.user_id, "Refresh token is not the user's current one");
        return message(StatusCode::UNAUTHORIZED, "Invalid refresh token");
    };

    match state.tokens.issue_pair(user) {
        Ok((access, refresh)) => {
            state.users.set_refresh(&user.id, refresh.clone());
            info!(user = %user.id, "Tokens refreshed");
            Json(json!({ "accessToken": access, "refreshToken": refresh })).into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to sign tokens");
            message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "An error occurred during token refresh",
            )
        }
    }
}

/// POST /api/auth/logout; always succeeds
async fn logout_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RefreshBody>, JsonRejection>,
) -> Response {
    let token = body
        .ok()
        .and_then(|Json(b)| b.refresh_token)
        .filter(|t| !t.is_empty());

    if let Some(token) = token {
        match state.tokens.verify_refresh(&token) {
            Ok(claims) => {
                state.users.clear_refresh(&claims.user_id);
                info!(user = %claims.user_id, "User logged out");
            }
            Err(e) => warn!(error = %e, "Invalid refresh token during logout"),
        }
    }

    message(StatusCode::OK, "Logged out successfully")
}

/// GET /api/auth/me
async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<TokenClaims>,
) -> Response {
    match state.users.by_id(&claims.user_id) {
        Some(user) => Json(json!({ "user": user_json(user) })).into_response(),
        None => unauthorized_response("Unauthorized: Unknown user"),
    }
}

/// GET /api/users (admin only)
async fn list_users_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut users: Vec<_> = state.users.users().map(user_json).collect();
    users.sort_by(|a, b| a["email"].as_str().cmp(&b["email"].as_str()));
    let total = users.len();
    Json(json!({ "users": users, "total": total }))
}
