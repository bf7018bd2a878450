//! Client for the authentication endpoints
//!
//! Login, refresh and logout are sent straight to the transport, never through
//! the request pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::credentials::{CredentialPair, RefreshToken};
use crate::error::ApiError;
use crate::refresh::{RefreshClient, RefreshError};
use crate::transport::{ApiRequest, Transport};

/// Endpoint paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPaths {
    /// Login endpoint
    pub login: String,
    /// Refresh endpoint
    pub refresh: String,
    /// Logout endpoint
    pub logout: String,
}

impl Default for AuthPaths {
    fn default() -> Self {
        Self {
            login: "/api/auth/login".to_string(),
            refresh: "/api/auth/refresh".to_string(),
            logout: "/api/auth/logout".to_string(),
        }
    }
}

/// Authenticated user as returned by login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Email
    pub email: String,
    /// Role
    pub role: String,
}

/// Login response body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Access credential
    pub access_token: String,
    /// Refresh credential
    pub refresh_token: String,
    /// Logged-in user
    pub user: User,
}

/// Refresh response body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: String,
}

/// Login / refresh / logout over any [`Transport`]
pub struct HttpAuthApi {
    transport: Arc<dyn Transport>,
    paths: AuthPaths,
}

impl HttpAuthApi {
    /// Create a client sending over `transport`
    pub fn new(transport: Arc<dyn Transport>, paths: AuthPaths) -> Self {
        Self { transport, paths }
    }

    /// Endpoint paths
    #[must_use]
    pub fn paths(&self) -> &AuthPaths {
        &self.paths
    }

    /// Exchange email and password for a credential pair
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let request = ApiRequest::post(&self.paths.login)
            .public()
            .json(json!({ "email": email, "password": password }));

        let response: LoginResponse = self.transport.send(&request).await?.json()?;
        if response.access_token.is_empty() || response.refresh_token.is_empty() {
            return Err(ApiError::Decode(
                "login response is missing a credential".to_string(),
            ));
        }

        info!(user = %response.user.email, role = %response.user.role, "Logged in");
        Ok(response)
    }

    /// Revoke `refresh` on the server; `None` sends an empty body
    pub async fn logout(&self, refresh: Option<&RefreshToken>) -> Result<(), ApiError> {
        let body = match refresh {
            Some(token) => json!({ "refreshToken": token.as_str() }),
            None => json!({}),
        };
        let request = ApiRequest::post(&self.paths.logout).public().json(body);

        self.transport.send(&request).await?;
        debug!(had_refresh = refresh.is_some(), "Server logout acknowledged");
        Ok(())
    }
}

#[async_trait]
impl RefreshClient for HttpAuthApi {
    async fn refresh(&self, token: &RefreshToken) -> Result<CredentialPair, RefreshError> {
        let request = ApiRequest::post(&self.paths.refresh)
            .public()
            .json(json!({ "refreshToken": token.as_str() }));

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(refresh_error)?;
        let body: TokenResponse = response
            .json()
            .map_err(|e| RefreshError::MalformedResponse(e.to_string()))?;

        CredentialPair::from_parts(body.access_token, body.refresh_token).ok_or_else(|| {
            RefreshError::MalformedResponse("response is missing a credential".to_string())
        })
    }
}

fn refresh_error(err: ApiError) -> RefreshError {
    match err {
        ApiError::Unauthorized { message } => RefreshError::Rejected {
            status: 401,
            message,
        },
        ApiError::Forbidden { message } => RefreshError::Rejected {
            status: 403,
            message,
        },
        ApiError::NotFound { message } => RefreshError::Rejected {
            status: 404,
            message,
        },
        ApiError::Validation { status, message } | ApiError::Server { status, message } => {
            RefreshError::Rejected { status, message }
        }
        ApiError::Timeout => RefreshError::Timeout,
        ApiError::Decode(message) => RefreshError::MalformedResponse(message),
        other => RefreshError::Transport(other.to_string()),
    }
}
