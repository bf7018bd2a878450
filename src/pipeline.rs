//! Request Pipeline
//!
//! [`AuthLayer`] wraps any [`Transport`] so that every authenticated call:
//!
//! 1. carries a credential that is not known to be expired (refreshing first if
//!    needed, never sending a stale one), and
//! 2. on a 401, is refreshed and replayed exactly once.
//!
//! Refreshes go through the shared [`RefreshCoordinator`], so any number of
//! concurrent calls cause at most one refresh.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::auth_failure::{AuthFailureHandler, AuthFailureReason};
use crate::credentials::{self, AccessToken, CredentialStore};
use crate::error::ApiError;
use crate::refresh::{RefreshCoordinator, RefreshError, RefreshOutcome};
use crate::transport::{ApiRequest, ApiResponse, Transport, normalize_route};

/// Default paths that never carry a credential
pub const DEFAULT_PUBLIC_PATHS: [&str; 3] =
    ["/api/auth/login", "/api/auth/refresh", "/api/auth/logout"];

/// Builds [`Authenticated`] transports
#[derive(Clone)]
pub struct AuthLayer {
    store: Arc<dyn CredentialStore>,
    coordinator: RefreshCoordinator,
    failures: Arc<AuthFailureHandler>,
    public_paths: Arc<[String]>,
    skew: Duration,
}

impl AuthLayer {
    /// Create a layer with the default public paths and expiry skew
    pub fn new(
        store: Arc<dyn CredentialStore>,
        coordinator: RefreshCoordinator,
        failures: Arc<AuthFailureHandler>,
    ) -> Self {
        Self {
            store,
            coordinator,
            failures,
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| (*p).to_string()).collect(),
            skew: credentials::DEFAULT_EXPIRY_SKEW,
        }
    }

    /// Replace the set of paths that bypass the pipeline
    #[must_use]
    pub fn with_public_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.public_paths = paths
            .into_iter()
            .map(|p| {
                let p: String = p.into();
                normalize_route(&p)
            })
            .collect();
        self
    }

    /// Safety margin applied before a token's expiry
    #[must_use]
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Wrap `inner`
    pub fn layer<T: Transport>(&self, inner: T) -> Authenticated<T> {
        Authenticated {
            inner,
            auth: self.clone(),
        }
    }

    fn is_public(&self, request: &ApiRequest) -> bool {
        if !request.requires_auth() {
            return true;
        }
        let route = request.route();
        self.public_paths.iter().any(|p| *p == route)
    }

    /// Credential to attach before the first send.
    ///
    /// `Ok(None)` means "send anonymously": there is nothing to refresh with and
    /// nothing stale was held, so the server decides.
    async fn credential(&self) -> Result<Option<AccessToken>, ApiError> {
        match self.store.access() {
            Some(token) if !credentials::is_expired_at(token.as_str(), Utc::now(), self.skew) => {
                Ok(Some(token))
            }
            Some(stale) => {
                debug!("Access credential expired, refreshing before send");
                match self.coordinator.refresh_replacing(&stale).await {
                    Ok(RefreshOutcome::Refreshed(token)) => Ok(Some(token)),
                    Ok(RefreshOutcome::NoCredential) => {
                        self.failures.handle(AuthFailureReason::SessionExpired);
                        Err(ApiError::Unauthorized {
                            message: "Session expired".to_string(),
                        })
                    }
                    Err(e) => Err(self.refresh_failed(e)),
                }
            }
            None => match self.coordinator.refresh().await {
                Ok(RefreshOutcome::Refreshed(token)) => Ok(Some(token)),
                Ok(RefreshOutcome::NoCredential) => Ok(None),
                Err(e) => Err(self.refresh_failed(e)),
            },
        }
    }

    fn refresh_failed(&self, e: RefreshError) -> ApiError {
        self.refresh_failure(&e);
        ApiError::RefreshFailed(e)
    }

    /// Route a failed refresh to the handler. A superseded refresh is not a
    /// failure: whoever wrote the store in the meantime owns the session.
    fn refresh_failure(&self, e: &RefreshError) {
        if *e == RefreshError::Superseded {
            debug!("Refresh superseded by a newer credential write");
            return;
        }
        self.failures.handle(AuthFailureReason::RefreshFailed(e.clone()));
    }
}

/// A [`Transport`] with credential handling applied
pub struct Authenticated<T> {
    inner: T,
    auth: AuthLayer,
}

impl<T: Transport> Authenticated<T> {
    /// The wrapped transport
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Refresh and replay once after a 401
    async fn repair(
        &self,
        mut request: ApiRequest,
        sent: Option<AccessToken>,
        unauthorized: ApiError,
    ) -> Result<ApiResponse, ApiError> {
        let auth = &self.auth;

        if request.is_retried() {
            auth.failures.handle(AuthFailureReason::Rejected);
            return Err(unauthorized);
        }
        request.mark_retried();

        let outcome = match &sent {
            Some(stale) => auth.coordinator.refresh_replacing(stale).await,
            None => auth.coordinator.refresh().await,
        };

        let token = match outcome {
            Ok(RefreshOutcome::Refreshed(token)) => token,
            Ok(RefreshOutcome::NoCredential) => {
                auth.failures.handle(AuthFailureReason::SessionExpired);
                return Err(unauthorized);
            }
            Err(e) => {
                auth.refresh_failure(&e);
                return Err(unauthorized);
            }
        };

        request.set_bearer(Some(&token))?;
        info!(method = %request.method, path = %request.path, "Replaying request with refreshed credential");

        match self.inner.send(&request).await {
            Err(e) if e.is_unauthorized() => {
                auth.failures.handle(AuthFailureReason::Rejected);
                Err(e)
            }
            other => other,
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for Authenticated<T> {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        if request.is_foreign() {
            return Err(ApiError::InvalidRequest(format!(
                "'{}' is not a path on the API",
                request.path
            )));
        }
        if self.auth.is_public(request) {
            return self.inner.send(request).await;
        }

        let token = self.auth.credential().await?;
        let mut request = request.clone();
        request.set_bearer(token.as_ref())?;

        match self.inner.send(&request).await {
            Err(e) if e.is_unauthorized() => self.repair(request, token, e).await,
            other => other,
        }
    }
}
