//! Login state of the current user

use std::sync::Arc;

use tracing::{info, warn};

use crate::auth_api::{HttpAuthApi, User};
use crate::auth_failure::AuthFailureHandler;
use crate::credentials::{self, Claims, CredentialPair, CredentialStore};
use crate::error::ApiError;

/// Login, logout and "who am I"
#[derive(Clone)]
pub struct Session {
    api: Arc<HttpAuthApi>,
    store: Arc<dyn CredentialStore>,
    failures: Arc<AuthFailureHandler>,
}

impl Session {
    /// Create a session over shared components
    pub fn new(
        api: Arc<HttpAuthApi>,
        store: Arc<dyn CredentialStore>,
        failures: Arc<AuthFailureHandler>,
    ) -> Self {
        Self {
            api,
            store,
            failures,
        }
    }

    /// Log in and store the new credential pair
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let response = self.api.login(email, password).await?;
        let pair = CredentialPair::from_parts(response.access_token, response.refresh_token)
            .ok_or_else(|| ApiError::Decode("login response is missing a credential".to_string()))?;

        self.store.set_pair(pair);
        self.failures.rearm();
        Ok(response.user)
    }

    /// Log out.
    ///
    /// Local credentials are cleared even if the server cannot be reached; the
    /// server error is still returned.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let refresh = self.store.refresh();
        let result = self.api.logout(refresh.as_ref()).await;

        self.store.clear();
        self.failures.signed_out();

        match &result {
            Ok(()) => info!("Logged out"),
            Err(e) => warn!(error = %e, "Server logout failed, local credentials cleared anyway"),
        }
        result
    }

    /// Claims of the stored access credential
    #[must_use]
    pub fn current_user(&self) -> Option<Claims> {
        self.store
            .access()
            .and_then(|token| credentials::parse(token.as_str()))
    }

    /// Whether a usable or repairable credential is held
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.store.refresh().is_some()
            || self
                .store
                .access()
                .is_some_and(|token| !credentials::is_expired(token.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use reqwest::StatusCode;

    use super::*;
    use crate::auth_api::AuthPaths;
    use crate::auth_failure::SessionState;
    use crate::credentials::MemoryCredentialStore;
    use crate::refresh::{RefreshCoordinator, RefreshError};
    use crate::testing::{FakeRefreshClient, RecordingHook, ScriptedTransport, token_expiring_in};
    use crate::transport::{ApiRequest, ApiResponse};

    fn session(transport: ScriptedTransport) -> (Arc<MemoryCredentialStore>, Arc<AuthFailureHandler>, Session) {
        let store = Arc::new(MemoryCredentialStore::new());
        let failures = Arc::new(AuthFailureHandler::new(
            store.clone(),
            Arc::new(RecordingHook::default()),
        ));
        let api = Arc::new(HttpAuthApi::new(Arc::new(transport), AuthPaths::default()));
        let session = Session::new(api, store.clone(), failures.clone());
        (store, failures, session)
    }

    fn login_ok(access: String) -> ScriptedTransport {
        ScriptedTransport::new(move |req: &ApiRequest| {
            if req.path.ends_with("/login") {
                let body = serde_json::json!({
                    "accessToken": access,
                    "refreshToken": "r-1",
                    "user": {"id": "u-1", "name": "Ops", "email": "ops@example.com", "role": "admin"},
                });
                Ok(ApiResponse::new(StatusCode::OK, body.to_string()))
            } else {
                Ok(ApiResponse::new(
                    StatusCode::OK,
                    r#"{"message":"Logged out successfully"}"#,
                ))
            }
        })
    }

    #[tokio::test]
    async fn login_stores_pair_and_signs_in() {
        let token = token_expiring_in(15 * 60);
        let (store, failures, session) = session(login_ok(token.clone()));
        assert!(!session.is_authenticated());

        let user = session.login("ops@example.com", "secret").await.unwrap();

        assert_eq!(user.role, "admin");
        assert_eq!(store.access().unwrap().as_str(), token);
        assert_eq!(store.refresh().unwrap().as_str(), "r-1");
        assert_eq!(failures.state(), SessionState::SignedIn);
        assert!(session.is_authenticated());
        assert_eq!(session.current_user().unwrap().email.as_deref(), Some("ops@example.com"));
    }

    #[tokio::test]
    async fn failed_login_stores_nothing() {
        let (store, _, session) = session(ScriptedTransport::new(|_| {
            Err(ApiError::Unauthorized {
                message: "Invalid credentials".to_string(),
            })
        }));

        let err = session.login("ops@example.com", "wrong").await.unwrap_err();

        assert!(err.is_unauthorized());
        assert!(store.pair().is_none());
    }

    #[tokio::test]
    async fn logout_clears_even_when_server_fails() {
        let (store, failures, session) =
            session(ScriptedTransport::new(|_| Err(ApiError::Network("down".to_string()))));
        store.set_pair(CredentialPair::from_parts("a", "r").unwrap());

        assert!(session.logout().await.is_err());

        assert!(store.pair().is_none());
        assert_eq!(failures.state(), SessionState::SignedOut);
    }

    #[tokio::test]
    async fn logout_during_refresh_stays_logged_out() {
        let (store, failures, session) = session(login_ok(String::new()));
        store.set_pair(CredentialPair::from_parts(token_expiring_in(-10), "r-0").unwrap());
        let refresher = Arc::new(
            FakeRefreshClient::succeeding().with_delay(Duration::from_millis(50)),
        );
        let coordinator =
            RefreshCoordinator::new(store.clone(), refresher.clone(), Duration::from_secs(5));

        let pending = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.logout().await.unwrap();

        let outcome = pending.await.unwrap();

        assert_eq!(outcome, Err(RefreshError::Superseded));
        assert_eq!(refresher.calls(), 1);
        assert!(store.pair().is_none());
        assert!(!session.is_authenticated());
        assert_eq!(failures.state(), SessionState::SignedOut);
    }

    #[tokio::test]
    async fn logout_without_credentials_succeeds() {
        let (store, _, session) = session(login_ok(String::new()));

        session.logout().await.unwrap();

        assert!(store.pair().is_none());
        assert!(session.current_user().is_none());
    }
}
