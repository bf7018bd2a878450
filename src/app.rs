//! Wiring
//!
//! [`Backoffice`] builds the store, coordinator, failure handler and pipeline
//! from configuration and hands out the pieces. There are no globals; tests build
//! as many independent instances as they like.

use std::sync::Arc;

use tracing::debug;

use crate::api::ApiClient;
use crate::auth_api::{AuthPaths, HttpAuthApi};
use crate::auth_failure::{AuthFailureHandler, ReauthHook, SessionState};
use crate::config::Config;
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::pipeline::AuthLayer;
use crate::refresh::RefreshCoordinator;
use crate::session::Session;
use crate::transport::{HttpTransport, Transport};
use crate::Result;

/// A fully wired back-office client
#[derive(Clone)]
pub struct Backoffice {
    store: Arc<dyn CredentialStore>,
    coordinator: RefreshCoordinator,
    failures: Arc<AuthFailureHandler>,
    session: Session,
    api: ApiClient,
}

impl Backoffice {
    /// Build from configuration with the file-backed credential store
    pub fn from_config(config: &Config, hook: Arc<dyn ReauthHook>) -> Result<Self> {
        let options = config.auth.store_options();
        let store = match &config.auth.store_path {
            Some(path) => FileCredentialStore::open(path, options)?,
            None => FileCredentialStore::default_location(options)?,
        };
        debug!(path = %store.path().display(), "Using credential store");
        Self::with_store(config, Arc::new(store), hook)
    }

    /// Build from configuration around an existing store
    pub fn with_store(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        hook: Arc<dyn ReauthHook>,
    ) -> Result<Self> {
        config.validate()?;

        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(&config.api.base_url, config.api.timeout)?);

        let auth_api = Arc::new(HttpAuthApi::new(
            Arc::clone(&transport),
            AuthPaths {
                login: config.auth.login_path.clone(),
                refresh: config.auth.refresh_path.clone(),
                logout: config.auth.logout_path.clone(),
            },
        ));

        let coordinator = RefreshCoordinator::new(
            Arc::clone(&store),
            auth_api.clone(),
            config.auth.refresh_timeout,
        )
        .with_expiry_skew(config.auth.expiry_skew);

        let failures = Arc::new(AuthFailureHandler::new(Arc::clone(&store), hook));

        let pipeline = AuthLayer::new(Arc::clone(&store), coordinator.clone(), Arc::clone(&failures))
            .with_public_paths(config.auth.all_public_paths())
            .with_expiry_skew(config.auth.expiry_skew)
            .layer(transport);

        let session = Session::new(auth_api, Arc::clone(&store), Arc::clone(&failures));

        Ok(Self {
            store,
            coordinator,
            failures,
            session,
            api: ApiClient::new(Arc::new(pipeline)),
        })
    }

    /// Authenticated API client
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Login / logout
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Credential store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Refresh coordinator
    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Current session state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.failures.state()
    }

    /// Watch session state transitions
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<SessionState> {
        self.failures.subscribe()
    }
}
