//! Reference authentication server
//!
//! Serves the login / refresh / logout endpoints the client talks to, plus a
//! protected `GET /api/auth/me`, so the whole credential lifecycle can be run
//! locally (`backoffice serve`) and in integration tests.

mod auth;
mod router;
mod tokens;
mod users;

pub use auth::{require_admin, require_bearer};
pub use router::{AppState, create_router};
pub use tokens::{TokenClaims, TokenIssuer};
pub use users::{UserDirectory, UserRecord, hash_password};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::config::Config;
use crate::{Error, Result};

/// Reference auth server
#[derive(Clone)]
pub struct AuthServer {
    state: Arc<AppState>,
    host: String,
    port: u16,
}

impl AuthServer {
    /// Build from explicit parts, listening on `127.0.0.1` by default
    pub fn new(tokens: TokenIssuer, users: UserDirectory) -> Self {
        Self {
            state: Arc::new(AppState {
                tokens,
                users,
                refresh_calls: AtomicU64::new(0),
            }),
            host: "127.0.0.1".to_string(),
            port: 0,
        }
    }

    /// Build from `server.*` configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate_server()?;
        let server = &config.server;

        let access_secret = server
            .resolve_access_secret()
            .ok_or_else(|| Error::Config("server.access_secret is not set".to_string()))?;
        let refresh_secret = server
            .resolve_refresh_secret()
            .ok_or_else(|| Error::Config("server.refresh_secret is not set".to_string()))?;

        let tokens = TokenIssuer::new(
            &access_secret,
            &refresh_secret,
            server.access_ttl,
            server.refresh_ttl,
        );
        let users = UserDirectory::from_config(&server.users)?;

        Ok(Self {
            host: server.host.clone(),
            port: server.port,
            ..Self::new(tokens, users)
        })
    }

    /// Number of refresh requests served so far
    #[must_use]
    pub fn refresh_calls(&self) -> u64 {
        self.state.refresh_calls.load(Ordering::Relaxed)
    }

    /// The router, for embedding or in-process tests
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Bind the configured address and serve until Ctrl+C / SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.port,
        );
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("BACKOFFICE AUTH SERVER v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(addr = %listener.local_addr()?, "Listening");
        info!(users = self.state.users.len(), "Accounts loaded");
        if self.state.users.is_empty() {
            warn!("No users configured - every login will fail");
        }
        info!("  POST /api/auth/login | /api/auth/refresh | /api/auth/logout");
        info!("  GET  /api/auth/me (bearer) | /api/users (admin) | /health");
        info!("============================================================");

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Internal(e.to_string()))
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
