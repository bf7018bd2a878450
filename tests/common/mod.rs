//! Shared harness: a reference server on an ephemeral port plus client builders

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use backoffice_client::app::Backoffice;
use backoffice_client::auth_failure::{AuthFailureReason, ReauthHook};
use backoffice_client::config::Config;
use backoffice_client::credentials::{CredentialPair, CredentialStore, MemoryCredentialStore};
use backoffice_client::server::{AuthServer, TokenIssuer, UserDirectory, UserRecord};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

pub const EMAIL: &str = "admin@example.com";
pub const PASSWORD: &str = "correct horse";

pub const ACCESS_SECRET: &str = "test-access-secret";
pub const REFRESH_SECRET: &str = "test-refresh-secret";

pub fn admin() -> UserRecord {
    UserRecord::new("1", EMAIL, "Admin User", "admin", PASSWORD)
}

pub fn staff() -> UserRecord {
    UserRecord::new("2", "staff@example.com", "Staff User", "staff", "staff pw")
}

/// Running reference server; shuts down on drop
pub struct TestServer {
    pub server: AuthServer,
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start(access_ttl: Duration) -> Self {
        let tokens = TokenIssuer::new(
            ACCESS_SECRET,
            REFRESH_SECRET,
            access_ttl,
            Duration::from_secs(3600),
        );
        let server = AuthServer::new(tokens, UserDirectory::new([admin(), staff()]));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(server.clone().serve(listener, async {
            let _ = rx.await;
        }));

        Self {
            server,
            base_url: format!("http://{addr}"),
            shutdown: Some(tx),
        }
    }

    pub fn refresh_calls(&self) -> u64 {
        self.server.refresh_calls()
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.api.base_url.clone_from(&self.base_url);
        config.api.timeout = Duration::from_secs(5);
        config.auth.refresh_timeout = Duration::from_secs(5);
        config
    }

    /// Independent client with its own in-memory store
    pub fn client(&self) -> Client {
        self.client_with(self.config())
    }

    pub fn client_with(&self, config: Config) -> Client {
        let store = Arc::new(MemoryCredentialStore::new());
        let hook = Arc::new(CountingHook::default());
        let app = Backoffice::with_store(&config, store.clone(), hook.clone()).unwrap();
        Client { app, store, hook }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub struct Client {
    pub app: Backoffice,
    pub store: Arc<MemoryCredentialStore>,
    pub hook: Arc<CountingHook>,
}

impl Client {
    pub async fn login(&self) {
        self.app.session().login(EMAIL, PASSWORD).await.unwrap();
    }

    /// Replace the stored access credential, keeping the refresh credential
    pub fn replace_access(&self, access: &str) {
        let refresh = self.store.refresh().unwrap();
        self.store
            .set_pair(CredentialPair::from_parts(access, refresh.as_str()).unwrap());
    }
}

/// Re-login hook that records every signal
#[derive(Default)]
pub struct CountingHook {
    calls: AtomicUsize,
    reasons: Mutex<Vec<String>>,
}

impl CountingHook {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().clone()
    }
}

impl ReauthHook for CountingHook {
    fn reauthenticate(&self, reason: &AuthFailureReason) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reasons.lock().push(reason.to_string());
    }
}
