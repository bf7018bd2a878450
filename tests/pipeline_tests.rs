//! End-to-end tests of the authenticated request pipeline
//!
//! Every test runs a real reference server on an ephemeral port and drives it
//! through the full client stack:
//! - transparent refresh of an expired access credential
//! - single-flight refresh under concurrency
//! - one retry after a 401 for a credential the client believed valid
//! - once-per-episode re-login signalling

mod common;

use std::time::Duration;

use backoffice_client::ApiError;
use backoffice_client::auth_failure::SessionState;
use backoffice_client::credentials::CredentialStore;
use backoffice_client::server::TokenIssuer;
use backoffice_client::transport::ApiRequest;
use futures::future::join_all;
use pretty_assertions::assert_eq;
use serde_json::Value;

use common::{EMAIL, TestServer, admin};

const LONG_TTL: Duration = Duration::from_secs(15 * 60);

#[tokio::test]
async fn test_login_then_authenticated_call() {
    let server = TestServer::start(LONG_TTL).await;
    let client = server.client();

    let user = client.app.session().login(EMAIL, common::PASSWORD).await.unwrap();
    assert_eq!(user.role, "admin");
    assert_eq!(client.app.state(), SessionState::SignedIn);

    let me: Value = client.app.api().get("/api/auth/me").await.unwrap();
    assert_eq!(me["user"]["email"], EMAIL);
    assert_eq!(server.refresh_calls(), 0);
}

#[tokio::test]
async fn test_short_lived_access_is_refreshed_before_sending() {
    // A 10s access token is already "expired" under the default 30s skew.
    let server = TestServer::start(Duration::from_secs(10)).await;
    let client = server.client();
    client.login().await;
    let issued = client.store.access().unwrap();

    let me: Value = client.app.api().get("/api/auth/me").await.unwrap();

    assert_eq!(me["user"]["id"], "1");
    assert_eq!(server.refresh_calls(), 1);
    assert_ne!(client.store.access().unwrap(), issued);
    assert_eq!(client.hook.count(), 0);
}

#[tokio::test]
async fn test_concurrent_expired_calls_share_one_refresh() {
    let server = TestServer::start(LONG_TTL).await;
    let client = server.client();
    client.login().await;
    client.replace_access("expired-and-unreadable");

    let api = client.app.api();
    let results = join_all((0..8).map(|_| api.get::<Value>("/api/auth/me"))).await;

    for result in results {
        assert_eq!(result.unwrap()["user"]["email"], EMAIL);
    }
    assert_eq!(server.refresh_calls(), 1);
    assert_eq!(client.app.coordinator().refresh_count(), 1);
    assert!(!client.app.coordinator().is_refreshing());
}

#[tokio::test]
async fn test_concurrent_calls_across_tasks_share_one_refresh() {
    let server = TestServer::start(LONG_TTL).await;
    let client = server.client();
    client.login().await;
    client.replace_access("expired-and-unreadable");

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let api = client.app.api().clone();
            tokio::spawn(async move { api.get::<Value>("/api/auth/me").await })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
    assert_eq!(server.refresh_calls(), 1);
}

#[tokio::test]
async fn test_rejected_credential_is_repaired_with_one_retry() {
    let server = TestServer::start(LONG_TTL).await;
    let client = server.client();
    client.login().await;

    // Unexpired but signed with a key the server does not know.
    let foreign = TokenIssuer::new("other-access", "other-refresh", LONG_TTL, LONG_TTL);
    let (forged, _) = foreign.issue_pair(&admin()).unwrap();
    client.replace_access(&forged);

    let me: Value = client.app.api().get("/api/auth/me").await.unwrap();

    assert_eq!(me["user"]["name"], "Admin User");
    assert_eq!(server.refresh_calls(), 1);
    assert_eq!(client.hook.count(), 0);
}

#[tokio::test]
async fn test_revoked_refresh_signals_relogin_once() {
    let server = TestServer::start(LONG_TTL).await;
    let first = server.client();
    first.login().await;
    first.replace_access("expired-and-unreadable");

    // Logging in elsewhere rotates the user's refresh token.
    let second = server.client();
    second.login().await;

    let err = first.app.api().get::<Value>("/api/auth/me").await.unwrap_err();
    assert!(matches!(err, ApiError::RefreshFailed(_)), "got {err:?}");
    assert_eq!(first.hook.count(), 1);
    assert_eq!(first.app.state(), SessionState::SignedOut);
    assert!(first.store.pair().is_none());

    // Same episode: the next call goes out anonymously and fails without a second signal.
    let err = first.app.api().get::<Value>("/api/auth/me").await.unwrap_err();
    assert!(err.is_unauthorized(), "got {err:?}");
    assert_eq!(first.hook.count(), 1);

    // The other session is unaffected.
    assert!(second.app.api().get::<Value>("/api/auth/me").await.is_ok());
    assert_eq!(second.hook.count(), 0);
}

#[tokio::test]
async fn test_login_rearms_the_failure_episode() {
    let server = TestServer::start(LONG_TTL).await;
    let client = server.client();
    client.login().await;
    client.replace_access("expired-and-unreadable");
    server.client().login().await;

    assert!(client.app.api().get::<Value>("/api/auth/me").await.is_err());
    assert_eq!(client.hook.count(), 1);

    client.login().await;
    assert_eq!(client.app.state(), SessionState::SignedIn);
    client.replace_access("expired-and-unreadable");
    server.client().login().await;

    assert!(client.app.api().get::<Value>("/api/auth/me").await.is_err());
    assert_eq!(client.hook.count(), 2);
}

#[tokio::test]
async fn test_anonymous_call_to_protected_route_is_unauthorized() {
    let server = TestServer::start(LONG_TTL).await;
    let client = server.client();

    let err = client.app.api().get::<Value>("/api/auth/me").await.unwrap_err();

    assert_eq!(
        err,
        ApiError::Unauthorized {
            message: "Unauthorized: Missing or invalid token format".to_string()
        }
    );
    assert_eq!(server.refresh_calls(), 0);
}

#[tokio::test]
async fn test_forbidden_passes_through_without_refresh() {
    let server = TestServer::start(LONG_TTL).await;
    let client = server.client();
    client
        .app
        .session()
        .login("staff@example.com", "staff pw")
        .await
        .unwrap();

    let err = client.app.api().get::<Value>("/api/users").await.unwrap_err();

    assert!(matches!(err, ApiError::Forbidden { .. }), "got {err:?}");
    assert_eq!(server.refresh_calls(), 0);
    assert_eq!(client.app.state(), SessionState::SignedIn);
}

#[tokio::test]
async fn test_admin_lists_users_with_query() {
    let server = TestServer::start(LONG_TTL).await;
    let client = server.client();
    client.login().await;

    let res = client
        .app
        .api()
        .send(&ApiRequest::get("/api/users").query("page", "1"))
        .await
        .unwrap();
    let body: Value = res.json().unwrap();

    assert_eq!(body["total"], 2);
    assert_eq!(body["users"][0]["email"], EMAIL);
}

#[tokio::test]
async fn test_public_path_never_carries_credential() {
    let server = TestServer::start(LONG_TTL).await;
    let client = server.client();

    let health: Value = client.app.api().get("/health").await.unwrap();

    assert_eq!(health["status"], "ok");
    assert_eq!(server.refresh_calls(), 0);
}

#[tokio::test]
async fn test_foreign_origin_is_refused() {
    let server = TestServer::start(LONG_TTL).await;
    let client = server.client();
    client.login().await;

    let err = client
        .app
        .api()
        .get::<Value>("https://evil.example.com/steal")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::InvalidRequest(_)), "got {err:?}");
}

#[tokio::test]
async fn test_unreachable_server_is_a_network_error() {
    let server = TestServer::start(LONG_TTL).await;
    let mut config = server.config();
    config.api.base_url = "http://127.0.0.1:1".to_string();
    let client = server.client_with(config);

    let err = client.app.api().get::<Value>("/health").await.unwrap_err();

    assert!(
        matches!(err, ApiError::Network(_) | ApiError::Timeout),
        "got {err:?}"
    );
}
