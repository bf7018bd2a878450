//! Test doubles shared by unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::auth_failure::{AuthFailureReason, ReauthHook};
use crate::credentials::{CredentialPair, RefreshToken};
use crate::error::ApiError;
use crate::refresh::{RefreshClient, RefreshError};
use crate::transport::{ApiRequest, ApiResponse, Transport};

static TOKEN_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Unsigned JWT-shaped token carrying `payload`
pub(crate) fn token_with_payload(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.signature")
}

/// Distinct token whose `exp` is `secs` from now (negative for the past)
pub(crate) fn token_expiring_in(secs: i64) -> String {
    token_with_payload(&json!({
        "userId": "u-1",
        "email": "ops@example.com",
        "role": "admin",
        "exp": chrono::Utc::now().timestamp() + secs,
        "jti": TOKEN_SEQ.fetch_add(1, Ordering::Relaxed),
    }))
}

/// Refresh client that counts calls and returns fresh pairs or a fixed error
pub(crate) struct FakeRefreshClient {
    result: Option<RefreshError>,
    delay: Duration,
    calls: AtomicUsize,
    presented: Mutex<Vec<String>>,
}

impl FakeRefreshClient {
    /// Issues `refresh-N` with an access token valid for 15 minutes
    pub(crate) fn succeeding() -> Self {
        Self {
            result: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            presented: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing(error: RefreshError) -> Self {
        Self {
            result: Some(error),
            ..Self::succeeding()
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens presented, in call order
    pub(crate) fn presented(&self) -> Vec<String> {
        self.presented.lock().clone()
    }
}

#[async_trait]
impl RefreshClient for FakeRefreshClient {
    async fn refresh(&self, token: &RefreshToken) -> Result<CredentialPair, RefreshError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.presented.lock().push(token.as_str().to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(e) = &self.result {
            return Err(e.clone());
        }
        CredentialPair::from_parts(token_expiring_in(15 * 60), format!("refresh-{n}"))
            .ok_or_else(|| RefreshError::MalformedResponse("empty token".to_string()))
    }
}

/// Hook that records every signal
#[derive(Default)]
pub(crate) struct RecordingHook {
    reasons: Mutex<Vec<AuthFailureReason>>,
}

impl RecordingHook {
    pub(crate) fn reasons(&self) -> Vec<AuthFailureReason> {
        self.reasons.lock().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.reasons.lock().len()
    }
}

impl ReauthHook for RecordingHook {
    fn reauthenticate(&self, reason: &AuthFailureReason) {
        self.reasons.lock().push(reason.clone());
    }
}

type Responder = dyn Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync;

/// Transport answering from a closure and recording what was sent
pub(crate) struct ScriptedTransport {
    respond: Arc<Responder>,
    delay: Duration,
    sent: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new<F>(respond: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    {
        Self {
            respond: Arc::new(respond),
            delay: Duration::ZERO,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn sends(&self) -> usize {
        self.sent.lock().len()
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.sent.lock().clone()
    }

    /// Bearer credential of each send, in order
    pub(crate) fn bearers(&self) -> Vec<Option<String>> {
        self.sent
            .lock()
            .iter()
            .map(|r| r.bearer().map(str::to_string))
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.sent.lock().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(request)
    }
}
