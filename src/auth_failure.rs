//! Auth-Failure Handler
//!
//! Invoked when a credential can no longer be repaired. Clears the store and
//! tells the host to re-authenticate, once per failure episode.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::credentials::CredentialStore;
use crate::refresh::RefreshError;

/// Why the session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailureReason {
    /// Access credential expired and no refresh credential was stored
    SessionExpired,
    /// Refresh call failed
    RefreshFailed(RefreshError),
    /// Server rejected the call again after a successful refresh
    Rejected,
}

impl fmt::Display for AuthFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionExpired => f.write_str("session expired"),
            Self::RefreshFailed(e) => write!(f, "{e}"),
            Self::Rejected => f.write_str("credential rejected after refresh"),
        }
    }
}

/// Observable authentication state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// A credential pair is held
    SignedIn,
    /// No usable credentials; the user must log in
    SignedOut,
}

/// Host callback for "the user must log in again"
pub trait ReauthHook: Send + Sync {
    /// Called at most once per failure episode
    fn reauthenticate(&self, reason: &AuthFailureReason);
}

/// Hook that only logs; used by the CLI
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReauthHook;

impl ReauthHook for LogReauthHook {
    fn reauthenticate(&self, reason: &AuthFailureReason) {
        warn!(reason = %reason, "Session ended, run `backoffice login` to sign in again");
    }
}

/// Clears credentials and signals the host once per episode
pub struct AuthFailureHandler {
    store: Arc<dyn CredentialStore>,
    hook: Arc<dyn ReauthHook>,
    /// Set once the current episode has been signaled
    signaled: AtomicBool,
    state: watch::Sender<SessionState>,
}

impl AuthFailureHandler {
    /// Create a handler; the initial state reflects what the store holds
    pub fn new(store: Arc<dyn CredentialStore>, hook: Arc<dyn ReauthHook>) -> Self {
        let initial = if store.refresh().is_some() {
            SessionState::SignedIn
        } else {
            SessionState::SignedOut
        };
        let (state, _) = watch::channel(initial);
        Self {
            store,
            hook,
            signaled: AtomicBool::new(false),
            state,
        }
    }

    /// Handle an unrecoverable failure.
    ///
    /// Always clears the store. Returns `true` if this call signaled the host,
    /// `false` if the episode had already been signaled.
    pub fn handle(&self, reason: AuthFailureReason) -> bool {
        self.store.clear();

        if self.signaled.swap(true, Ordering::AcqRel) {
            debug!(reason = %reason, "Auth failure already signaled for this episode");
            return false;
        }

        warn!(reason = %reason, "Authentication failed, credentials cleared");
        self.state.send_replace(SessionState::SignedOut);
        self.hook.reauthenticate(&reason);
        true
    }

    /// Start a new episode; called after a successful login
    pub fn rearm(&self) {
        self.signaled.store(false, Ordering::Release);
        self.state.send_replace(SessionState::SignedIn);
    }

    /// Record a deliberate sign-out without signaling the host
    pub fn signed_out(&self) {
        self.signaled.store(true, Ordering::Release);
        self.state.send_replace(SessionState::SignedOut);
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }
}
