//! Single-flight refresh
//!
//! State machine: Idle → Refreshing → Idle. The in-flight slot is checked and
//! filled under one lock acquisition with no `.await` in between, so two callers
//! can never both start a refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{RefreshClient, RefreshError, RefreshOutcome};
use crate::credentials::{self, AccessToken, CredentialStore, RefreshToken};

type PendingRefresh = Shared<BoxFuture<'static, Result<AccessToken, RefreshError>>>;

/// Coordinates credential refreshes across all callers
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
    skew: Duration,
}

struct Inner {
    store: Arc<dyn CredentialStore>,
    client: Arc<dyn RefreshClient>,
    timeout: Duration,
    /// `Some` while Refreshing
    in_flight: Mutex<Option<PendingRefresh>>,
    /// Refresh calls started
    started: AtomicU64,
}

impl RefreshCoordinator {
    /// Create a coordinator; every refresh call is bounded by `timeout`
    pub fn new(
        store: Arc<dyn CredentialStore>,
        client: Arc<dyn RefreshClient>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                client,
                timeout,
                in_flight: Mutex::new(None),
                started: AtomicU64::new(0),
            }),
            skew: credentials::DEFAULT_EXPIRY_SKEW,
        }
    }

    /// Skew used by [`Self::refresh_replacing`] to judge whether the stored
    /// credential is already fresh
    #[must_use]
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Obtain a new access credential.
    ///
    /// Joins the in-flight refresh if there is one. Resolves to
    /// [`RefreshOutcome::NoCredential`] without any network call when no refresh
    /// credential is stored. On failure the store has been cleared.
    pub async fn refresh(&self) -> Result<RefreshOutcome, RefreshError> {
        self.refresh_inner(None).await
    }

    /// Like [`Self::refresh`], for a caller that observed `stale` as unusable.
    ///
    /// When Idle and the store already holds a different, unexpired access
    /// credential, another caller has refreshed in the meantime and that
    /// credential is returned without a network call.
    pub async fn refresh_replacing(
        &self,
        stale: &AccessToken,
    ) -> Result<RefreshOutcome, RefreshError> {
        self.refresh_inner(Some(stale)).await
    }

    /// Whether a refresh is currently executing
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Number of refresh network calls started so far
    #[must_use]
    pub fn refresh_count(&self) -> u64 {
        self.inner.started.load(Ordering::Relaxed)
    }

    async fn refresh_inner(
        &self,
        stale: Option<&AccessToken>,
    ) -> Result<RefreshOutcome, RefreshError> {
        let pending = {
            let mut slot = self.inner.in_flight.lock();
            if let Some(pending) = slot.as_ref() {
                debug!("Joining in-flight refresh");
                pending.clone()
            } else {
                if let Some(stale) = stale {
                    if let Some(current) = self.inner.store.access() {
                        if &current != stale
                            && !credentials::is_expired_at(
                                current.as_str(),
                                chrono::Utc::now(),
                                self.skew,
                            )
                        {
                            debug!("Credential already refreshed by another caller");
                            return Ok(RefreshOutcome::Refreshed(current));
                        }
                    }
                }

                let generation = self.inner.store.generation();
                let Some(refresh_token) = self.inner.store.refresh() else {
                    debug!("No refresh credential available");
                    return Ok(RefreshOutcome::NoCredential);
                };

                self.inner.started.fetch_add(1, Ordering::Relaxed);
                let inner = Arc::clone(&self.inner);
                let pending = async move { inner.run(refresh_token, generation).await }
                    .boxed()
                    .shared();
                *slot = Some(pending.clone());
                pending
            }
        };

        pending.await.map(RefreshOutcome::Refreshed)
    }
}

impl Inner {
    /// Exchange `refresh_token`; the store is only written if nothing else wrote
    /// it since `generation`
    async fn run(
        &self,
        refresh_token: RefreshToken,
        generation: u64,
    ) -> Result<AccessToken, RefreshError> {
        debug!("Attempting credential refresh");

        let result = tokio::time::timeout(self.timeout, self.client.refresh(&refresh_token))
            .await
            .unwrap_or(Err(RefreshError::Timeout));

        let outcome = match result {
            Ok(pair) => {
                let access = pair.access.clone();
                if self.store.set_pair_if(pair, generation) {
                    info!("Credential refreshed");
                    Ok(access)
                } else {
                    warn!("Credentials changed during refresh, discarding refreshed pair");
                    Err(RefreshError::Superseded)
                }
            }
            Err(e) => {
                if self.store.clear_if(generation) {
                    warn!(error = %e, "Credential refresh failed, clearing credentials");
                    Err(e)
                } else {
                    warn!(error = %e, "Credential refresh failed after credentials changed");
                    Err(RefreshError::Superseded)
                }
            }
        };

        // Back to Idle before any waiter observes the outcome.
        *self.in_flight.lock() = None;
        outcome
    }
}
