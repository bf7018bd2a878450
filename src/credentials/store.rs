//! Credential storage
//!
//! The pair is kept behind a single lock so readers never see one half of an
//! old pair next to one half of a new one.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{AccessToken, CredentialPair, RefreshToken};

/// Shared holder of the credential pair.
///
/// Implementations must make `set_pair` and `clear` atomic with respect to the
/// readers, and must never block across an `.await` (all methods are sync).
///
/// Every write bumps a generation counter. A writer that started from an older
/// generation (a refresh that was in flight across a logout) uses the `*_if`
/// variants and loses to the newer write.
pub trait CredentialStore: Send + Sync {
    /// Replace both credentials
    fn set_pair(&self, pair: CredentialPair);

    /// Current access credential, if set and within its lifetime
    fn access(&self) -> Option<AccessToken>;

    /// Current refresh credential, if set and within its lifetime
    fn refresh(&self) -> Option<RefreshToken>;

    /// Both credentials, or nothing
    fn pair(&self) -> Option<CredentialPair>;

    /// Remove both credentials (idempotent)
    fn clear(&self);

    /// Current write generation
    fn generation(&self) -> u64;

    /// `set_pair`, unless the store was written after `generation` was read
    fn set_pair_if(&self, pair: CredentialPair, generation: u64) -> bool;

    /// `clear`, unless the store was written after `generation` was read
    fn clear_if(&self, generation: u64) -> bool;
}

/// Entry lifetimes
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// Lifetime of the access entry
    pub access_lifetime: Duration,
    /// Lifetime of the refresh entry
    pub refresh_lifetime: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            access_lifetime: Duration::from_secs(15 * 60),
            refresh_lifetime: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// A stored value with its own lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct Entry<T> {
    pub(super) value: T,
    pub(super) expires_at: DateTime<Utc>,
}

impl<T: Clone> Entry<T> {
    fn new(value: T, lifetime: Duration, now: DateTime<Utc>) -> Self {
        let lifetime = chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::MAX);
        Self {
            value,
            expires_at: now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    fn live(&self, now: DateTime<Utc>) -> Option<T> {
        (now < self.expires_at).then(|| self.value.clone())
    }
}

/// Both named entries; what the file store persists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct Entries {
    #[serde(rename = "access_token", default)]
    pub(super) access: Option<Entry<AccessToken>>,
    #[serde(rename = "refresh_token", default)]
    pub(super) refresh: Option<Entry<RefreshToken>>,
    #[serde(skip)]
    pub(super) generation: u64,
}

impl Entries {
    pub(super) fn from_pair(pair: CredentialPair, options: StoreOptions, now: DateTime<Utc>) -> Self {
        Self {
            access: Some(Entry::new(pair.access, options.access_lifetime, now)),
            refresh: Some(Entry::new(pair.refresh, options.refresh_lifetime, now)),
            generation: 0,
        }
    }

    pub(super) fn access(&self, now: DateTime<Utc>) -> Option<AccessToken> {
        self.access.as_ref().and_then(|e| e.live(now))
    }

    pub(super) fn refresh(&self, now: DateTime<Utc>) -> Option<RefreshToken> {
        self.refresh.as_ref().and_then(|e| e.live(now))
    }

    pub(super) fn pair(&self, now: DateTime<Utc>) -> Option<CredentialPair> {
        Some(CredentialPair {
            access: self.access(now)?,
            refresh: self.refresh(now)?,
        })
    }

    pub(super) fn is_empty(&self, now: DateTime<Utc>) -> bool {
        self.access(now).is_none() && self.refresh(now).is_none()
    }

    /// Swap in `next` as the following generation
    pub(super) fn replace(&mut self, mut next: Entries) {
        next.generation = self.generation.wrapping_add(1);
        *self = next;
    }
}

/// Process-local credential store
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<Entries>,
    options: StoreOptions,
}

impl MemoryCredentialStore {
    /// Create an empty store with default lifetimes
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the given lifetimes
    #[must_use]
    pub fn with_options(options: StoreOptions) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            options,
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn set_pair(&self, pair: CredentialPair) {
        let next = Entries::from_pair(pair, self.options, Utc::now());
        self.entries.write().replace(next);
    }

    fn access(&self) -> Option<AccessToken> {
        self.entries.read().access(Utc::now())
    }

    fn refresh(&self) -> Option<RefreshToken> {
        self.entries.read().refresh(Utc::now())
    }

    fn pair(&self) -> Option<CredentialPair> {
        self.entries.read().pair(Utc::now())
    }

    fn clear(&self) {
        self.entries.write().replace(Entries::default());
    }

    fn generation(&self) -> u64 {
        self.entries.read().generation
    }

    fn set_pair_if(&self, pair: CredentialPair, generation: u64) -> bool {
        let mut entries = self.entries.write();
        if entries.generation != generation {
            return false;
        }
        entries.replace(Entries::from_pair(pair, self.options, Utc::now()));
        true
    }

    fn clear_if(&self, generation: u64) -> bool {
        let mut entries = self.entries.write();
        if entries.generation != generation {
            return false;
        }
        entries.replace(Entries::default());
        true
    }
}
