//! File-backed credential store
//!
//! Persists the credential pair so a restarted client keeps its session.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::store::{Entries, StoreOptions};
use super::{AccessToken, CredentialPair, CredentialStore, RefreshToken};
use crate::{Error, Result};

/// Credential store written through to a JSON file
#[derive(Debug)]
pub struct FileCredentialStore {
    /// Credentials file
    path: PathBuf,
    /// In-memory copy; the source of truth for readers
    entries: RwLock<Entries>,
    /// Entry lifetimes
    options: StoreOptions,
}

impl FileCredentialStore {
    /// Open (or create) the store at `path`
    ///
    /// A missing, unreadable, or garbled file yields an empty store.
    pub fn open(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let path = path.into();

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| {
                    Error::Internal(format!("Failed to create credential store dir: {e}"))
                })?;
            }
        }

        let entries = load(&path);
        Ok(Self {
            path,
            entries: RwLock::new(entries),
            options,
        })
    }

    /// Open the store in the default location (`~/.backoffice/credentials.json`)
    pub fn default_location(options: StoreOptions) -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Internal("Cannot determine home directory".to_string()))?;

        Self::open(home.join(".backoffice").join("credentials.json"), options)
    }

    /// Path of the credentials file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `entries` to disk; failures are logged, never surfaced
    fn persist(&self, entries: &Entries) {
        if entries.is_empty(Utc::now()) {
            match fs::remove_file(&self.path) {
                Ok(()) => debug!(path = %self.path.display(), "Removed credentials file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove credentials file"),
            }
            return;
        }

        let content = match serde_json::to_string_pretty(entries) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to serialize credentials");
                return;
            }
        };

        // Atomic write: owner-only temp file in the same directory, then rename.
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let written = NamedTempFile::new_in(dir).and_then(|mut tmp| {
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&self.path).map_err(|e| e.error)?;
            Ok(())
        });
        if let Err(e) = written {
            warn!(path = %self.path.display(), error = %e, "Failed to write credentials file");
        }
    }
}

fn load(path: &Path) -> Entries {
    if !path.exists() {
        debug!(path = %path.display(), "No stored credentials found");
        return Entries::default();
    }

    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<Entries>(&content) {
            Ok(entries) => {
                info!(
                    has_access = entries.access(Utc::now()).is_some(),
                    has_refresh = entries.refresh(Utc::now()).is_some(),
                    "Loaded stored credentials"
                );
                entries
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse stored credentials");
                Entries::default()
            }
        },
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read credentials file");
            Entries::default()
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn set_pair(&self, pair: CredentialPair) {
        let mut entries = self.entries.write();
        entries.replace(Entries::from_pair(pair, self.options, Utc::now()));
        // Persist under the lock so the file order matches the memory order.
        self.persist(&entries);
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
        let mut entries = self.entries.write();
        entries.replace(Entries::default());
        self.persist(&entries);
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
        self.persist(&entries);
        true
    }

    fn clear_if(&self, generation: u64) -> bool {
        let mut entries = self.entries.write();
        if entries.generation != generation {
            return false;
        }
        entries.replace(Entries::default());
        self.persist(&entries);
        true
    }
}
