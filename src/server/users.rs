//! Accounts and their current refresh tokens

use std::collections::HashMap;

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::config::UserConfig;
use crate::{Error, Result};

/// Hex SHA-256 of `password`, the form stored in `server.users`
#[must_use]
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// A user that can log in
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Identifier
    pub id: String,
    /// Email (lowercase)
    pub email: String,
    /// Display name
    pub name: String,
    /// Role
    pub role: String,
    password_digest: Vec<u8>,
}

impl UserRecord {
    /// Build a record from a plaintext password
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        name: impl Into<String>,
        role: impl Into<String>,
        password: &str,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into().to_lowercase(),
            name: name.into(),
            role: role.into(),
            password_digest: Sha256::digest(password.as_bytes()).to_vec(),
        }
    }

    fn from_config(user: &UserConfig) -> Result<Self> {
        let password_digest = hex::decode(user.password_sha256.trim()).map_err(|e| {
            Error::Config(format!("User '{}': invalid password_sha256: {e}", user.email))
        })?;
        if password_digest.len() != 32 {
            return Err(Error::Config(format!(
                "User '{}': password_sha256 must be 64 hex characters",
                user.email
            )));
        }
        Ok(Self {
            id: user.id.clone(),
            email: user.email.to_lowercase(),
            name: user.name.clone(),
            role: user.role.clone(),
            password_digest,
        })
    }

    fn password_matches(&self, password: &str) -> bool {
        Sha256::digest(password.as_bytes())
            .as_slice()
            .ct_eq(&self.password_digest)
            .into()
    }
}

/// In-memory user directory with refresh-token rotation
#[derive(Debug, Default)]
pub struct UserDirectory {
    by_email: HashMap<String, UserRecord>,
    /// user id → the one refresh token currently valid for that user
    current_refresh: DashMap<String, String>,
}

impl UserDirectory {
    /// Build from explicit records
    pub fn new(users: impl IntoIterator<Item = UserRecord>) -> Self {
        Self {
            by_email: users.into_iter().map(|u| (u.email.clone(), u)).collect(),
            current_refresh: DashMap::new(),
        }
    }

    /// Build from `server.users`
    pub fn from_config(users: &[UserConfig]) -> Result<Self> {
        let records = users
            .iter()
            .map(UserRecord::from_config)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(records))
    }

    /// Number of accounts
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_email.len()
    }

    /// Whether there are no accounts
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_email.is_empty()
    }

    /// All accounts
    pub fn users(&self) -> impl Iterator<Item = &UserRecord> {
        self.by_email.values()
    }

    /// Check an email/password pair
    #[must_use]
    pub fn authenticate(&self, email: &str, password: &str) -> Option<&UserRecord> {
        let user = self.by_email.get(&email.to_lowercase());
        match user {
            Some(user) if user.password_matches(password) => Some(user),
            Some(_) => {
                debug!("Password mismatch");
                None
            }
            None => {
                // Same work as a real comparison.
                let _ = Sha256::digest(password.as_bytes());
                debug!("Unknown email");
                None
            }
        }
    }

    /// Look up by id
    #[must_use]
    pub fn by_id(&self, id: &str) -> Option<&UserRecord> {
        self.by_email.values().find(|u| u.id == id)
    }

    /// Make `token` the only valid refresh token for `user_id`
    pub fn set_refresh(&self, user_id: &str, token: String) {
        self.current_refresh.insert(user_id.to_string(), token);
    }

    /// Whether `token` is the current refresh token for `user_id`
    #[must_use]
    pub fn is_current_refresh(&self, user_id: &str, token: &str) -> bool {
        self.current_refresh
            .get(user_id)
            .is_some_and(|current| current.as_bytes().ct_eq(token.as_bytes()).into())
    }

    /// Revoke the refresh token of `user_id`
    pub fn clear_refresh(&self, user_id: &str) {
        self.current_refresh.remove(user_id);
    }
}
