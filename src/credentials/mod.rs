//! Credential Store
//!
//! Holds the access/refresh credential pair and inspects access tokens.
//!
//! - [`CredentialStore`]: the shared, atomically updated pair
//! - [`MemoryCredentialStore`]: process-local store
//! - [`FileCredentialStore`]: store persisted across restarts
//! - [`claims`]: fail-closed token parsing and expiry checks

pub mod claims;
mod file;
mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use claims::{Claims, DEFAULT_EXPIRY_SKEW, is_expired, is_expired_at, parse};
pub use file::FileCredentialStore;
pub use store::{CredentialStore, MemoryCredentialStore, StoreOptions};

/// Short-lived bearer token authorizing individual API calls
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

/// Long-lived token used solely to obtain a new access token
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefreshToken(String);

macro_rules! opaque_token {
    ($name:ident) => {
        impl $name {
            /// Wrap a raw token string
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Raw token string
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        // Tokens are secrets; never print them.
        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(<redacted, {} bytes>)"), self.0.len())
            }
        }
    };
}

opaque_token!(AccessToken);
opaque_token!(RefreshToken);

/// Access + refresh credential, always handled as a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    /// Access credential
    pub access: AccessToken,
    /// Refresh credential
    pub refresh: RefreshToken,
}

impl CredentialPair {
    /// Build a pair from raw strings.
    ///
    /// Returns `None` if either value is empty; a half pair is no pair.
    pub fn from_parts(access: impl Into<String>, refresh: impl Into<String>) -> Option<Self> {
        let access = access.into();
        let refresh = refresh.into();
        if access.is_empty() || refresh.is_empty() {
            return None;
        }
        Some(Self {
            access: AccessToken(access),
            refresh: RefreshToken(refresh),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_pair_is_absent() {
        assert!(CredentialPair::from_parts("a", "").is_none());
        assert!(CredentialPair::from_parts("", "r").is_none());
        assert!(CredentialPair::from_parts("a", "r").is_some());
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let token = AccessToken::new("super-secret");
        let printed = format!("{token:?}");
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("12 bytes"));
    }
}
