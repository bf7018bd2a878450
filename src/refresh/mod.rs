//! Refresh Coordinator
//!
//! Turns any number of concurrent "my token is expired" signals into exactly one
//! refresh call and delivers its outcome to every waiter.

mod coordinator;

pub use coordinator::RefreshCoordinator;

use async_trait::async_trait;
use thiserror::Error;

use crate::credentials::{AccessToken, CredentialPair, RefreshToken};

/// Why a refresh failed.
///
/// Cloned to every waiter of the same in-flight refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// Server refused the refresh credential
    #[error("refresh rejected (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Server-supplied message
        message: String,
    },

    /// Refresh call never got a response
    #[error("refresh transport failure: {0}")]
    Transport(String),

    /// Response lacked a usable credential pair
    #[error("malformed refresh response: {0}")]
    MalformedResponse(String),

    /// Refresh did not settle in time
    #[error("refresh timed out")]
    Timeout,

    /// Credentials were replaced or cleared while the refresh was in flight;
    /// its result was discarded
    #[error("credentials changed during refresh")]
    Superseded,
}

/// Successful outcome of a refresh request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new access credential is stored and returned
    Refreshed(AccessToken),
    /// Nothing to refresh with; the user is logged out
    NoCredential,
}

/// Performs the refresh network call
#[async_trait]
pub trait RefreshClient: Send + Sync {
    /// Exchange a refresh credential for a new pair
    async fn refresh(&self, token: &RefreshToken) -> Result<CredentialPair, RefreshError>;
}
