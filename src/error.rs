//! Error types for the backoffice client

use std::io;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::refresh::RefreshError;

/// Result type alias for the backoffice client
pub type Result<T> = std::result::Result<T, Error>;

/// Crate-level errors (configuration, setup, reference server)
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// API call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client setup error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of a single API call, tagged at the transport boundary.
///
/// Business-level variants (`Forbidden`, `NotFound`, `Validation`, `Server`) are
/// passed through the request pipeline untouched; only `Unauthorized` drives the
/// refresh-and-retry logic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// 401: credential missing, invalid, or expired
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Server-supplied message
        message: String,
    },

    /// 403
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Server-supplied message
        message: String,
    },

    /// 404
    #[error("Not found: {message}")]
    NotFound {
        /// Server-supplied message
        message: String,
    },

    /// Any other 4xx
    #[error("Request rejected (HTTP {status}): {message}")]
    Validation {
        /// HTTP status code
        status: u16,
        /// Server-supplied message
        message: String,
    },

    /// 5xx
    #[error("Server error (HTTP {status}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Server-supplied message
        message: String,
    },

    /// No response received
    #[error("Network failure: {0}")]
    Network(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// The credential could not be renewed before sending
    #[error("Session could not be refreshed: {0}")]
    RefreshFailed(#[source] RefreshError),

    /// Successful response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Request could not be built or targets a foreign origin
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Error body shape used by the API (`{ "message": "..." }`)
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";

impl ApiError {
    /// Classify a non-2xx response
    #[must_use]
    pub fn from_status(status: StatusCode, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());

        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized { message },
            StatusCode::FORBIDDEN => Self::Forbidden { message },
            StatusCode::NOT_FOUND => Self::NotFound { message },
            s if s.is_server_error() => Self::Server {
                status: s.as_u16(),
                message,
            },
            s => Self::Validation {
                status: s.as_u16(),
                message,
            },
        }
    }

    /// Classify a reqwest failure (no usable response)
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Whether this is an authorization failure (401)
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}
