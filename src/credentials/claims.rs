//! Access token inspection
//!
//! Tokens are JWT-shaped (`header.payload.signature`). The client never verifies
//! signatures; it only reads the payload to decide whether a token is still worth
//! sending. Anything that cannot be read is treated as expired.

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Safety margin subtracted from a token's nominal expiry
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Decoded payload of an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User identifier
    #[serde(rename = "userId", alias = "sub", default)]
    pub user_id: Option<String>,
    /// User email
    #[serde(default)]
    pub email: Option<String>,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Role (e.g. `admin`)
    #[serde(default)]
    pub role: Option<String>,
    /// Issued-at, seconds since the epoch
    #[serde(default)]
    pub iat: Option<i64>,
    /// Expiry, seconds since the epoch
    #[serde(default)]
    pub exp: Option<i64>,
}

impl Claims {
    /// Expiry as a timestamp
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

/// Decode the payload segment of a token.
///
/// Returns `None` for anything malformed: wrong segment count, bad base64url,
/// non-UTF-8, or a payload that is not a JSON object of the expected shape.
#[must_use]
pub fn parse(token: &str) -> Option<Claims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        trace!("token does not have three segments");
        return None;
    };

    // Some encoders pad; the JWT form does not.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let json = std::str::from_utf8(&bytes).ok()?;
    match serde_json::from_str::<Claims>(json) {
        Ok(claims) => Some(claims),
        Err(e) => {
            trace!(error = %e, "token payload is not a claims object");
            None
        }
    }
}

/// Whether `token` must be considered expired at `now`.
///
/// `true` when the token cannot be parsed, carries no `exp`, or
/// `now >= exp - skew`.
#[must_use]
pub fn is_expired_at(token: &str, now: DateTime<Utc>, skew: Duration) -> bool {
    let Some(exp) = parse(token).and_then(|c| c.exp) else {
        return true;
    };
    let skew = i64::try_from(skew.as_secs()).unwrap_or(i64::MAX);
    now.timestamp() >= exp.saturating_sub(skew)
}

/// [`is_expired_at`] against the wall clock with the default 30 second skew
#[must_use]
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now(), DEFAULT_EXPIRY_SKEW)
}
