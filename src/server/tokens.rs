//! HS256 token issuing and verification

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::users::UserRecord;

/// Claims carried by both token kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User identifier
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Email
    pub email: String,
    /// Display name
    pub name: String,
    /// Role
    pub role: String,
    /// Issued-at (Unix epoch seconds)
    pub iat: i64,
    /// Expires-at (Unix epoch seconds)
    pub exp: i64,
    /// Unique token id; keeps tokens minted in the same second distinct
    pub jti: String,
}

/// Signing material for one token kind
struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl Keys {
    fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    fn sign(&self, user: &UserRecord) -> jsonwebtoken::errors::Result<String> {
        let iat = Utc::now().timestamp();
        let claims = TokenClaims {
            user_id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            iat,
            exp: iat.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    fn verify(&self, token: &str) -> jsonwebtoken::errors::Result<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);
        jsonwebtoken::decode::<TokenClaims>(token, &self.decoding, &validation).map(|d| d.claims)
    }
}

/// Issues and verifies access and refresh tokens under separate secrets
pub struct TokenIssuer {
    access: Keys,
    refresh: Keys,
}

impl TokenIssuer {
    /// Create an issuer
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access: Keys::new(access_secret, access_ttl),
            refresh: Keys::new(refresh_secret, refresh_ttl),
        }
    }

    /// Mint a fresh `(access, refresh)` pair for `user`
    pub fn issue_pair(&self, user: &UserRecord) -> jsonwebtoken::errors::Result<(String, String)> {
        Ok((self.access.sign(user)?, self.refresh.sign(user)?))
    }

    /// Verify an access token (signature and expiry, zero leeway)
    pub fn verify_access(&self, token: &str) -> jsonwebtoken::errors::Result<TokenClaims> {
        self.access.verify(token)
    }

    /// Verify a refresh token (signature and expiry, zero leeway)
    pub fn verify_refresh(&self, token: &str) -> jsonwebtoken::errors::Result<TokenClaims> {
        self.refresh.verify(token)
    }
}
