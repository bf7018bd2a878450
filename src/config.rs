//! Configuration management

use std::{env, path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::credentials::StoreOptions;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables are set into the process environment for `${VAR}` resolution.
    pub env_files: Vec<String>,
    /// API client configuration
    pub api: ApiConfig,
    /// Credential handling
    pub auth: AuthConfig,
    /// Reference auth server
    pub server: ServerConfig,
}

/// API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the back-office API
    pub base_url: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Credential handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Lifetime of the stored access entry
    #[serde(with = "humantime_serde")]
    pub access_lifetime: Duration,
    /// Lifetime of the stored refresh entry
    #[serde(with = "humantime_serde")]
    pub refresh_lifetime: Duration,
    /// A token counts as expired this long before its `exp`
    #[serde(with = "humantime_serde")]
    pub expiry_skew: Duration,
    /// Upper bound on a single refresh call
    #[serde(with = "humantime_serde")]
    pub refresh_timeout: Duration,
    /// Production mode: credentials only travel over https
    pub secure: bool,
    /// Credentials file (default: `~/.backoffice/credentials.json`)
    pub store_path: Option<PathBuf>,
    /// Login endpoint
    pub login_path: String,
    /// Refresh endpoint
    pub refresh_path: String,
    /// Logout endpoint
    pub logout_path: String,
    /// Extra paths that never carry a credential (default: `["/health"]`)
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string()]
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_lifetime: Duration::from_secs(15 * 60),
            refresh_lifetime: Duration::from_secs(7 * 24 * 60 * 60),
            expiry_skew: Duration::from_secs(30),
            refresh_timeout: Duration::from_secs(10),
            secure: false,
            store_path: None,
            login_path: "/api/auth/login".to_string(),
            refresh_path: "/api/auth/refresh".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            public_paths: default_public_paths(),
        }
    }
}

impl AuthConfig {
    /// Entry lifetimes for the credential store
    #[must_use]
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            access_lifetime: self.access_lifetime,
            refresh_lifetime: self.refresh_lifetime,
        }
    }

    /// Every path that bypasses the pipeline: the auth endpoints plus `public_paths`
    #[must_use]
    pub fn all_public_paths(&self) -> Vec<String> {
        let mut paths = vec![
            self.login_path.clone(),
            self.refresh_path.clone(),
            self.logout_path.clone(),
        ];
        for p in &self.public_paths {
            if !paths.contains(p) {
                paths.push(p.clone());
            }
        }
        paths
    }
}

/// Reference auth server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Secret signing access tokens (supports `env:VAR_NAME`)
    pub access_secret: Option<String>,
    /// Secret signing refresh tokens (supports `env:VAR_NAME`)
    pub refresh_secret: Option<String>,
    /// Lifetime of issued access tokens
    #[serde(with = "humantime_serde")]
    pub access_ttl: Duration,
    /// Lifetime of issued refresh tokens
    #[serde(with = "humantime_serde")]
    pub refresh_ttl: Duration,
    /// Accounts allowed to log in
    pub users: Vec<UserConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            access_secret: Some("env:JWT_SECRET".to_string()),
            refresh_secret: Some("env:JWT_REFRESH_SECRET".to_string()),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            users: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Resolve the access-token secret
    #[must_use]
    pub fn resolve_access_secret(&self) -> Option<String> {
        self.access_secret.as_deref().and_then(resolve_secret)
    }

    /// Resolve the refresh-token secret
    #[must_use]
    pub fn resolve_refresh_secret(&self) -> Option<String> {
        self.refresh_secret.as_deref().and_then(resolve_secret)
    }
}

/// Literal value, or `env:VAR_NAME`; empty results count as unset
fn resolve_secret(value: &str) -> Option<String> {
    let resolved = match value.strip_prefix("env:") {
        Some(var_name) => env::var(var_name).ok()?,
        None => value.to_string(),
    };
    (!resolved.is_empty()).then_some(resolved)
}

/// A back-office account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    /// User identifier
    pub id: String,
    /// Login email
    pub email: String,
    /// Display name
    pub name: String,
    /// Role (e.g. `admin`, `staff`)
    #[serde(default = "default_role")]
    pub role: String,
    /// Hex-encoded SHA-256 of the password
    pub password_sha256: String,
}

fn default_role() -> String {
    "staff".to_string()
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (BACKOFFICE_ prefix)
        figment = figment.merge(Env::prefixed("BACKOFFICE_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();

        // Expand ${VAR} in URLs and paths
        config.expand_env_vars();

        Ok(config)
    }

    /// Check the client side of the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unparseable base URL, or a non-https one
    /// when `auth.secure` is set.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.api.base_url)
            .map_err(|e| Error::Config(format!("Invalid api.base_url '{}': {e}", self.api.base_url)))?;

        if self.auth.secure && url.scheme() != "https" {
            return Err(Error::Config(format!(
                "auth.secure requires an https api.base_url, got '{}'",
                self.api.base_url
            )));
        }
        if self.auth.refresh_timeout.is_zero() {
            return Err(Error::Config("auth.refresh_timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Check what the reference server needs
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if either signing secret is missing, or both are
    /// the same.
    pub fn validate_server(&self) -> Result<()> {
        let access = self
            .server
            .resolve_access_secret()
            .ok_or_else(|| Error::Config("server.access_secret is not set".to_string()))?;
        let refresh = self
            .server
            .resolve_refresh_secret()
            .ok_or_else(|| Error::Config("server.refresh_secret is not set".to_string()))?;
        if access == refresh {
            return Err(Error::Config(
                "server.access_secret and server.refresh_secret must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_home(path_str);

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in config values
    fn expand_env_vars(&mut self) {
        // Pattern: ${VAR} or ${VAR:-default}
        let Ok(re) = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
            return;
        };

        self.api.base_url = Self::expand_string(&re, &self.api.base_url);

        if let Some(path) = &self.auth.store_path {
            let expanded = Self::expand_string(&re, &path.to_string_lossy());
            self.auth.store_path = Some(PathBuf::from(expand_home(&expanded)));
        }
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

fn expand_home(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}

/// Human-readable durations (`"500ms"`, `"30s"`, `"15m"`, `"12h"`, `"7d"`)
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse(s: &str) -> Result<Duration, String> {
        let number = |n: &str| n.trim().parse::<u64>().map_err(|e| format!("invalid duration '{s}': {e}"));

        // "ms" before "s"
        if let Some(ms) = s.strip_suffix("ms") {
            number(ms).map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            number(secs).map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            number(mins).map(|m| Duration::from_secs(m.saturating_mul(60)))
        } else if let Some(hours) = s.strip_suffix('h') {
            number(hours).map(|h| Duration::from_secs(h.saturating_mul(3600)))
        } else if let Some(days) = s.strip_suffix('d') {
            number(days).map(|d| Duration::from_secs(d.saturating_mul(86_400)))
        } else {
            // Assume seconds
            number(s).map(Duration::from_secs)
        }
    }
}
