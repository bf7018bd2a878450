//! Backoffice Client Library
//!
//! Authenticated request pipeline for the back-office API.
//!
//! # Features
//!
//! - **Credential Store**: access/refresh pair, updated atomically, optionally persisted
//! - **Single-flight refresh**: any number of concurrent expirations cause one refresh call
//! - **Request Pipeline**: attaches a live credential, repairs one 401 per call
//! - **Auth-Failure Handler**: clears credentials and signals re-login once per episode
//! - **Reference server**: login / refresh / logout endpoints with refresh-token rotation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod app;
pub mod auth_api;
pub mod auth_failure;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod pipeline;
pub mod refresh;
pub mod server;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use error::{ApiError, Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).try_init()
        }
        _ => {
            subscriber.with(fmt::layer().with_writer(std::io::stderr)).try_init()
        }
    }
    .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
