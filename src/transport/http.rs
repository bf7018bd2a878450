//! reqwest transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use tracing::{debug, warn};
use url::Url;

use super::{ApiRequest, ApiResponse, Transport};
use crate::error::ApiError;
use crate::{Error, Result};

/// HTTP transport bound to a single API origin
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// HTTP client
    client: Client,
    /// Base URL, always ending in `/`
    base_url: Url,
}

impl HttpTransport {
    /// Create a transport for `base_url`; every call is bounded by `timeout`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid API base URL '{base_url}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "API base URL must be http or https, got '{}'",
                base_url.scheme()
            )));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            // Credentials must never follow a redirect to another origin.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Base URL
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a request path against the base URL.
    ///
    /// Fails with [`ApiError::InvalidRequest`] if the result leaves the API origin.
    pub fn resolve(&self, path: &str) -> std::result::Result<Url, ApiError> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidRequest(format!("bad path '{path}': {e}")))?;

        if url.origin() != self.base_url.origin() {
            warn!(path = %path, "Refusing request to a foreign origin");
            return Err(ApiError::InvalidRequest(format!(
                "'{path}' is outside the API origin"
            )));
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, ApiError> {
        let url = self.resolve(&request.path)?;

        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .header(header::ACCEPT, "application/json")
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method,
            url = %url,
            authenticated = request.bearer().is_some(),
            retried = request.is_retried(),
            "Sending API request"
        );

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        if !status.is_success() {
            debug!(method = %request.method, url = %url, status = %status, "API request failed");
            return Err(ApiError::from_status(status, &body));
        }

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
