//! Transport for API calls
//!
//! [`Transport`] is the send capability the request pipeline decorates.
//! [`HttpTransport`] is the reqwest implementation; non-2xx statuses are turned
//! into a tagged [`ApiError`] here, at the boundary.

mod http;
mod request;

pub use self::http::HttpTransport;
pub use self::request::{ApiRequest, ApiResponse};
pub(crate) use self::request::normalize_route;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ApiError;

/// Sends one API call
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return its 2xx response or a tagged error
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        (**self).send(request).await
    }
}
