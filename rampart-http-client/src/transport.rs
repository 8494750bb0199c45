//! Transport capability: send one request, get one response.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{HttpClientError, Request, Response, Result};

/// Sends a single request. Retries, backoff and plugins live above this layer.
///
/// Implement it to substitute the transport, e.g. to inject auth headers
/// or to fake responses in tests.
#[async_trait]
pub trait Doer: Send + Sync {
    /// Send the request once.
    async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl<D: Doer + ?Sized> Doer for Arc<D> {
    async fn send(&self, request: Request) -> Result<Response> {
        (**self).send(request).await
    }
}

#[async_trait]
impl Doer for reqwest::Client {
    async fn send(&self, request: Request) -> Result<Response> {
        let scheme = request.url().scheme();
        if scheme != "http" && scheme != "https" {
            return Err(HttpClientError::UnsupportedScheme(scheme.to_string()));
        }

        let mut builder = self
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());

        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.clone());
        }

        if let Some(timeout) = request.timeout() {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        Response::from_reqwest(response).await
    }
}
