//! Requests and the request builder.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{Client, HttpClientError, Response, Result};

/// Request body.
///
/// Reader bodies are read into memory once before the first attempt, so
/// every retry sends the same bytes.
pub enum Body {
    /// In-memory bytes.
    Bytes(Bytes),
    /// Single-use reader.
    Reader(Pin<Box<dyn AsyncRead + Send + Sync>>),
}

impl Body {
    /// Body backed by a reader.
    pub fn from_reader(reader: impl AsyncRead + Send + Sync + 'static) -> Self {
        Self::Reader(Box::pin(reader))
    }

    /// The bytes of a buffered body.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Reader(_) => None,
        }
    }

    async fn into_bytes(self) -> Result<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Reader(_) => f.write_str("Reader"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes.into())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Bytes(text.into())
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

/// An HTTP request ready to be executed.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Body>,
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
}

impl Request {
    /// Create a request, parsing the URL.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        Ok(Self::from_url(method, parse_url(url)?))
    }

    /// Create a request from an already parsed URL.
    pub fn from_url(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            cancellation: None,
        }
    }

    /// Replace the headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a per-attempt timeout, enforced by the transport.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation token that aborts the whole call, retries included.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable request headers.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Request body.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Body bytes, once buffered.
    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref().and_then(Body::as_bytes)
    }

    /// Per-attempt timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Cancellation token governing the call.
    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Read a reader body fully into memory.
    pub(crate) async fn buffer_body(&mut self) -> Result<()> {
        if let Some(body) = self.body.take() {
            self.body = Some(Body::Bytes(body.into_bytes().await?));
        }
        Ok(())
    }

    /// A fresh copy for one attempt. The body must already be buffered.
    pub(crate) fn replay(&self) -> Request {
        Request {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body_bytes().cloned().map(Body::Bytes),
            timeout: self.timeout,
            cancellation: self.cancellation.clone(),
        }
    }
}

fn parse_url(url: &str) -> Result<Url> {
    match Url::parse(url) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Err(HttpClientError::UnsupportedScheme(String::new()))
        }
        Err(e) => Err(HttpClientError::InvalidUrl(e.to_string())),
    }
}

/// HTTP request builder.
pub struct RequestBuilder<'a, C: ?Sized> {
    client: &'a C,
    method: Method,
    url: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    body: Option<Body>,
    timeout: Option<Duration>,
    cancellation: Option<CancellationToken>,
    error: Option<HttpClientError>,
}

impl<'a, C: Client + ?Sized> RequestBuilder<'a, C> {
    /// Create a new request builder.
    pub(crate) fn new(client: &'a C, method: Method, url: String) -> Self {
        Self {
            client,
            method,
            url,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            timeout: None,
            cancellation: None,
            error: None,
        }
    }

    /// Add a header to the request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match (
            HeaderName::try_from(name.as_str()),
            HeaderValue::try_from(value.as_str()),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => {
                self.error.get_or_insert(HttpClientError::RequestBuild(format!(
                    "invalid header '{name}'"
                )));
            }
        }
        self
    }

    /// Add multiple headers to the request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set the request body as raw bytes.
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the request body from a reader. It is read once, before the first attempt.
    pub fn body_reader(mut self, reader: impl AsyncRead + Send + Sync + 'static) -> Self {
        self.body = Some(Body::from_reader(reader));
        self
    }

    /// Set the request body as text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        self.body = Some(Body::from(text.into()));
        self
    }

    /// Set the request body as JSON.
    pub fn json<T: Serialize>(mut self, json: &T) -> Self {
        match serde_json::to_vec(json) {
            Ok(bytes) => {
                self.headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                self.body = Some(Body::from(bytes));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize JSON body");
                self.error.get_or_insert(HttpClientError::Json(e.to_string()));
            }
        }
        self
    }

    /// Set the request body as form data.
    pub fn form<T: Serialize>(mut self, form: &T) -> Self {
        match serde_urlencoded::to_string(form) {
            Ok(encoded) => {
                self.headers.insert(
                    http::header::CONTENT_TYPE,
                    HeaderValue::from_static("application/x-www-form-urlencoded"),
                );
                self.body = Some(Body::from(encoded));
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode form data");
                self.error
                    .get_or_insert(HttpClientError::RequestBuild(e.to_string()));
            }
        }
        self
    }

    /// Set a per-attempt timeout for this request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation token for the whole call.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Set bearer authentication.
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.header("Authorization", format!("Bearer {}", token.into()))
    }

    /// Set basic authentication.
    pub fn basic_auth(
        self,
        username: impl Into<String>,
        password: Option<impl Into<String>>,
    ) -> Self {
        use base64::Engine;
        let credentials = match password {
            Some(p) => format!("{}:{}", username.into(), p.into()),
            None => format!("{}:", username.into()),
        };
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        self.header("Authorization", format!("Basic {}", encoded))
    }

    /// Build the URL with query parameters.
    fn build_url(&self) -> Result<Url> {
        let mut url = match self.client.base_url() {
            Some(base) => base
                .join(&self.url)
                .map_err(|e| HttpClientError::InvalidUrl(e.to_string()))?,
            None => parse_url(&self.url)?,
        };

        if !self.query.is_empty() {
            let mut query_pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                query_pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Build the request without sending it.
    pub fn build(mut self) -> Result<Request> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }

        let url = self.build_url()?;

        let mut headers = self.client.default_headers().cloned().unwrap_or_default();
        headers.extend(self.headers);

        Ok(Request {
            method: self.method,
            url,
            headers,
            body: self.body,
            timeout: self.timeout,
            cancellation: self.cancellation,
        })
    }

    /// Send the request through the client's retry loop.
    pub async fn send(self) -> Result<Response> {
        let client = self.client;
        let request = self.build()?;
        client.execute(request).await
    }
}
