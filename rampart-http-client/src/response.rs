//! HTTP response wrapper.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use crate::{HttpClientError, Result};

/// Fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    url: url::Url,
}

impl Response {
    /// Assemble a response, e.g. from a custom transport.
    pub fn from_parts(
        status: StatusCode,
        headers: HeaderMap,
        body: impl Into<Bytes>,
        url: url::Url,
    ) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            url,
        }
    }

    /// Create a response from a reqwest response, reading the whole body.
    pub(crate) async fn from_reqwest(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;

        Ok(Self {
            status,
            headers,
            body,
            url,
        })
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Check if the response was successful (2xx).
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check if the response was a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Check if the response was a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }

    /// Check if the status asks for the request to be retried (5xx or 429).
    pub fn is_retryable(&self) -> bool {
        self.status.is_server_error() || self.status == StatusCode::TOO_MANY_REQUESTS
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the response URL.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// Get the response body as bytes.
    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response and return the body as bytes.
    pub fn into_bytes(self) -> Bytes {
        self.body
    }

    /// Get the response body as text.
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| HttpClientError::Decode(e.to_string()))
    }

    /// Parse the response body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| HttpClientError::Json(e.to_string()))
    }

    /// Get the content type if available.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &'static str) -> Response {
        Response::from_parts(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            body,
            url::Url::parse("http://localhost/").unwrap(),
        )
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(response(500, "").is_retryable());
        assert!(response(503, "").is_retryable());
        assert!(response(429, "").is_retryable());
        assert!(!response(404, "").is_retryable());
        assert!(!response(200, "").is_retryable());
    }

    #[test]
    fn test_json_body() {
        #[derive(serde::Deserialize)]
        struct Body {
            response: String,
        }

        let res = response(200, r#"{"response":"success"}"#);
        let body: Body = res.json().unwrap();
        assert_eq!(body.response, "success");
        assert_eq!(res.text().unwrap(), r#"{"response":"success"}"#);
    }

    #[test]
    fn test_invalid_utf8_body() {
        let res = Response::from_parts(
            StatusCode::OK,
            HeaderMap::new(),
            vec![0xff, 0xfe],
            url::Url::parse("http://localhost/").unwrap(),
        );
        assert!(matches!(res.text(), Err(HttpClientError::Decode(_))));
    }
}
