//! # Rampart HTTP Client
//!
//! An HTTP client that retries failed requests with configurable backoff,
//! optionally runs every attempt through a circuit breaker, and reports
//! each attempt to lifecycle plugins.
//!
//! ## Features
//!
//! - **Retry with Backoff**: constant or exponential backoff with uniform jitter
//! - **Body Replay**: request bodies, readers included, are resent intact on every retry
//! - **Cancellation**: a cancellation token aborts both in-flight attempts and backoff waits
//! - **Circuit Breaker**: pluggable breaker keyed by command name, with fallbacks
//! - **Plugins**: observe the start, end or failure of every attempt
//! - **Custom Transport**: replace the reqwest transport with any [`Doer`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rampart_http_client::{Client, HttpClient, HttpClientConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::new(HttpClientConfig::default())?;
//!
//!     let response = client
//!         .get("https://api.example.com/users")
//!         .send()
//!         .await?;
//!
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```
//!
//! ## With Retries and a Circuit Breaker
//!
//! ```rust,no_run
//! use rampart_http_client::{
//!     BreakerClient, BreakerClientConfig, Client, CommandConfig, PassthroughBreaker,
//!     RequestLogger, RetryConfig,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BreakerClientConfig::builder()
//!         .command_name("orders")
//!         .command(CommandConfig::default().with_error_percent_threshold(50))
//!         .retry(RetryConfig::exponential(
//!             3,
//!             Duration::from_millis(100),
//!             Duration::from_secs(2),
//!             2.0,
//!             Duration::from_millis(50),
//!         ))
//!         .build();
//!
//!     let client = BreakerClient::new(config, Arc::new(PassthroughBreaker::new()))?
//!         .with_plugin(RequestLogger::new());
//!
//!     let response = client
//!         .post("https://api.example.com/orders")
//!         .json(&serde_json::json!({"item": "widget", "quantity": 5}))
//!         .send()
//!         .await?;
//!
//!     println!("Status: {}", response.status());
//!     Ok(())
//! }
//! ```

mod backoff;
mod breaker_client;
mod circuit_breaker;
mod client;
mod config;
mod error;
mod executor;
mod plugin;
mod plugins;
mod request;
mod response;
mod retry;
mod transport;

pub use backoff::{
    Backoff, ConstantBackoff, ExponentialBackoff, JitterSource, SeededJitter, ThreadRngJitter,
};
pub use breaker_client::{
    BreakerClient, BreakerClientConfig, BreakerClientConfigBuilder, DEFAULT_COMMAND_NAME,
};
pub use circuit_breaker::{
    CircuitBreaker, CommandConfig, FallbackFn, PassthroughBreaker, run_fallback,
};
pub use client::{Client, HttpClient};
pub use config::{HttpClientConfig, HttpClientConfigBuilder};
pub use error::{BoxError, HttpClientError, MultiError, Result};
pub use executor::sleep_interruptible;
pub use plugin::{Plugin, PluginContext, PluginSet};
pub use plugins::{MetricsCallbackFn, MetricsPlugin, RequestLogger};
pub use request::{Body, Request, RequestBuilder};
pub use response::Response;
pub use retry::{NoRetrier, Retriable, RetriableFn, Retrier, RetryConfig};
pub use transport::Doer;

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use tokio_util::sync::CancellationToken;
pub use url::Url;

/// Prelude for common imports.
///
/// ```
/// use rampart_http_client::prelude::*;
/// ```
pub mod prelude {
    pub use crate::backoff::{Backoff, ConstantBackoff, ExponentialBackoff};
    pub use crate::breaker_client::{BreakerClient, BreakerClientConfig};
    pub use crate::circuit_breaker::{CircuitBreaker, CommandConfig, PassthroughBreaker};
    pub use crate::client::{Client, HttpClient};
    pub use crate::config::{HttpClientConfig, HttpClientConfigBuilder};
    pub use crate::error::{HttpClientError, Result};
    pub use crate::plugin::{Plugin, PluginContext};
    pub use crate::request::{Request, RequestBuilder};
    pub use crate::response::Response;
    pub use crate::retry::{Retriable, Retrier, RetryConfig};
    pub use crate::transport::Doer;
    pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
    pub use tokio_util::sync::CancellationToken;
}
