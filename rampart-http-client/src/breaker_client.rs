//! Client that routes every attempt through a circuit breaker.

use async_trait::async_trait;
use http::HeaderMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::client::{build_reqwest, parse_base_url, parse_default_headers};
use crate::executor::{Attempt, AttemptOutcome, Executor};
use crate::{
    CircuitBreaker, Client, CommandConfig, Doer, FallbackFn, HttpClientConfig, HttpClientError,
    Plugin, PluginSet, Request, Response, Result, RetryConfig,
};

/// Command name used when none is configured.
pub const DEFAULT_COMMAND_NAME: &str = "rampart-http-client";

/// Configuration of a [`BreakerClient`].
#[derive(Clone)]
pub struct BreakerClientConfig {
    /// HTTP settings, retries included.
    pub http: HttpClientConfig,
    /// Breaker command every attempt runs under.
    pub command_name: String,
    /// Command settings registered with the breaker.
    pub command: CommandConfig,
    /// Called when an attempt fails or the breaker refuses it.
    pub fallback: Option<FallbackFn>,
}

impl Default for BreakerClientConfig {
    fn default() -> Self {
        Self {
            http: HttpClientConfig::default(),
            command_name: DEFAULT_COMMAND_NAME.to_string(),
            command: CommandConfig::default(),
            fallback: None,
        }
    }
}

impl BreakerClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> BreakerClientConfigBuilder {
        BreakerClientConfigBuilder::default()
    }
}

impl fmt::Debug for BreakerClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerClientConfig")
            .field("http", &self.http)
            .field("command_name", &self.command_name)
            .field("command", &self.command)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Builder for [`BreakerClientConfig`].
#[derive(Debug, Default)]
pub struct BreakerClientConfigBuilder {
    config: BreakerClientConfig,
}

impl BreakerClientConfigBuilder {
    /// Replace the HTTP settings.
    pub fn http(mut self, http: HttpClientConfig) -> Self {
        self.config.http = http;
        self
    }

    /// Set the per-attempt HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.http.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.http.retry = retry;
        self
    }

    /// Set the breaker command name.
    pub fn command_name(mut self, name: impl Into<String>) -> Self {
        self.config.command_name = name.into();
        self
    }

    /// Set the breaker command settings.
    pub fn command(mut self, command: CommandConfig) -> Self {
        self.config.command = command;
        self
    }

    /// Set the fallback.
    pub fn fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(HttpClientError) -> Result<()> + Send + Sync + 'static,
    {
        self.config.fallback = Some(Arc::new(fallback));
        self
    }

    /// Build the configuration.
    pub fn build(self) -> BreakerClientConfig {
        self.config
    }
}

/// HTTP client whose attempts run under a named circuit breaker command.
///
/// A refusal by the breaker counts as a failed attempt: it is retried and
/// waits out the backoff like a transport error.
#[derive(Clone)]
pub struct BreakerClient {
    transport: Arc<dyn Doer>,
    breaker: Arc<dyn CircuitBreaker>,
    config: Arc<BreakerClientConfig>,
    plugins: PluginSet,
    base_url: Option<Url>,
    default_headers: HeaderMap,
}

impl BreakerClient {
    /// Create a client backed by reqwest and register its command with `breaker`.
    pub fn new(config: BreakerClientConfig, breaker: Arc<dyn CircuitBreaker>) -> Result<Self> {
        let transport = build_reqwest(&config.http)?;
        Self::with_transport(config, breaker, transport)
    }

    /// Create a client that sends through a custom transport.
    pub fn with_transport(
        config: BreakerClientConfig,
        breaker: Arc<dyn CircuitBreaker>,
        transport: impl Doer + 'static,
    ) -> Result<Self> {
        let base_url = parse_base_url(&config.http)?;
        let default_headers = parse_default_headers(&config.http)?;
        let plugins = PluginSet::new().isolate_panics(config.http.isolate_plugin_panics);

        debug!(command = %config.command_name, "Configuring breaker command");
        breaker.configure(&config.command_name, &config.command);

        Ok(Self {
            transport: Arc::new(transport),
            breaker,
            config: Arc::new(config),
            plugins,
            base_url,
            default_headers,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &BreakerClientConfig {
        &self.config
    }

    /// Breaker command name.
    pub fn command_name(&self) -> &str {
        &self.config.command_name
    }

    /// Register a plugin. Plugins run in registration order.
    pub fn add_plugin(&mut self, plugin: impl Plugin + 'static) {
        self.plugins.push(Arc::new(plugin));
    }

    /// Register a plugin, builder style.
    pub fn with_plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.add_plugin(plugin);
        self
    }
}

#[async_trait]
impl Client for BreakerClient {
    async fn execute(&self, request: Request) -> Result<Response> {
        debug!(
            method = %request.method(),
            url = %request.url(),
            command = %self.config.command_name,
            "Executing request through breaker"
        );

        let executor = Executor {
            retry: &self.config.http.retry,
            plugins: &self.plugins,
        };
        let attempt = BreakerAttempt {
            transport: self.transport.as_ref(),
            breaker: self.breaker.as_ref(),
            command: &self.config.command_name,
            fallback: self.config.fallback.as_ref(),
        };
        executor.execute(request, &attempt).await
    }

    fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    fn default_headers(&self) -> Option<&HeaderMap> {
        Some(&self.default_headers)
    }
}

/// One attempt guarded by the breaker.
///
/// The transport call and the status check run inside the breaker, so a
/// retryable status counts as a failure for the command.
struct BreakerAttempt<'a> {
    transport: &'a dyn Doer,
    breaker: &'a dyn CircuitBreaker,
    command: &'a str,
    fallback: Option<&'a FallbackFn>,
}

#[async_trait]
impl Attempt for BreakerAttempt<'_> {
    async fn attempt(&self, request: Request) -> AttemptOutcome {
        let received: Mutex<Option<Response>> = Mutex::new(None);

        let call = async {
            let response = self.transport.send(request).await?;
            let status = response.status().as_u16();
            let retryable = response.is_retryable();
            *received.lock() = Some(response);

            if retryable {
                Err(HttpClientError::ServerError { status })
            } else {
                Ok(())
            }
        };

        let result = self
            .breaker
            .execute(self.command, Box::pin(call), self.fallback)
            .await;

        AttemptOutcome {
            response: received.into_inner(),
            error: result.err(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConstantBackoff, PassthroughBreaker, Retrier, run_fallback};
    use futures::future::BoxFuture;
    use http::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StatusDoer {
        status: StatusCode,
        calls: AtomicU32,
    }

    impl StatusDoer {
        fn new(status: u16) -> Self {
            Self {
                status: StatusCode::from_u16(status).unwrap(),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Doer for StatusDoer {
        async fn send(&self, request: Request) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Response::from_parts(
                self.status,
                HeaderMap::new(),
                "{}",
                request.url().clone(),
            ))
        }
    }

    struct FailingDoer;

    #[async_trait]
    impl Doer for FailingDoer {
        async fn send(&self, _request: Request) -> Result<Response> {
            Err(HttpClientError::Connection("connection refused".to_string()))
        }
    }

    /// Breaker stuck open: never runs the call.
    #[derive(Default)]
    struct OpenBreaker {
        configured: Mutex<Vec<(String, CommandConfig)>>,
        refusals: AtomicU32,
    }

    #[async_trait]
    impl CircuitBreaker for OpenBreaker {
        fn configure(&self, command: &str, config: &CommandConfig) {
            self.configured
                .lock()
                .push((command.to_string(), config.clone()));
        }

        async fn execute<'a>(
            &'a self,
            command: &'a str,
            _call: BoxFuture<'a, Result<()>>,
            fallback: Option<&'a FallbackFn>,
        ) -> Result<()> {
            self.refusals.fetch_add(1, Ordering::SeqCst);
            run_fallback(
                fallback,
                HttpClientError::CircuitOpen {
                    command: command.to_string(),
                },
            )
        }
    }

    #[test]
    fn test_command_registered_at_construction() {
        let breaker = Arc::new(OpenBreaker::default());
        let command = CommandConfig::default().with_error_percent_threshold(50);
        let config = BreakerClientConfig::builder()
            .command_name("users")
            .command(command.clone())
            .build();

        let client =
            BreakerClient::with_transport(config, breaker.clone(), StatusDoer::new(200)).unwrap();

        assert_eq!(client.command_name(), "users");
        assert_eq!(*breaker.configured.lock(), vec![("users".to_string(), command)]);
    }

    #[test]
    fn test_config_defaults() {
        let config = BreakerClientConfig::default();
        assert_eq!(config.command_name, DEFAULT_COMMAND_NAME);
        assert_eq!(config.command, CommandConfig::default());
        assert_eq!(config.http.timeout, Duration::from_secs(30));
        assert_eq!(config.http.retry.retry_count, 0);
        assert!(config.fallback.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_consumes_retries_with_backoff() {
        let breaker = Arc::new(OpenBreaker::default());
        let transport = Arc::new(StatusDoer::new(200));
        let config = BreakerClientConfig::builder()
            .command_name("users")
            .retry(RetryConfig::with_retrier(
                2,
                Retrier::new(ConstantBackoff::new(Duration::from_millis(100), Duration::ZERO)),
            ))
            .build();
        let client =
            BreakerClient::with_transport(config, breaker.clone(), transport.clone()).unwrap();

        let start = tokio::time::Instant::now();
        let err = client.get("http://localhost/users").send().await.unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(breaker.refusals.load(Ordering::SeqCst), 3);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
        assert_eq!(err.attempt_errors().len(), 3);
        assert!(err.attempt_errors().iter().all(HttpClientError::is_breaker));
        assert!(err.response().is_none());
    }

    #[tokio::test]
    async fn test_fallback_suppressing_without_response() {
        let config = BreakerClientConfig::builder()
            .retry(RetryConfig::immediate(3))
            .fallback(|_| Ok(()))
            .build();
        let breaker = Arc::new(OpenBreaker::default());
        let client =
            BreakerClient::with_transport(config, breaker.clone(), StatusDoer::new(200)).unwrap();

        let err = client.get("http://localhost/").send().await.unwrap_err();

        assert!(matches!(err, HttpClientError::NoResponse));
        assert_eq!(breaker.refusals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_suppressing_server_error_returns_response() {
        let config = BreakerClientConfig::builder()
            .retry(RetryConfig::immediate(3))
            .fallback(|_| Ok(()))
            .build();
        let transport = Arc::new(StatusDoer::new(503));
        let client = BreakerClient::with_transport(
            config,
            Arc::new(PassthroughBreaker::new()),
            transport.clone(),
        )
        .unwrap();

        let response = client.get("http://localhost/").send().await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_fallback_is_retried() {
        let config = BreakerClientConfig::builder()
            .retry(RetryConfig::immediate(1))
            .fallback(|_| Err(HttpClientError::RequestBuild("fallback refused".to_string())))
            .build();
        let client = BreakerClient::with_transport(
            config,
            Arc::new(PassthroughBreaker::new()),
            FailingDoer,
        )
        .unwrap();

        let err = client.get("http://localhost/").send().await.unwrap_err();

        assert_eq!(err.attempt_errors().len(), 2);
        assert!(err.to_string().contains("fallback failed with"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_with_last_response() {
        let config = BreakerClientConfig::builder()
            .retry(RetryConfig::immediate(2))
            .build();
        let transport = Arc::new(StatusDoer::new(500));
        let client = BreakerClient::with_transport(
            config,
            Arc::new(PassthroughBreaker::new()),
            transport.clone(),
        )
        .unwrap();

        let err = client.get("http://localhost/").send().await.unwrap_err();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(
            err.to_string(),
            "request failed after 3 attempts: server error: 500, server error: 500, server error: 500"
        );
    }
}
