//! HTTP client implementation.

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::executor::{DirectAttempt, Executor};
use crate::{
    Doer, HttpClientConfig, HttpClientError, Plugin, PluginSet, Request, RequestBuilder, Response,
    Result,
};

/// Anything that can execute a request with retries and plugins.
///
/// Both [`HttpClient`] and [`BreakerClient`](crate::BreakerClient)
/// implement it; the verb helpers come for free.
#[async_trait]
pub trait Client: Send + Sync {
    /// Execute a request, retrying per the client's retry configuration.
    async fn execute(&self, request: Request) -> Result<Response>;

    /// Base URL relative request URLs are joined onto.
    fn base_url(&self) -> Option<&Url> {
        None
    }

    /// Headers added to every request built through this client.
    fn default_headers(&self) -> Option<&HeaderMap> {
        None
    }

    /// Create a request builder with a custom method.
    fn request(&self, method: Method, url: impl Into<String>) -> RequestBuilder<'_, Self>
    where
        Self: Sized,
    {
        RequestBuilder::new(self, method, url.into())
    }

    /// Create a GET request builder.
    fn get(&self, url: impl Into<String>) -> RequestBuilder<'_, Self>
    where
        Self: Sized,
    {
        self.request(Method::GET, url)
    }

    /// Create a POST request builder.
    fn post(&self, url: impl Into<String>) -> RequestBuilder<'_, Self>
    where
        Self: Sized,
    {
        self.request(Method::POST, url)
    }

    /// Create a PUT request builder.
    fn put(&self, url: impl Into<String>) -> RequestBuilder<'_, Self>
    where
        Self: Sized,
    {
        self.request(Method::PUT, url)
    }

    /// Create a PATCH request builder.
    fn patch(&self, url: impl Into<String>) -> RequestBuilder<'_, Self>
    where
        Self: Sized,
    {
        self.request(Method::PATCH, url)
    }

    /// Create a DELETE request builder.
    fn delete(&self, url: impl Into<String>) -> RequestBuilder<'_, Self>
    where
        Self: Sized,
    {
        self.request(Method::DELETE, url)
    }

    /// Create a HEAD request builder.
    fn head(&self, url: impl Into<String>) -> RequestBuilder<'_, Self>
    where
        Self: Sized,
    {
        self.request(Method::HEAD, url)
    }
}

/// HTTP client with retries, backoff and lifecycle plugins.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Doer>,
    config: Arc<HttpClientConfig>,
    plugins: PluginSet,
    base_url: Option<Url>,
    default_headers: HeaderMap,
}

impl HttpClient {
    /// Create a new HTTP client backed by reqwest.
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let transport = build_reqwest(&config)?;
        Self::with_transport(config, transport)
    }

    /// Create a client that sends through a custom transport.
    ///
    /// Connection settings in `config` (pooling, compression, redirects)
    /// only apply to the built-in transport.
    pub fn with_transport(
        config: HttpClientConfig,
        transport: impl Doer + 'static,
    ) -> Result<Self> {
        let base_url = parse_base_url(&config)?;
        let default_headers = parse_default_headers(&config)?;
        let plugins = PluginSet::new().isolate_panics(config.isolate_plugin_panics);

        Ok(Self {
            transport: Arc::new(transport),
            config: Arc::new(config),
            plugins,
            base_url,
            default_headers,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
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

    /// Registered plugins.
    pub fn plugins(&self) -> &PluginSet {
        &self.plugins
    }
}

#[async_trait]
impl Client for HttpClient {
    async fn execute(&self, request: Request) -> Result<Response> {
        debug!(method = %request.method(), url = %request.url(), "Executing request");

        let executor = Executor {
            retry: &self.config.retry,
            plugins: &self.plugins,
        };
        let attempt = DirectAttempt {
            transport: self.transport.as_ref(),
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

/// Build the reqwest client described by the configuration.
pub(crate) fn build_reqwest(config: &HttpClientConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .user_agent(&config.user_agent)
        .gzip(config.gzip)
        .brotli(config.brotli);

    if config.follow_redirects {
        builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
    } else {
        builder = builder.redirect(reqwest::redirect::Policy::none());
    }

    Ok(builder.build()?)
}

pub(crate) fn parse_base_url(config: &HttpClientConfig) -> Result<Option<Url>> {
    config
        .base_url
        .as_deref()
        .map(|url| {
            Url::parse(url).map_err(|e| HttpClientError::InvalidUrl(format!("{url}: {e}")))
        })
        .transpose()
}

pub(crate) fn parse_default_headers(config: &HttpClientConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(config.default_headers.len());
    for (name, value) in &config.default_headers {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|_| HttpClientError::RequestBuild(format!("invalid header '{name}'")))?;
        let value = HeaderValue::try_from(value.as_str()).map_err(|_| {
            HttpClientError::RequestBuild(format!("invalid value for header '{name}'"))
        })?;
        headers.append(name, value);
    }
    Ok(headers)
}
