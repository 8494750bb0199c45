//! Plugin that logs every attempt.

use std::time::Instant;

use crate::{HttpClientError, Plugin, PluginContext, Response};

#[derive(Clone, Copy)]
struct RequestStart(Instant);

/// Logs each attempt with its method, URL, outcome and duration.
#[derive(Debug, Default, Clone)]
pub struct RequestLogger {
    log_headers: bool,
}

impl RequestLogger {
    /// Create a new request logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log request and response headers at trace level.
    pub fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }

    fn elapsed_ms(ctx: &PluginContext<'_>) -> u64 {
        ctx.extensions()
            .get::<RequestStart>()
            .map(|start| u64::try_from(start.0.elapsed().as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default()
    }
}

impl Plugin for RequestLogger {
    fn on_request_start(&self, ctx: &mut PluginContext<'_>) {
        ctx.extensions_mut().insert(RequestStart(Instant::now()));

        if self.log_headers {
            for (name, value) in ctx.request().headers() {
                tracing::trace!(header = %name, value = ?value, "Request header");
            }
        }
    }

    fn on_request_end(&self, ctx: &mut PluginContext<'_>, response: &Response) {
        tracing::info!(
            method = %ctx.request().method(),
            url = %ctx.request().url(),
            attempt = ctx.attempt(),
            status = response.status().as_u16(),
            elapsed_ms = Self::elapsed_ms(ctx),
            "HTTP request completed"
        );

        if self.log_headers {
            for (name, value) in response.headers() {
                tracing::trace!(header = %name, value = ?value, "Response header");
            }
        }
    }

    fn on_error(&self, ctx: &mut PluginContext<'_>, error: &HttpClientError) {
        tracing::warn!(
            method = %ctx.request().method(),
            url = %ctx.request().url(),
            attempt = ctx.attempt(),
            elapsed_ms = Self::elapsed_ms(ctx),
            error = %error,
            "HTTP request failed"
        );
    }
}
