//! Plugin that reports per-attempt timings to a callback.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{HttpClientError, Plugin, PluginContext, Response};

/// Metrics callback: method, URL, status (absent when no response) and duration.
pub type MetricsCallbackFn = Arc<dyn Fn(&str, &str, Option<u16>, Duration) + Send + Sync>;

#[derive(Clone, Copy)]
struct AttemptStart(Instant);

/// Times every attempt and hands the result to a callback.
#[derive(Clone)]
pub struct MetricsPlugin {
    on_complete: MetricsCallbackFn,
}

impl MetricsPlugin {
    /// Create a new metrics plugin with a callback.
    pub fn new<F>(on_complete: F) -> Self
    where
        F: Fn(&str, &str, Option<u16>, Duration) + Send + Sync + 'static,
    {
        Self {
            on_complete: Arc::new(on_complete),
        }
    }

    fn report(&self, ctx: &PluginContext<'_>, status: Option<u16>) {
        let elapsed = ctx
            .extensions()
            .get::<AttemptStart>()
            .map(|start| start.0.elapsed())
            .unwrap_or_default();
        let request = ctx.request();
        (self.on_complete)(
            request.method().as_str(),
            request.url().as_str(),
            status,
            elapsed,
        );
    }
}

impl std::fmt::Debug for MetricsPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsPlugin").finish_non_exhaustive()
    }
}

impl Plugin for MetricsPlugin {
    fn on_request_start(&self, ctx: &mut PluginContext<'_>) {
        ctx.extensions_mut().insert(AttemptStart(Instant::now()));
    }

    fn on_request_end(&self, ctx: &mut PluginContext<'_>, response: &Response) {
        self.report(ctx, Some(response.status().as_u16()));
    }

    fn on_error(&self, ctx: &mut PluginContext<'_>, _error: &HttpClientError) {
        self.report(ctx, None);
    }
}
