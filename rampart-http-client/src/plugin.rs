//! Request lifecycle plugins.
//!
//! Plugins observe every attempt of a call: `on_request_start` before the
//! attempt, then exactly one of `on_request_end` (a response arrived, even
//! one that will be retried) or `on_error` (no response). Hooks run
//! synchronously in registration order and cannot alter control flow.

use http::Extensions;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::{HttpClientError, Request, Response};

/// What a plugin sees of the attempt in flight.
///
/// `extensions` lives for the whole call, so a value stored at
/// `on_request_start` can be read back at `on_request_end` or `on_error`.
pub struct PluginContext<'a> {
    request: &'a Request,
    attempt: u32,
    extensions: &'a mut Extensions,
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(request: &'a Request, attempt: u32, extensions: &'a mut Extensions) -> Self {
        Self {
            request,
            attempt,
            extensions,
        }
    }

    /// The request being sent.
    pub fn request(&self) -> &Request {
        self.request
    }

    /// Zero-based attempt number.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Call-scoped metadata.
    pub fn extensions(&self) -> &Extensions {
        self.extensions
    }

    /// Mutable call-scoped metadata.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        self.extensions
    }
}

/// Observer of request lifecycle events.
pub trait Plugin: Send + Sync {
    /// Called before each attempt.
    fn on_request_start(&self, _ctx: &mut PluginContext<'_>) {}

    /// Called when an attempt produced a response.
    fn on_request_end(&self, _ctx: &mut PluginContext<'_>, _response: &Response) {}

    /// Called when an attempt produced no response.
    fn on_error(&self, _ctx: &mut PluginContext<'_>, _error: &HttpClientError) {}
}

impl<P: Plugin + ?Sized> Plugin for Arc<P> {
    fn on_request_start(&self, ctx: &mut PluginContext<'_>) {
        (**self).on_request_start(ctx)
    }

    fn on_request_end(&self, ctx: &mut PluginContext<'_>, response: &Response) {
        (**self).on_request_end(ctx, response)
    }

    fn on_error(&self, ctx: &mut PluginContext<'_>, error: &HttpClientError) {
        (**self).on_error(ctx, error)
    }
}

/// Ordered list of plugins attached to a client.
#[derive(Clone, Default)]
pub struct PluginSet {
    plugins: Vec<Arc<dyn Plugin>>,
    isolate_panics: bool,
}

impl PluginSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Contain panics raised by a plugin instead of unwinding through the retry loop.
    pub fn isolate_panics(mut self, isolate: bool) -> Self {
        self.isolate_panics = isolate;
        self
    }

    /// Append a plugin.
    pub fn push(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Number of plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Check whether no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub(crate) fn request_start(&self, ctx: &mut PluginContext<'_>) {
        self.notify("on_request_start", |plugin| plugin.on_request_start(ctx));
    }

    pub(crate) fn request_end(&self, ctx: &mut PluginContext<'_>, response: &Response) {
        self.notify("on_request_end", |plugin| plugin.on_request_end(ctx, response));
    }

    pub(crate) fn error(&self, ctx: &mut PluginContext<'_>, error: &HttpClientError) {
        self.notify("on_error", |plugin| plugin.on_error(ctx, error));
    }

    fn notify(&self, hook: &'static str, mut call: impl FnMut(&dyn Plugin)) {
        for plugin in &self.plugins {
            if !self.isolate_panics {
                call(plugin.as_ref());
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| call(plugin.as_ref()))).is_err() {
                tracing::error!(hook, "Plugin panicked, continuing");
            }
        }
    }
}

impl fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSet")
            .field("plugins", &self.plugins.len())
            .field("isolate_panics", &self.isolate_panics)
            .finish()
    }
}
