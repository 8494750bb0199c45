//! Circuit breaker capability.
//!
//! The breaker itself (failure windows, open/half-open/closed transitions,
//! concurrency admission) is an external component. This module defines the
//! narrow interface the [`BreakerClient`](crate::BreakerClient) calls through,
//! the per-command configuration it registers, and the fallback hook.

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::{HttpClientError, Result};

/// Fallback invoked with the error that tripped a guarded call.
///
/// Return `Ok(())` to suppress the failure, or `Err` with a replacement error.
pub type FallbackFn = Arc<dyn Fn(HttpClientError) -> Result<()> + Send + Sync>;

/// Per-command breaker configuration, registered once per command name.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandConfig {
    /// How long the breaker waits for the guarded call.
    pub timeout: Duration,
    /// Concurrent calls admitted for the command.
    pub max_concurrent_requests: u32,
    /// Calls needed in a window before the error rate is evaluated.
    pub request_volume_threshold: u32,
    /// How long the circuit stays open before probing again.
    pub sleep_window: Duration,
    /// Error percentage that opens the circuit.
    pub error_percent_threshold: u32,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_concurrent_requests: 100,
            request_volume_threshold: 10,
            sleep_window: Duration::from_millis(10),
            error_percent_threshold: 25,
        }
    }
}

impl CommandConfig {
    /// Set the command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the concurrency ceiling.
    pub fn with_max_concurrent_requests(mut self, max: u32) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    /// Set the request volume threshold.
    pub fn with_request_volume_threshold(mut self, threshold: u32) -> Self {
        self.request_volume_threshold = threshold;
        self
    }

    /// Set the sleep window.
    pub fn with_sleep_window(mut self, window: Duration) -> Self {
        self.sleep_window = window;
        self
    }

    /// Set the error percent threshold.
    pub fn with_error_percent_threshold(mut self, percent: u32) -> Self {
        self.error_percent_threshold = percent;
        self
    }
}

/// External circuit breaker, keyed by command name.
#[async_trait]
pub trait CircuitBreaker: Send + Sync {
    /// Register the configuration of a command.
    fn configure(&self, command: &str, config: &CommandConfig);

    /// Run `call` guarded by the named command.
    ///
    /// When the call fails, or the breaker refuses it (open circuit,
    /// concurrency ceiling, timeout), `fallback` decides the outcome if one
    /// is given; otherwise the failure is returned.
    async fn execute<'a>(
        &'a self,
        command: &'a str,
        call: BoxFuture<'a, Result<()>>,
        fallback: Option<&'a FallbackFn>,
    ) -> Result<()>;
}

#[async_trait]
impl<B: CircuitBreaker + ?Sized> CircuitBreaker for Arc<B> {
    fn configure(&self, command: &str, config: &CommandConfig) {
        (**self).configure(command, config)
    }

    async fn execute<'a>(
        &'a self,
        command: &'a str,
        call: BoxFuture<'a, Result<()>>,
        fallback: Option<&'a FallbackFn>,
    ) -> Result<()> {
        (**self).execute(command, call, fallback).await
    }
}

/// Apply a fallback to a failure.
///
/// Breaker implementations use this so that every fallback error reads the same way.
pub fn run_fallback(fallback: Option<&FallbackFn>, error: HttpClientError) -> Result<()> {
    let Some(fallback) = fallback else {
        return Err(error);
    };
    let run_error = error.to_string();
    fallback(error).map_err(|e| HttpClientError::Fallback {
        error: e.to_string(),
        run_error,
    })
}

/// Breaker that admits every call and keeps no state.
///
/// Failures still go through the fallback. Useful when a command name is
/// required but no breaking is wanted.
#[derive(Debug, Default)]
pub struct PassthroughBreaker {
    commands: RwLock<HashMap<String, CommandConfig>>,
}

impl PassthroughBreaker {
    /// Create a passthrough breaker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration registered for a command.
    pub fn command(&self, command: &str) -> Option<CommandConfig> {
        self.commands.read().get(command).cloned()
    }
}

#[async_trait]
impl CircuitBreaker for PassthroughBreaker {
    fn configure(&self, command: &str, config: &CommandConfig) {
        debug!(command, "Registering breaker command");
        self.commands
            .write()
            .insert(command.to_string(), config.clone());
    }

    async fn execute<'a>(
        &'a self,
        _command: &'a str,
        call: BoxFuture<'a, Result<()>>,
        fallback: Option<&'a FallbackFn>,
    ) -> Result<()> {
        match call.await {
            Ok(()) => Ok(()),
            Err(error) => run_fallback(fallback, error),
        }
    }
}
