//! The retry loop shared by every client.
//!
//! One call runs up to `retry_count + 1` strictly sequential attempts. Each
//! attempt gets a fresh copy of the request over the same buffered body
//! bytes. Transport errors, 5xx and 429 responses are retried; anything else
//! ends the call. The only suspension points are the attempt itself and the
//! backoff sleep, both raced against the request's cancellation token.

use async_trait::async_trait;
use http::Extensions;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::plugin::{PluginContext, PluginSet};
use crate::{Doer, HttpClientError, MultiError, Request, Response, Result, RetryConfig};

/// Sleep for `duration`, returning early with [`HttpClientError::Cancelled`]
/// if the token fires first.
pub async fn sleep_interruptible(
    duration: Duration,
    cancellation: Option<&CancellationToken>,
) -> Result<()> {
    let Some(token) = cancellation else {
        tokio::time::sleep(duration).await;
        return Ok(());
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(HttpClientError::Cancelled { response: None }),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Result of one attempt, already classified.
///
/// `error` set with `response` set means a retryable status.
#[derive(Debug)]
pub(crate) struct AttemptOutcome {
    pub(crate) response: Option<Response>,
    pub(crate) error: Option<HttpClientError>,
}

impl AttemptOutcome {
    pub(crate) fn classify(result: Result<Response>) -> Self {
        match result {
            Ok(response) if response.is_retryable() => Self {
                error: Some(HttpClientError::ServerError {
                    status: response.status().as_u16(),
                }),
                response: Some(response),
            },
            Ok(response) => Self {
                response: Some(response),
                error: None,
            },
            Err(error) => Self {
                response: None,
                error: Some(error),
            },
        }
    }
}

/// One attempt of a call.
#[async_trait]
pub(crate) trait Attempt: Send + Sync {
    async fn attempt(&self, request: Request) -> AttemptOutcome;
}

/// Attempt that goes straight to the transport.
pub(crate) struct DirectAttempt<'a> {
    pub(crate) transport: &'a dyn Doer,
}

#[async_trait]
impl Attempt for DirectAttempt<'_> {
    async fn attempt(&self, request: Request) -> AttemptOutcome {
        AttemptOutcome::classify(self.transport.send(request).await)
    }
}

/// Drives the attempts of one call.
pub(crate) struct Executor<'a> {
    pub(crate) retry: &'a RetryConfig,
    pub(crate) plugins: &'a PluginSet,
}

impl Executor<'_> {
    pub(crate) async fn execute(
        &self,
        mut request: Request,
        attempt: &(dyn Attempt + '_),
    ) -> Result<Response> {
        request.buffer_body().await?;

        let cancellation = request.cancellation().cloned();
        let max_attempts = self.retry.max_attempts();
        let mut extensions = Extensions::new();
        let mut errors = MultiError::new();
        let mut last_response: Option<Response> = None;

        for n in 0..max_attempts {
            if cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
                debug!(attempt = n, url = %request.url(), "Request cancelled before attempt");
                return Err(cancelled(last_response));
            }

            self.plugins
                .request_start(&mut PluginContext::new(&request, n, &mut extensions));

            let outcome = match &cancellation {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    outcome = attempt.attempt(request.replay()) => Some(outcome),
                },
                None => Some(attempt.attempt(request.replay()).await),
            };

            let mut ctx = PluginContext::new(&request, n, &mut extensions);
            let Some(AttemptOutcome { response, error }) = outcome else {
                debug!(attempt = n, url = %request.url(), "Request cancelled in flight");
                self.plugins
                    .error(&mut ctx, &HttpClientError::Cancelled { response: None });
                return Err(cancelled(last_response));
            };

            match (&response, &error) {
                (Some(response), _) => self.plugins.request_end(&mut ctx, response),
                (None, Some(error)) => self.plugins.error(&mut ctx, error),
                (None, None) => {}
            }

            let Some(error) = error else {
                return response.ok_or(HttpClientError::NoResponse);
            };

            if n + 1 == max_attempts {
                errors.push(error);
                last_response = response;
                break;
            }

            let delay = self.retry.delay_for_retry(n);
            debug!(
                attempt = n + 1,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Retrying request"
            );
            errors.push(error);
            last_response = response;

            if sleep_interruptible(delay, cancellation.as_ref()).await.is_err() {
                debug!(
                    attempt = n + 1,
                    url = %request.url(),
                    "Request cancelled during backoff"
                );
                return Err(cancelled(last_response));
            }
        }

        warn!(
            method = %request.method(),
            url = %request.url(),
            attempts = max_attempts,
            error = %errors,
            "Request failed after all attempts"
        );

        Err(HttpClientError::Exhausted {
            attempts: max_attempts,
            errors,
            response: last_response.map(Box::new),
        })
    }
}

fn cancelled(response: Option<Response>) -> HttpClientError {
    HttpClientError::Cancelled {
        response: response.map(Box::new),
    }
}
