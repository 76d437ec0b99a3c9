//! Retry stage.
//!
//! Re-runs the remainder of the chain when a call fails transiently:
//!
//! - transport errors whose kind is transient (not connected, connection
//!   lost, timed out)
//! - responses with status 408, 429, 500, 502, 503 or 504
//!
//! Delays grow exponentially from `base_delay` and are capped by
//! `max_delay`. A numeric `retry-after` header overrides the computed delay,
//! still within the cap. Client errors, decoding errors and cancellations
//! are never retried, and a cancellation during back-off ends the call.
//!
//! This is the only built-in stage that calls `next` more than once.

use crate::stage::{Next, PipelineRequest, PipelineResponse, Stage};
use cirrus_core::{BoxFuture, ClientError, ClientResult};
use std::time::Duration;

/// Status codes retried by default.
pub const RETRYABLE_STATUS_CODES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Back-off policy for [`RetryStage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let computed = retry_after.unwrap_or_else(|| {
            self.base_delay
                .saturating_mul(1_u32.checked_shl(attempt).unwrap_or(u32::MAX))
        });
        computed.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Stage that retries transient failures.
#[derive(Debug, Clone, Default)]
pub struct RetryStage {
    policy: RetryPolicy,
}

impl RetryStage {
    /// Creates a stage with `policy`.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns `Some(hint)` when `result` should be retried.
    fn retry_hint(result: &ClientResult<PipelineResponse>) -> Option<Option<Duration>> {
        match result {
            Ok(response) if RETRYABLE_STATUS_CODES.contains(&response.response.status.as_u16()) => {
                Some(
                    response
                        .response
                        .header("retry-after")
                        .and_then(|value| value.trim().parse::<u64>().ok())
                        .map(Duration::from_secs),
                )
            }
            Err(error) if error.is_transient() => Some(None),
            _ => None,
        }
    }
}

impl Stage for RetryStage {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn process<'a>(
        &'a self,
        request: PipelineRequest,
        next: Next<'a>,
    ) -> BoxFuture<'a, ClientResult<PipelineResponse>> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                let result = next.run(request.clone()).await;

                let Some(hint) = Self::retry_hint(&result) else {
                    return result;
                };
                if attempt >= self.policy.max_retries {
                    return result;
                }

                let delay = self.policy.delay_for(attempt, hint);
                attempt += 1;
                tracing::warn!(
                    stage = "retry",
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    status = result.as_ref().ok().map(|r| r.response.status.as_u16()),
                    "retrying request"
                );

                match request.context.cancellation_token() {
                    Some(token) => {
                        tokio::select! {
                            () = token.cancelled() => {
                                return Err(ClientError::cancelled("request cancelled during retry back-off"));
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => tokio::time::sleep(delay).await,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Pipeline;
    use cirrus_core::{CancellationToken, Context, HttpRequest, Method, TransportErrorKind};
    use cirrus_test::{status_response, MockTransport};
    use std::sync::Arc;

    fn pipeline(transport: &Arc<MockTransport>, max_retries: u32) -> Pipeline {
        Pipeline::builder(transport.clone())
            .add_stage(RetryStage::new(RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
            }))
            .build()
    }

    fn get() -> HttpRequest {
        HttpRequest::parse(Method::GET, "https://example.com").unwrap()
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(0, None), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1, None), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2, None), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3, None), Duration::from_millis(500));
        assert_eq!(policy.delay_for(40, None), Duration::from_millis(500));
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(9))),
            Duration::from_millis(500)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_status() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response(status_response(503))
                .with_response(status_response(500))
                .with_response(status_response(200)),
        );

        let response = pipeline(&transport, 3).run(get(), Context::new()).await.unwrap();
        assert_eq!(response.response.status.as_u16(), 200);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_transport_error() {
        let transport = Arc::new(
            MockTransport::new()
                .with_error(ClientError::transport(TransportErrorKind::ConnectionLost, "reset"))
                .with_response(status_response(200)),
        );

        let response = pipeline(&transport, 3).run(get(), Context::new()).await.unwrap();
        assert_eq!(response.response.status.as_u16(), 200);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let transport = Arc::new(MockTransport::new().with_fallback(status_response(503)));

        let response = pipeline(&transport, 2).run(get(), Context::new()).await.unwrap();
        assert_eq!(response.response.status.as_u16(), 503);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let transport = Arc::new(MockTransport::new().with_response(status_response(404)));

        let response = pipeline(&transport, 3).run(get(), Context::new()).await.unwrap();
        assert_eq!(response.response.status.as_u16(), 404);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_transport_error() {
        let transport = Arc::new(
            MockTransport::new()
                .with_error(ClientError::transport(TransportErrorKind::Other, "tls")),
        );

        let err = pipeline(&transport, 3).run(get(), Context::new()).await.unwrap_err();
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Other));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let transport = Arc::new(MockTransport::new().with_fallback(status_response(503)));
        let pipeline = Pipeline::builder(transport.clone())
            .add_stage(RetryStage::new(RetryPolicy {
                max_retries: 5,
                base_delay: Duration::from_secs(30),
                max_delay: Duration::from_secs(30),
            }))
            .build();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = pipeline
            .run(get(), Context::new().with_cancellation_token(token))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(transport.call_count(), 1);
    }
}
