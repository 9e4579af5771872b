//! Notification delivery with bounded retries

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::{AlertContext, DispatchOutcome, ProviderResponse};
use crate::provider::NotificationProvider;

use super::retry::RetryPolicy;

/// Sends alert contexts through a provider until a terminal state is reached
pub struct Dispatcher<P> {
    provider: P,
    policy: RetryPolicy,
}

impl<P: NotificationProvider> Dispatcher<P> {
    /// Create a new dispatcher
    pub fn new(provider: P, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// The provider notifications go through
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Deliver `context`, retrying rate-limited attempts within the retry budget.
    ///
    /// Accepted and rejected responses are terminal on the attempt that
    /// produced them. Transport failures abort immediately with an error.
    /// `cancel` is honoured between attempts, never during one.
    pub async fn dispatch(
        &self,
        context: &AlertContext,
        cancel: &CancellationToken,
    ) -> Result<DispatchOutcome> {
        let payload = self.provider.build_payload(context)?;
        let mut budget = self.policy.budget();

        loop {
            if cancel.is_cancelled() {
                warn!(
                    subject = %context.subject_key,
                    attempts = budget.attempts(),
                    "Dispatch cancelled before next attempt"
                );
                return Ok(DispatchOutcome::Cancelled {
                    attempts: budget.attempts(),
                });
            }

            let attempt = budget.record_attempt();
            let response = match self.provider.send(&payload).await {
                Ok(response) => response,
                Err(e) => {
                    error!(
                        provider = self.provider.name(),
                        subject = %context.subject_key,
                        attempt,
                        error = %e,
                        "Could not send notification"
                    );
                    return Err(e);
                }
            };

            let classification = response.label();
            match response {
                ProviderResponse::Accepted { dedup_key } => {
                    info!(
                        provider = self.provider.name(),
                        subject = %context.subject_key,
                        attempt,
                        classification,
                        dedup_key = %dedup_key,
                        "Registered notification"
                    );
                    return Ok(DispatchOutcome::Delivered {
                        dedup_key,
                        attempts: attempt,
                    });
                }
                ProviderResponse::Rejected { status, message } => {
                    error!(
                        provider = self.provider.name(),
                        subject = %context.subject_key,
                        attempt,
                        classification,
                        status = %status,
                        message = %message,
                        "Provider rejected notification"
                    );
                    return Ok(DispatchOutcome::Rejected {
                        status,
                        message,
                        attempts: attempt,
                    });
                }
                ProviderResponse::RateLimited => {
                    let Some(delay) = budget.next_delay() else {
                        error!(
                            provider = self.provider.name(),
                            subject = %context.subject_key,
                            attempts = attempt,
                            classification,
                            "Provider still rate limiting, retries exhausted"
                        );
                        return Ok(DispatchOutcome::RetriesExhausted { attempts: attempt });
                    };

                    warn!(
                        provider = self.provider.name(),
                        subject = %context.subject_key,
                        attempt,
                        classification,
                        remaining = budget.remaining(),
                        delay = %humantime::format_duration(delay),
                        "Provider is rate limiting, retrying"
                    );

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            warn!(
                                subject = %context.subject_key,
                                attempts = attempt,
                                "Dispatch cancelled while waiting to retry"
                            );
                            return Ok(DispatchOutcome::Cancelled { attempts: attempt });
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::ThresholdPair;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Replays a fixed script of answers, then repeats the fallback
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ProviderResponse>>>,
        fallback: ProviderResponse,
        sent: Mutex<Vec<Vec<u8>>>,
        fail_payload: bool,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ProviderResponse>>, fallback: ProviderResponse) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback,
                sent: Mutex::new(Vec::new()),
                fail_payload: false,
            }
        }

        fn always(response: ProviderResponse) -> Self {
            Self::new(vec![], response)
        }

        fn calls(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NotificationProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn build_payload(&self, context: &AlertContext) -> Result<Vec<u8>> {
            if self.fail_payload {
                return Err(Error::PayloadConstruction("no routing key".to_string()));
            }
            Ok(context.subject_key.clone().into_bytes())
        }

        async fn send(&self, payload: &[u8]) -> Result<ProviderResponse> {
            self.sent.lock().unwrap().push(payload.to_vec());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback.clone()))
        }
    }

    fn context() -> AlertContext {
        AlertContext {
            subject_field: "datname".to_string(),
            subject_key: "orders".to_string(),
            summary: "datname orders is out of range at 25.00".to_string(),
            current_value: 25.0,
            thresholds: ThresholdPair::new(1.0, 50.0),
            estimated_seconds_to_failure: 50.0,
            timestamp: Utc::now(),
        }
    }

    fn accepted(key: &str) -> ProviderResponse {
        ProviderResponse::Accepted {
            dedup_key: key.to_string(),
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(Duration::from_secs(5), max_attempts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_first_time_is_single_attempt() {
        let dispatcher = Dispatcher::new(ScriptedProvider::always(accepted("dk-1")), policy(5));

        let outcome = dispatcher
            .dispatch(&context(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Delivered {
                dedup_key: "dk-1".to_string(),
                attempts: 1
            }
        );
        assert_eq!(dispatcher.provider().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_three_times_then_accepted() {
        let provider = ScriptedProvider::new(
            vec![
                Ok(ProviderResponse::RateLimited),
                Ok(ProviderResponse::RateLimited),
                Ok(ProviderResponse::RateLimited),
            ],
            accepted("dk-4"),
        );
        let dispatcher = Dispatcher::new(provider, policy(10));
        let started = Instant::now();

        let outcome = dispatcher
            .dispatch(&context(), &CancellationToken::new())
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert_eq!(outcome.attempts(), 4);
        assert!(outcome.is_delivered());
        assert!(elapsed >= Duration::from_secs(15), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(16), "elapsed {elapsed:?}");

        // every attempt resubmits the same payload
        let sent = dispatcher.provider().sent.lock().unwrap();
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|p| p == b"orders"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_terminal() {
        let dispatcher = Dispatcher::new(
            ScriptedProvider::always(ProviderResponse::Rejected {
                status: "invalid event".to_string(),
                message: "Event object is invalid".to_string(),
            }),
            policy(5),
        );

        let outcome = dispatcher
            .dispatch(&context(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Rejected {
                status: "invalid event".to_string(),
                message: "Event object is invalid".to_string(),
                attempts: 1
            }
        );
        assert_eq!(dispatcher.provider().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_is_respected() {
        let dispatcher =
            Dispatcher::new(ScriptedProvider::always(ProviderResponse::RateLimited), policy(3));

        let outcome = dispatcher
            .dispatch(&context(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::RetriesExhausted { attempts: 3 });
        assert_eq!(dispatcher.provider().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_fatal_and_not_retried() {
        let provider = ScriptedProvider::new(
            vec![Err(Error::ProviderTransport("connection refused".to_string()))],
            accepted("never"),
        );
        let dispatcher = Dispatcher::new(provider, policy(5));

        let result = dispatcher
            .dispatch(&context(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::ProviderTransport(_))));
        assert_eq!(dispatcher.provider().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_failure_makes_no_attempt() {
        let mut provider = ScriptedProvider::always(accepted("never"));
        provider.fail_payload = true;
        let dispatcher = Dispatcher::new(provider, policy(5));

        let result = dispatcher
            .dispatch(&context(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::PayloadConstruction(_))));
        assert_eq!(dispatcher.provider().calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait() {
        let dispatcher =
            Dispatcher::new(ScriptedProvider::always(ProviderResponse::RateLimited), policy(10));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let outcome = dispatcher.dispatch(&context(), &cancel).await.unwrap();

        // attempts at t=0 and t=5, cancelled while waiting for t=10
        assert_eq!(outcome, DispatchOutcome::Cancelled { attempts: 2 });
        assert_eq!(dispatcher.provider().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let dispatcher = Dispatcher::new(ScriptedProvider::always(accepted("dk")), policy(5));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = dispatcher.dispatch(&context(), &cancel).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Cancelled { attempts: 0 });
        assert_eq!(dispatcher.provider().calls(), 0);
    }
}
