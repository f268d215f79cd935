use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::metrics::{names, MetricsSink, NoopMetrics};
use crate::{
    Completion, CompletionRequest, GenerationConfig, GenerationError, ProviderError, TextGenerator,
    TokenUsage,
};

/// One try at the external call, kept in the log of the call that made it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub attempt_number: u32,
    pub raw_response: Option<String>,
    pub error: Option<ProviderErrorRecord>,
    #[serde(with = "latency_ms")]
    pub latency: Duration,
}

/// Serializable view of a [`ProviderError`] stored in an attempt log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderErrorRecord {
    pub kind: String,
    pub transient: bool,
    pub message: String,
}

impl From<&ProviderError> for ProviderErrorRecord {
    fn from(error: &ProviderError) -> Self {
        Self {
            kind: error.kind.label().to_string(),
            transient: error.is_transient(),
            message: error.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationOutcome {
    pub raw_response: String,
    pub latency: Duration,
    pub attempts: Vec<GenerationAttempt>,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// States of the retry loop.
///
/// `Attempting` and `Backoff` alternate until one of the terminal states is
/// reached. Transitions are pure so they can be driven without a provider.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Succeeded(Completion),
    ExhaustedRetries(ProviderError),
    FatalError(ProviderError),
}

impl RetryState {
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded(_) | RetryState::ExhaustedRetries(_) | RetryState::FatalError(_)
        )
    }

    /// Applies the result of the attempt made in the `Attempting` state.
    /// Any other state ignores the result.
    pub fn on_result(
        self,
        result: Result<Completion, ProviderError>,
        config: &GenerationConfig,
    ) -> RetryState {
        let RetryState::Attempting { attempt } = self else {
            return self;
        };

        match result {
            Ok(completion) => RetryState::Succeeded(completion),
            Err(error) if !error.is_transient() => RetryState::FatalError(error),
            Err(error) if attempt > config.max_retries => RetryState::ExhaustedRetries(error),
            Err(error) => RetryState::Backoff {
                attempt,
                delay: backoff_delay(attempt, error.retry_after(), config),
            },
        }
    }

    /// Leaves `Backoff` for the next attempt.
    pub fn resume(self) -> RetryState {
        match self {
            RetryState::Backoff { attempt, .. } => RetryState::Attempting {
                attempt: attempt + 1,
            },
            other => other,
        }
    }
}

/// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`, raised
/// to the provider's retry-after hint, never above `max_backoff`.
pub fn backoff_delay(retry: u32, hint: Option<Duration>, config: &GenerationConfig) -> Duration {
    let exponent = retry.saturating_sub(1).min(31);
    let delay = config
        .base_backoff
        .checked_mul(1u32 << exponent)
        .unwrap_or(config.max_backoff);
    let delay = match hint {
        Some(hint) => delay.max(hint),
        None => delay,
    };
    delay.min(config.max_backoff)
}

fn with_jitter(delay: Duration) -> Duration {
    let half = delay / 2;
    let spread = whole_millis(half);
    if spread == 0 {
        return delay;
    }
    half + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

fn whole_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Overall limits a caller places on one generation call.
#[derive(Clone, Debug, Default)]
pub struct CallControl {
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

impl CallControl {
    /// Deadline taken from `config.deadline`, measured from now.
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            deadline: config.deadline.map(|budget| Instant::now() + budget),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// Calls a [`TextGenerator`] with bounded retries, backoff and timeouts.
///
/// The client owns nothing global: construct one per provider and share it by
/// reference or `Arc`.
pub struct GenerationClient<G> {
    generator: G,
    metrics: Arc<dyn MetricsSink>,
}

impl<G> GenerationClient<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            metrics: Arc::new(NoopMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }
}

impl<G: TextGenerator> GenerationClient<G> {
    pub async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<GenerationOutcome, GenerationError> {
        self.generate_with(prompt, config, &CallControl::from_config(config))
            .await
    }

    pub async fn generate_with(
        &self,
        prompt: &str,
        config: &GenerationConfig,
        control: &CallControl,
    ) -> Result<GenerationOutcome, GenerationError> {
        config.validate()?;

        let started = Instant::now();
        let mut attempts: Vec<GenerationAttempt> = Vec::new();
        let mut state = RetryState::start();

        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    if control.cancel.is_cancelled() {
                        return Err(GenerationError::Cancelled { attempts });
                    }
                    let remaining = control.remaining();
                    if remaining.is_some_and(|left| left.is_zero()) {
                        return Err(self.deadline_exceeded(started, attempts));
                    }
                    let limit = remaining.map_or(config.timeout, |left| left.min(config.timeout));
                    let bounded_by_deadline = remaining.is_some_and(|left| left < config.timeout);

                    let request = CompletionRequest {
                        prompt: prompt.to_string(),
                        temperature: config.temperature,
                        max_output_tokens: config.max_output_tokens,
                        model: None,
                    };

                    let attempt_started = Instant::now();
                    let result = tokio::select! {
                        biased;
                        _ = control.cancel.cancelled() => {
                            return Err(GenerationError::Cancelled { attempts });
                        }
                        result = tokio::time::timeout(limit, self.generator.complete(request)) => result,
                    };
                    let latency = attempt_started.elapsed();

                    let result = match result {
                        Ok(result) => result,
                        Err(_) if bounded_by_deadline => {
                            let error = ProviderError::timeout(limit);
                            attempts.push(self.record(attempt, None, Some(&error), latency));
                            return Err(self.deadline_exceeded(started, attempts));
                        }
                        Err(_) => Err(ProviderError::timeout(limit)),
                    };

                    let raw = result.as_ref().ok().map(|completion| completion.text.clone());
                    attempts.push(self.record(attempt, raw, result.as_ref().err(), latency));

                    RetryState::Attempting { attempt }.on_result(result, config)
                }
                RetryState::Backoff { attempt, delay } => {
                    let delay = if config.jitter {
                        with_jitter(delay)
                    } else {
                        delay
                    };
                    if control.remaining().is_some_and(|left| left <= delay) {
                        return Err(self.deadline_exceeded(started, attempts));
                    }
                    tracing::debug!(
                        attempt,
                        delay_ms = whole_millis(delay),
                        "backing off before retrying generation"
                    );
                    tokio::select! {
                        biased;
                        _ = control.cancel.cancelled() => {
                            return Err(GenerationError::Cancelled { attempts });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    RetryState::Backoff { attempt, delay }.resume()
                }
                RetryState::Succeeded(completion) => {
                    let latency = started.elapsed();
                    self.metrics
                        .observe(names::LATENCY_MS, latency.as_secs_f64() * 1000.0, &[]);
                    return Ok(GenerationOutcome {
                        raw_response: completion.text,
                        latency,
                        attempts,
                        finish_reason: completion.finish_reason,
                        usage: completion.usage,
                    });
                }
                RetryState::ExhaustedRetries(last_error) => {
                    self.metrics.increment(names::RETRIES_EXHAUSTED, 1, &[]);
                    tracing::warn!(
                        attempts = attempts.len(),
                        error = %last_error,
                        "generation retries exhausted"
                    );
                    return Err(GenerationError::Service {
                        last_error,
                        attempts,
                    });
                }
                RetryState::FatalError(last_error) => {
                    tracing::warn!(error = %last_error, "generation failed with a non-transient error");
                    return Err(GenerationError::Service {
                        last_error,
                        attempts,
                    });
                }
            };
        }
    }

    fn record(
        &self,
        attempt: u32,
        raw_response: Option<String>,
        error: Option<&ProviderError>,
        latency: Duration,
    ) -> GenerationAttempt {
        let latency_ms = latency.as_secs_f64() * 1000.0;
        let outcome = error.map_or("ok", |error| error.kind.label());
        self.metrics
            .increment(names::ATTEMPTS, 1, &[("outcome", outcome)]);
        self.metrics
            .observe(names::ATTEMPT_LATENCY_MS, latency_ms, &[("outcome", outcome)]);
        match error {
            Some(error) => {
                self.metrics
                    .increment(names::ATTEMPT_FAILURES, 1, &[("kind", outcome)]);
                tracing::debug!(attempt, latency_ms, error = %error, "generation attempt failed");
            }
            None => tracing::debug!(attempt, latency_ms, "generation attempt succeeded"),
        }

        GenerationAttempt {
            attempt_number: attempt,
            raw_response,
            error: error.map(ProviderErrorRecord::from),
            latency,
        }
    }

    fn deadline_exceeded(
        &self,
        started: Instant,
        attempts: Vec<GenerationAttempt>,
    ) -> GenerationError {
        let elapsed = started.elapsed();
        tracing::warn!(
            attempts = attempts.len(),
            elapsed_ms = whole_millis(elapsed),
            "generation deadline exceeded"
        );
        GenerationError::Timeout { elapsed, attempts }
    }
}

mod latency_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        f64::deserialize(deserializer).map(|ms| Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }
}
