use matchcast_models::{FixtureMatch, PredictionRecord, ProviderError, ProviderTier};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::provider::PredictionProvider;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// `base * 2^(attempt-1)` without jitter.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        self.base_backoff(attempt) + jitter
    }
}

/// A provider and the model to ask it for.
#[derive(Clone)]
pub struct TierSpec {
    pub provider: Arc<dyn PredictionProvider>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct ChainSuccess {
    pub record: PredictionRecord,
    pub attempts: u32,
    pub tier: ProviderTier,
    pub retried: bool,
}

#[derive(Debug, Clone)]
pub struct ChainFailure {
    pub error: ProviderError,
    pub attempts: u32,
    pub retried: bool,
    /// Whether any attempt in any tier was rate limited.
    pub rate_limited: bool,
}

/// Primary model with retry, then one same-family alternate, then one model
/// from a different provider.
pub struct ProviderChain {
    primary: TierSpec,
    alternate_model: Option<String>,
    fallback: Option<TierSpec>,
    retry: RetryPolicy,
}

impl ProviderChain {
    pub fn new(primary: TierSpec) -> Self {
        Self {
            primary,
            alternate_model: None,
            fallback: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_alternate_model(mut self, model: impl Into<String>) -> Self {
        self.alternate_model = Some(model.into());
        self
    }

    pub fn with_fallback(mut self, fallback: TierSpec) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn default_model(&self) -> &str {
        &self.primary.model
    }

    pub async fn predict(&self, fixture: &FixtureMatch, preferred_model: Option<&str>) -> Result<ChainSuccess, ChainFailure> {
        let model = preferred_model.unwrap_or(&self.primary.model);
        let provider = self.primary.provider.as_ref();
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempts = 0;
        let mut rate_limited = false;
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            attempts += 1;
            match provider.generate(model, fixture).await {
                Ok(payload) => {
                    let record = PredictionRecord::new(fixture, model, provider.name(), ProviderTier::Primary, attempts, payload);
                    return Ok(ChainSuccess {
                        record,
                        attempts,
                        tier: ProviderTier::Primary,
                        retried: attempts > 1,
                    });
                }
                Err(error) if !error.is_retriable() => {
                    warn!(match_id = %fixture.match_id, model, "non-retriable provider error: {}", error);
                    return Err(ChainFailure {
                        rate_limited: rate_limited || error.is_rate_limited(),
                        error,
                        attempts,
                        retried: attempts > 1,
                    });
                }
                Err(error) => {
                    rate_limited |= error.is_rate_limited();
                    if attempt < max_attempts {
                        let wait = self.retry.backoff(attempt);
                        debug!(match_id = %fixture.match_id, model, attempt, ?wait, "retriable provider error: {}", error);
                        tokio::time::sleep(wait).await;
                    }
                    last_error = Some(error);
                }
            }
        }

        let mut fallbacks: Vec<(TierSpec, ProviderTier)> = Vec::new();
        if let Some(alternate) = self.alternate_model.as_ref().filter(|alt| alt.as_str() != model) {
            fallbacks.push((
                TierSpec {
                    provider: Arc::clone(&self.primary.provider),
                    model: alternate.clone(),
                },
                ProviderTier::SameFamilyAlternate,
            ));
        }
        if let Some(fallback) = &self.fallback {
            fallbacks.push((fallback.clone(), ProviderTier::CrossProvider));
        }

        for (spec, tier) in fallbacks {
            attempts += 1;
            info!(match_id = %fixture.match_id, provider = spec.provider.name(), model = %spec.model, ?tier, "falling back");
            match spec.provider.generate(&spec.model, fixture).await {
                Ok(payload) => {
                    let record = PredictionRecord::new(fixture, &spec.model, spec.provider.name(), tier, attempts, payload);
                    return Ok(ChainSuccess {
                        record,
                        attempts,
                        tier,
                        retried: true,
                    });
                }
                Err(error) => {
                    warn!(match_id = %fixture.match_id, model = %spec.model, ?tier, "fallback failed: {}", error);
                    rate_limited |= error.is_rate_limited();
                    last_error = Some(error);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            ProviderError::new(matchcast_models::ProviderErrorKind::Unknown, provider.name(), "no attempts made")
        });
        Err(ChainFailure {
            error,
            attempts,
            retried: attempts > 1,
            rate_limited,
        })
    }
}
