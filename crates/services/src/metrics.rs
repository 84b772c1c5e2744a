use matchcast_models::{ProviderErrorKind, ProviderTier, RunStatus};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Pipeline counters, exported on `/metrics` in the Prometheus text format.
pub struct PipelineMetrics {
    registry: Registry,
    predictions_generated: IntCounterVec,
    prediction_failures: IntCounterVec,
    runs: IntCounterVec,
    waves: IntCounter,
    circuit_breaks: IntCounter,
    fixtures_scored: IntCounter,
    concurrency: IntGauge,
    delay_ms: IntGauge,
}

impl PipelineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("matchcast".to_string()), None)?;

        let predictions_generated = IntCounterVec::new(
            Opts::new("predictions_generated_total", "Predictions generated, by provider tier"),
            &["tier"],
        )?;
        let prediction_failures = IntCounterVec::new(
            Opts::new("prediction_failures_total", "Matches whose prediction failed after all tiers, by error kind"),
            &["kind"],
        )?;
        let runs = IntCounterVec::new(
            Opts::new("runs_total", "Orchestrator invocations, by outcome"),
            &["status"],
        )?;
        let waves = IntCounter::new("waves_total", "Prediction waves executed")?;
        let circuit_breaks = IntCounter::new("circuit_breaks_total", "Circuit breaker trips")?;
        let fixtures_scored = IntCounter::new("fixtures_scored_total", "Finished fixtures scored for accuracy")?;
        let concurrency = IntGauge::new("wave_concurrency", "Current wave concurrency")?;
        let delay_ms = IntGauge::new("wave_delay_ms", "Current inter-wave delay in milliseconds")?;

        registry.register(Box::new(predictions_generated.clone()))?;
        registry.register(Box::new(prediction_failures.clone()))?;
        registry.register(Box::new(runs.clone()))?;
        registry.register(Box::new(waves.clone()))?;
        registry.register(Box::new(circuit_breaks.clone()))?;
        registry.register(Box::new(fixtures_scored.clone()))?;
        registry.register(Box::new(concurrency.clone()))?;
        registry.register(Box::new(delay_ms.clone()))?;

        Ok(Self {
            registry,
            predictions_generated,
            prediction_failures,
            runs,
            waves,
            circuit_breaks,
            fixtures_scored,
            concurrency,
            delay_ms,
        })
    }

    pub fn record_prediction(&self, tier: ProviderTier) {
        let label = match tier {
            ProviderTier::Primary => "primary",
            ProviderTier::SameFamilyAlternate => "same_family_alternate",
            ProviderTier::CrossProvider => "cross_provider",
        };
        self.predictions_generated.with_label_values(&[label]).inc();
    }

    pub fn record_failure(&self, kind: ProviderErrorKind) {
        self.prediction_failures.with_label_values(&[kind.as_str()]).inc();
    }

    pub fn record_run(&self, status: RunStatus) {
        let label = match status {
            RunStatus::Completed => "completed",
            RunStatus::AlreadyGenerated => "already_generated",
            RunStatus::Paused => "paused",
        };
        self.runs.with_label_values(&[label]).inc();
    }

    pub fn record_wave(&self, concurrency: usize, delay_ms: u64) {
        self.waves.inc();
        self.concurrency.set(i64::try_from(concurrency).unwrap_or(i64::MAX));
        self.delay_ms.set(i64::try_from(delay_ms).unwrap_or(i64::MAX));
    }

    pub fn record_circuit_break(&self) {
        self.circuit_breaks.inc();
    }

    pub fn record_scored(&self, fixtures: usize) {
        self.fixtures_scored.inc_by(fixtures as u64);
    }

    pub fn circuit_breaks(&self) -> u64 {
        self.circuit_breaks.get()
    }

    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
