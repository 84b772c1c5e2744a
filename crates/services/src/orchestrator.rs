use chrono::{NaiveDate, Utc};
use futures::future::join_all;
use matchcast_db::{get_json, put_json, StateStore};
use matchcast_models::{
    keys, parse_date, DailyAggregate, FixtureMatch, MatchFailure, PauseWindow, PredictionRecord,
    ProgressState, Result, RunOptions, RunResult, RunStatus,
};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chain::ProviderChain;
use crate::controller::{AttemptOutcome, ConcurrencyController, ControllerConfig, WaveAdjustment};
use crate::fixtures::FixtureAdapter;
use crate::metrics::PipelineMetrics;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How many global fixtures to take when no featured fixture exists.
    pub fallback_limit: usize,
    /// Cap on unfiltered (non-featured) runs.
    pub max_matches: usize,
    pub controller: ControllerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fallback_limit: 12,
            max_matches: 60,
            controller: ControllerConfig::default(),
        }
    }
}

struct WorkingSet {
    fixtures: Vec<FixtureMatch>,
    total_matches: usize,
    featured_count: usize,
}

/// Entry point of the prediction pipeline. One invocation handles one date and
/// checkpoints after every wave so it can be killed at any moment and resumed.
pub struct BatchOrchestrator {
    store: Arc<dyn StateStore>,
    fixtures: Arc<FixtureAdapter>,
    chain: Arc<ProviderChain>,
    metrics: Arc<PipelineMetrics>,
    config: PipelineConfig,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn StateStore>,
        fixtures: Arc<FixtureAdapter>,
        chain: Arc<ProviderChain>,
        metrics: Arc<PipelineMetrics>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            fixtures,
            chain,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run_wave(&self, date: &str, options: RunOptions) -> Result<RunResult> {
        let date = parse_date(date)?;
        self.run_for_date(date, options).await
    }

    pub async fn run_for_date(&self, date: NaiveDate, options: RunOptions) -> Result<RunResult> {
        let run_id = Uuid::new_v4();
        let store = self.store.as_ref();

        let existing: Option<DailyAggregate> = get_json(store, &keys::daily_aggregate(date)).await?;
        let progress: Option<ProgressState> = get_json(store, &keys::daily_progress(date)).await?;

        if let Some(aggregate) = &existing {
            if !options.force && !options.resume {
                info!(%run_id, %date, processed = aggregate.processed, "predictions already generated");
                self.metrics.record_run(RunStatus::AlreadyGenerated);
                return Ok(self.summary(run_id, RunStatus::AlreadyGenerated, aggregate));
            }
        }

        if let Some(until) = self.active_pause(date).await? {
            info!(%run_id, %date, %until, "pipeline paused");
            self.metrics.record_run(RunStatus::Paused);
            let mut result = match &existing {
                Some(aggregate) => self.summary(run_id, RunStatus::Paused, aggregate),
                None => RunResult::empty(run_id, date, RunStatus::Paused),
            };
            result.paused_until = Some(until);
            return Ok(result);
        }

        let working = self.select_working_set(date, options.featured_only).await?;
        info!(
            %run_id,
            %date,
            total = working.total_matches,
            featured = working.featured_count,
            selected = working.fixtures.len(),
            force = options.force,
            resume = options.resume,
            "starting prediction run"
        );

        let (mut aggregate, had_aggregate) = match existing {
            Some(aggregate) if !options.force => (aggregate, true),
            Some(_) => {
                warn!(%run_id, %date, "force set, discarding existing aggregate");
                (DailyAggregate::new(date, working.total_matches, working.featured_count), false)
            }
            None => (DailyAggregate::new(date, working.total_matches, working.featured_count), false),
        };
        aggregate.total_matches = aggregate.total_matches.max(working.total_matches);
        aggregate.featured_count = aggregate.featured_count.max(working.featured_count);

        let mut pending = working.fixtures;
        let mut retry_ids: HashSet<String> = HashSet::new();
        if options.resume {
            let done: HashSet<String> = aggregate.match_ids().into_iter().map(str::to_string).collect();
            pending.retain(|f| !done.contains(&f.match_id));

            // Untried matches first, then earlier failures, least recently failed first.
            let failed_at: HashMap<&str, usize> = aggregate
                .failures
                .iter()
                .enumerate()
                .map(|(i, f)| (f.match_id.as_str(), i + 1))
                .collect();
            pending.sort_by_key(|f| failed_at.get(f.match_id.as_str()).copied().unwrap_or(0));
            retry_ids = failed_at.keys().map(|id| (*id).to_string()).collect();
        }

        // Deferred retries of failed matches do not count as remaining work, so
        // repeated resumes always drain.
        let mut remaining_after_wave = 0;
        if let Some(wave_size) = options.wave_size.filter(|size| *size > 0) {
            if pending.len() > wave_size {
                let deferred = pending.split_off(wave_size);
                remaining_after_wave = deferred.iter().filter(|f| !retry_ids.contains(&f.match_id)).count();
                debug!(%run_id, deferred = deferred.len(), remaining_after_wave, "working set truncated to wave size");
            }
        }

        let mut controller = match (&progress, options.resume) {
            (Some(progress), true) => ConcurrencyController::restore(self.config.controller.clone(), progress),
            _ => ConcurrencyController::new(self.config.controller.clone()),
        };

        let preferred_model = options.preferred_model.as_deref();
        let mut queue: VecDeque<FixtureMatch> = pending.into();
        let mut failures: Vec<MatchFailure> = Vec::new();
        let mut models_used = BTreeSet::new();
        let mut generated = 0;
        let mut waves = 0;
        let mut status = RunStatus::Completed;
        let mut paused_until = None;

        while !queue.is_empty() {
            if waves > 0 {
                if let Some(until) = self.active_pause(date).await? {
                    info!(%run_id, %date, %until, "pause requested, stopping before next wave");
                    status = RunStatus::Paused;
                    paused_until = Some(until);
                    break;
                }
            }

            let take = controller.concurrency().min(queue.len());
            let wave: Vec<FixtureMatch> = queue.drain(..take).collect();
            let results = join_all(wave.iter().map(|fixture| self.chain.predict(fixture, preferred_model))).await;

            let mut records: Vec<PredictionRecord> = Vec::new();
            let mut wave_failures: Vec<MatchFailure> = Vec::new();
            for (fixture, result) in wave.iter().zip(results) {
                match result {
                    Ok(success) => {
                        controller.observe(AttemptOutcome::success(success.retried));
                        self.metrics.record_prediction(success.tier);
                        models_used.insert(success.record.model.clone());
                        records.push(success.record);
                    }
                    Err(failure) => {
                        controller.observe(AttemptOutcome::failure(failure.rate_limited, failure.retried));
                        self.metrics.record_failure(failure.error.kind);
                        warn!(
                            %run_id,
                            match_id = %fixture.match_id,
                            attempts = failure.attempts,
                            kind = %failure.error.kind,
                            "prediction failed: {}",
                            failure.error.message
                        );
                        wave_failures.push(MatchFailure {
                            match_id: fixture.match_id.clone(),
                            team_home: fixture.team_home.clone(),
                            team_away: fixture.team_away.clone(),
                            kind: failure.error.kind,
                            message: failure.error.message,
                            attempts: failure.attempts,
                        });
                    }
                }
            }

            for record in &records {
                put_json(store, &record.idempotency_key(date), record).await?;
            }
            generated += records.len();
            aggregate.merge(records);
            aggregate.record_failures(&wave_failures);
            put_json(store, &keys::daily_aggregate(date), &aggregate).await?;
            failures.extend(wave_failures);

            waves += 1;
            let adjustment = controller.finish_wave();
            self.metrics.record_wave(controller.concurrency(), controller.delay_ms());

            let remaining = queue.len() + remaining_after_wave;
            let checkpoint = Self::checkpoint(date, run_id, &aggregate, &controller, remaining, failures.len(), waves, remaining == 0);
            put_json(store, &keys::daily_progress(date), &checkpoint).await?;

            match adjustment {
                WaveAdjustment::CircuitBreak { backoff } => {
                    self.metrics.record_circuit_break();
                    if !queue.is_empty() {
                        warn!(%run_id, %date, ?backoff, remaining, "circuit open, backing off");
                        tokio::time::sleep(backoff).await;
                    } else {
                        warn!(%run_id, %date, remaining, "circuit tripped on the last wave");
                    }
                    controller.close_circuit();
                }
                WaveAdjustment::Throttle | WaveAdjustment::Relax => {
                    if !queue.is_empty() {
                        tokio::time::sleep(controller.delay()).await;
                    }
                }
            }
        }

        let remaining = queue.len() + remaining_after_wave;
        let done = remaining == 0 && status == RunStatus::Completed;
        let checkpoint = Self::checkpoint(date, run_id, &aggregate, &controller, remaining, failures.len(), waves, done);
        put_json(store, &keys::daily_progress(date), &checkpoint).await?;
        if waves == 0 && !had_aggregate && options.force {
            // A forced run that produced nothing still replaces what it discarded.
            put_json(store, &keys::daily_aggregate(date), &aggregate).await?;
        }

        info!(
            %run_id,
            %date,
            generated,
            processed = aggregate.processed,
            failures = failures.len(),
            remaining,
            waves,
            "prediction run finished"
        );
        self.metrics.record_run(status);

        Ok(RunResult {
            run_id,
            date,
            status,
            processed: aggregate.processed,
            generated,
            failures,
            models_used: models_used.into_iter().collect(),
            remaining_after_wave: remaining,
            total_matches: aggregate.total_matches,
            featured_count: aggregate.featured_count,
            waves,
            circuit_breaks: controller.circuit_breaks(),
            paused_until,
        })
    }

    async fn active_pause(&self, date: NaiveDate) -> Result<Option<chrono::DateTime<Utc>>> {
        let window: Option<PauseWindow> = get_json(self.store.as_ref(), &keys::pause_until(date)).await?;
        Ok(ConcurrencyController::active_pause(window.as_ref(), Utc::now()))
    }

    /// Featured fixtures when there are any, otherwise a bounded slice of the whole day.
    async fn select_working_set(&self, date: NaiveDate, featured_only: bool) -> Result<WorkingSet> {
        if featured_only {
            let featured = self.fixtures.fetch(date, true).await?;
            if !featured.is_empty() {
                let count = featured.len();
                return Ok(WorkingSet {
                    fixtures: featured,
                    total_matches: count,
                    featured_count: count,
                });
            }
            warn!(%date, limit = self.config.fallback_limit, "no featured fixtures, falling back to global slice");
            let all = self.fixtures.fetch(date, false).await?;
            let total_matches = all.len();
            return Ok(WorkingSet {
                fixtures: all.into_iter().take(self.config.fallback_limit).collect(),
                total_matches,
                featured_count: 0,
            });
        }

        let all = self.fixtures.fetch(date, false).await?;
        let featured_count = all.iter().filter(|f| self.fixtures.is_featured(f)).count();
        let total_matches = all.len();
        Ok(WorkingSet {
            fixtures: all.into_iter().take(self.config.max_matches).collect(),
            total_matches,
            featured_count,
        })
    }

    fn summary(&self, run_id: Uuid, status: RunStatus, aggregate: &DailyAggregate) -> RunResult {
        let mut result = RunResult::empty(run_id, aggregate.date, status);
        result.processed = aggregate.processed;
        result.failures = aggregate.failures.clone();
        result.models_used = aggregate.models.keys().cloned().collect();
        result.total_matches = aggregate.total_matches;
        result.featured_count = aggregate.featured_count;
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn checkpoint(
        date: NaiveDate,
        run_id: Uuid,
        aggregate: &DailyAggregate,
        controller: &ConcurrencyController,
        remaining: usize,
        failures: usize,
        waves: u32,
        done: bool,
    ) -> ProgressState {
        ProgressState {
            date,
            run_id,
            predicted: aggregate.processed,
            remaining,
            failures,
            delay_ms: controller.delay_ms(),
            concurrency: controller.concurrency(),
            consecutive_rate_limited: controller.consecutive_rate_limited(),
            circuit_open: controller.circuit_open(),
            circuit_breaks: controller.circuit_breaks(),
            waves,
            done,
            updated_at: Utc::now(),
        }
    }
}
