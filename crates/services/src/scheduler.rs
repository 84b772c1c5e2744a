use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use matchcast_models::{RunOptions, RunResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};

use crate::accuracy::AccuracyEngine;
use crate::orchestrator::BatchOrchestrator;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub prediction_interval: Duration,
    /// UTC hour after which the previous day is scored.
    pub scoring_hour: u32,
    pub wave_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            prediction_interval: Duration::from_secs(15 * 60),
            scoring_hour: 6,
            wave_size: Some(8),
        }
    }
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub prediction: Option<RunResult>,
    pub scored_date: Option<NaiveDate>,
    pub errors: Vec<String>,
}

/// In-process stand-in for an external cron: resumable prediction runs on an
/// interval and one scoring pass per day.
pub struct Scheduler {
    orchestrator: Arc<BatchOrchestrator>,
    accuracy: Arc<AccuracyEngine>,
    config: SchedulerConfig,
    last_scored: Mutex<Option<NaiveDate>>,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<BatchOrchestrator>, accuracy: Arc<AccuracyEngine>, config: SchedulerConfig) -> Self {
        Self {
            orchestrator,
            accuracy,
            config,
            last_scored: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        tracing::info!("⏰ Starting scheduler");
        tracing::info!("⚙️  Prediction interval: {:?}", self.config.prediction_interval);
        tracing::info!("📊 Scoring hour (UTC): {}", self.config.scoring_hour);

        let mut ticker = interval(self.config.prediction_interval);
        loop {
            ticker.tick().await;
            let report = self.tick(Utc::now()).await;
            if !report.errors.is_empty() {
                tracing::warn!("⚠️  Scheduled cycle finished with {} error(s)", report.errors.len());
            }
        }
    }

    /// Runs today's predictions and, once per day, scores the previous day.
    /// The two steps are independent; a failure in one is logged and reported
    /// without skipping the other.
    pub async fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let today = now.date_naive();
        let mut report = TickReport::default();

        match self.run_predictions(today).await {
            Ok(result) => report.prediction = Some(result),
            Err(e) => {
                tracing::error!("❌ Scheduled prediction run failed: {:#}", e);
                report.errors.push(format!("{e:#}"));
            }
        }

        if now.hour() >= self.config.scoring_hour {
            match self.score_once(today).await {
                Ok(scored) => report.scored_date = scored,
                Err(e) => {
                    tracing::error!("❌ Scheduled scoring failed: {:#}", e);
                    report.errors.push(format!("{e:#}"));
                }
            }
        }

        report
    }

    async fn run_predictions(&self, today: NaiveDate) -> Result<RunResult> {
        let options = RunOptions {
            resume: true,
            wave_size: self.config.wave_size,
            ..Default::default()
        };
        let result = self
            .orchestrator
            .run_for_date(today, options)
            .await
            .with_context(|| format!("prediction run for {today}"))?;
        tracing::info!(
            run_id = %result.run_id,
            date = %today,
            processed = result.processed,
            remaining = result.remaining_after_wave,
            "scheduled prediction run finished"
        );
        Ok(result)
    }

    /// Scores the day before `today` unless that already happened today.
    async fn score_once(&self, today: NaiveDate) -> Result<Option<NaiveDate>> {
        let mut last = self.last_scored.lock().await;
        if *last == Some(today) {
            return Ok(None);
        }
        let aggregate = self
            .accuracy
            .score_previous_day(today)
            .await
            .with_context(|| format!("scoring the day before {today}"))?;
        tracing::info!(date = %aggregate.date, processed = aggregate.processed, "scheduled scoring finished");
        *last = Some(today);
        Ok(Some(aggregate.date))
    }
}
