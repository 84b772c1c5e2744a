use chrono::{Duration, NaiveDate};
use matchcast_db::{get_json, put_json, StateStore};
use matchcast_models::{
    keys, AccuracyAggregate, AccuracyRecord, BackfillEntry, BackfillReport, BackfillStatus, DailyAggregate,
    MatchcastError, PredictionRecord, Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::fixtures::FixtureAdapter;
use crate::metrics::PipelineMetrics;
use crate::scoring;

/// Upper bound on a single backfill request.
pub const MAX_BACKFILL_DAYS: i64 = 62;

pub struct AccuracyEngine {
    store: Arc<dyn StateStore>,
    fixtures: Arc<FixtureAdapter>,
    metrics: Arc<PipelineMetrics>,
}

impl AccuracyEngine {
    pub fn new(store: Arc<dyn StateStore>, fixtures: Arc<FixtureAdapter>, metrics: Arc<PipelineMetrics>) -> Self {
        Self { store, fixtures, metrics }
    }

    /// Scores every finished fixture of `date` that has a stored prediction and
    /// rewrites the day's aggregate wholesale.
    pub async fn score_date(&self, date: NaiveDate) -> Result<AccuracyAggregate> {
        let predictions = self.predictions_for(date).await?;
        let finished = self.fixtures.finished(date).await?;

        let mut records: Vec<AccuracyRecord> = Vec::new();
        for fixture in &finished {
            let Some(prediction) = predictions.get(&fixture.match_id) else {
                debug!(%date, match_id = %fixture.match_id, "no stored prediction, skipping");
                continue;
            };
            if let Some(record) = scoring::score_fixture(fixture, prediction) {
                put_json(self.store.as_ref(), &keys::accuracy_fixture(date, &record.match_id), &record).await?;
                records.push(record);
            }
        }

        let aggregate = scoring::aggregate(date, &records);
        put_json(self.store.as_ref(), &keys::accuracy_aggregate(date), &aggregate).await?;
        self.metrics.record_scored(records.len());

        info!(
            %date,
            finished = finished.len(),
            predicted = predictions.len(),
            processed = aggregate.processed,
            overall = ?aggregate.summary.overall_accuracy,
            "accuracy scored"
        );
        Ok(aggregate)
    }

    pub async fn score_previous_day(&self, today: NaiveDate) -> Result<AccuracyAggregate> {
        self.score_date(today - Duration::days(1)).await
    }

    pub async fn stored(&self, date: NaiveDate) -> Result<Option<AccuracyAggregate>> {
        get_json(self.store.as_ref(), &keys::accuracy_aggregate(date)).await
    }

    /// Scores each date in turn. Dates already scored are skipped unless `force`;
    /// a failing date is reported and does not stop the others.
    pub async fn backfill(&self, dates: &[NaiveDate], force: bool) -> BackfillReport {
        let mut report = BackfillReport::default();
        for &date in dates {
            let entry = match self.backfill_one(date, force).await {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(%date, error = %e, "backfill failed for date");
                    BackfillEntry {
                        date,
                        status: BackfillStatus::Failed,
                        processed: 0,
                        message: Some(e.to_string()),
                    }
                }
            };
            report.entries.push(entry);
        }
        info!(
            dates = dates.len(),
            scored = report.count(BackfillStatus::Scored),
            skipped = report.count(BackfillStatus::Skipped),
            failed = report.count(BackfillStatus::Failed),
            "backfill finished"
        );
        report
    }

    async fn backfill_one(&self, date: NaiveDate, force: bool) -> Result<BackfillEntry> {
        if !force {
            if let Some(existing) = self.stored(date).await? {
                return Ok(BackfillEntry {
                    date,
                    status: BackfillStatus::Skipped,
                    processed: existing.processed,
                    message: Some("already scored".to_string()),
                });
            }
        }
        let aggregate = self.score_date(date).await?;
        Ok(BackfillEntry {
            date,
            status: BackfillStatus::Scored,
            processed: aggregate.processed,
            message: None,
        })
    }

    /// Stored predictions for `date` keyed by match id. The daily aggregate is
    /// authoritative; individual records fill in when it is missing.
    async fn predictions_for(&self, date: NaiveDate) -> Result<HashMap<String, PredictionRecord>> {
        let store = self.store.as_ref();
        if let Some(aggregate) = get_json::<DailyAggregate>(store, &keys::daily_aggregate(date)).await? {
            if !aggregate.predictions.is_empty() {
                return Ok(aggregate
                    .predictions
                    .into_iter()
                    .map(|p| (p.match_id.clone(), p))
                    .collect());
            }
        }

        let mut by_match: HashMap<String, PredictionRecord> = HashMap::new();
        for key in store.list(keys::PREDICTION_PREFIX).await? {
            if !keys::is_prediction_for_date(&key, date) {
                continue;
            }
            let Some(record) = get_json::<PredictionRecord>(store, &key).await? else {
                continue;
            };
            match by_match.get(&record.match_id) {
                Some(existing) if existing.generated_at >= record.generated_at => {}
                _ => {
                    by_match.insert(record.match_id.clone(), record);
                }
            }
        }
        Ok(by_match)
    }
}

/// Inclusive list of dates from `start` to `end`.
pub fn date_range(start: NaiveDate, end: NaiveDate, max_days: i64) -> Result<Vec<NaiveDate>> {
    if end < start {
        return Err(MatchcastError::InvalidRange(format!("{end} is before {start}")));
    }
    let days = (end - start).num_days() + 1;
    if days > max_days {
        return Err(MatchcastError::InvalidRange(format!(
            "{days} days requested, at most {max_days} allowed"
        )));
    }
    Ok(start.iter_days().take_while(|d| *d <= end).collect())
}
