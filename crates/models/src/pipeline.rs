use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use crate::error::{MatchcastError, ProviderErrorKind, Result};
use crate::predictions::PredictionRecord;

/// Parses the `YYYY-MM-DD` dates used throughout the trigger surface and key scheme.
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| MatchcastError::InvalidDate(raw.to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchFailure {
    pub match_id: String,
    pub team_home: String,
    pub team_away: String,
    pub kind: ProviderErrorKind,
    pub message: String,
    pub attempts: u32,
}

/// Rollup of all predictions generated for one date.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyAggregate {
    pub date: NaiveDate,
    pub total_matches: usize,
    pub featured_count: usize,
    pub processed: usize,
    pub failures: Vec<MatchFailure>,
    pub models: BTreeMap<String, usize>,
    pub predictions: Vec<PredictionRecord>,
    pub updated_at: DateTime<Utc>,
}

impl DailyAggregate {
    pub fn new(date: NaiveDate, total_matches: usize, featured_count: usize) -> Self {
        Self {
            date,
            total_matches,
            featured_count,
            processed: 0,
            failures: Vec::new(),
            models: BTreeMap::new(),
            predictions: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn contains(&self, match_id: &str) -> bool {
        self.predictions.iter().any(|p| p.match_id == match_id)
    }

    pub fn match_ids(&self) -> HashSet<&str> {
        self.predictions.iter().map(|p| p.match_id.as_str()).collect()
    }

    pub fn prediction_for(&self, match_id: &str) -> Option<&PredictionRecord> {
        self.predictions.iter().find(|p| p.match_id == match_id)
    }

    /// Unions `records` into the aggregate keyed by match id. A new record for an
    /// existing id replaces the old one; nothing is ever dropped. Returns how many
    /// match ids were not present before.
    pub fn merge(&mut self, records: Vec<PredictionRecord>) -> usize {
        let mut added = 0;
        for record in records {
            match self
                .predictions
                .iter_mut()
                .find(|existing| existing.match_id == record.match_id)
            {
                Some(existing) => *existing = record,
                None => {
                    self.predictions.push(record);
                    added += 1;
                }
            }
        }
        self.failures.retain(|f| !self.predictions.iter().any(|p| p.match_id == f.match_id));
        self.recompute();
        added
    }

    /// Replaces failure entries by match id, skipping ids that already have a prediction.
    pub fn record_failures(&mut self, failures: &[MatchFailure]) {
        for failure in failures {
            if self.contains(&failure.match_id) {
                continue;
            }
            self.failures.retain(|f| f.match_id != failure.match_id);
            self.failures.push(failure.clone());
        }
        self.updated_at = Utc::now();
    }

    fn recompute(&mut self) {
        self.processed = self.match_ids().len();
        self.models.clear();
        for record in &self.predictions {
            *self.models.entry(record.model.clone()).or_insert(0) += 1;
        }
        self.updated_at = Utc::now();
    }
}

/// Resumability checkpoint, rewritten after every wave.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressState {
    pub date: NaiveDate,
    pub run_id: Uuid,
    pub predicted: usize,
    pub remaining: usize,
    pub failures: usize,
    pub delay_ms: u64,
    pub concurrency: usize,
    pub consecutive_rate_limited: u32,
    pub circuit_open: bool,
    pub circuit_breaks: u32,
    pub waves: u32,
    pub done: bool,
    pub updated_at: DateTime<Utc>,
}

/// Externally settable stop signal checked before every wave.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PauseWindow {
    pub until: DateTime<Utc>,
    pub reason: Option<String>,
}

impl PauseWindow {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.until
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunOptions {
    pub force: bool,
    pub resume: bool,
    pub wave_size: Option<usize>,
    pub featured_only: bool,
    pub preferred_model: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            resume: false,
            wave_size: None,
            featured_only: true,
            preferred_model: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    AlreadyGenerated,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub run_id: Uuid,
    pub date: NaiveDate,
    pub status: RunStatus,
    /// Distinct match ids in the stored aggregate after this run.
    pub processed: usize,
    /// Predictions generated by this invocation.
    pub generated: usize,
    pub failures: Vec<MatchFailure>,
    pub models_used: Vec<String>,
    pub remaining_after_wave: usize,
    pub total_matches: usize,
    pub featured_count: usize,
    pub waves: u32,
    pub circuit_breaks: u32,
    pub paused_until: Option<DateTime<Utc>>,
}

impl RunResult {
    pub fn empty(run_id: Uuid, date: NaiveDate, status: RunStatus) -> Self {
        Self {
            run_id,
            date,
            status,
            processed: 0,
            generated: 0,
            failures: Vec::new(),
            models_used: Vec::new(),
            remaining_after_wave: 0,
            total_matches: 0,
            featured_count: 0,
            waves: 0,
            circuit_breaks: 0,
            paused_until: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::FixtureMatch;
    use crate::predictions::{PredictionPayload, ProviderTier};

    fn record(match_id: &str, model: &str) -> PredictionRecord {
        let fixture = FixtureMatch::new(match_id, "39", "Premier League", "Home", "Away", Utc::now());
        PredictionRecord::new(&fixture, model, "test", ProviderTier::Primary, 1, PredictionPayload::default())
    }

    fn failure(match_id: &str) -> MatchFailure {
        MatchFailure {
            match_id: match_id.to_string(),
            team_home: "Home".to_string(),
            team_away: "Away".to_string(),
            kind: ProviderErrorKind::RateLimited,
            message: "429".to_string(),
            attempts: 5,
        }
    }

    #[test]
    fn test_parse_date() {
        assert!(parse_date("2024-01-15").is_ok());
        assert!(matches!(parse_date("15/01/2024"), Err(MatchcastError::InvalidDate(_))));
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn test_merge_is_keyed_by_match_id() {
        let date = parse_date("2024-01-15").unwrap();
        let mut aggregate = DailyAggregate::new(date, 10, 2);

        assert_eq!(aggregate.merge(vec![record("1", "model-a"), record("2", "model-a")]), 2);
        assert_eq!(aggregate.merge(vec![record("2", "model-b"), record("3", "model-a")]), 1);

        assert_eq!(aggregate.processed, 3);
        assert_eq!(aggregate.predictions.len(), 3);
        assert_eq!(aggregate.prediction_for("2").map(|p| p.model.as_str()), Some("model-b"));
        assert_eq!(aggregate.models.get("model-a"), Some(&2));
        assert_eq!(aggregate.models.get("model-b"), Some(&1));
    }

    #[test]
    fn test_empty_merge_keeps_aggregate() {
        let date = parse_date("2024-01-15").unwrap();
        let mut aggregate = DailyAggregate::new(date, 10, 2);
        aggregate.merge(vec![record("1", "model-a")]);

        assert_eq!(aggregate.merge(Vec::new()), 0);
        assert_eq!(aggregate.processed, 1);
    }

    #[test]
    fn test_failures_cleared_by_later_success() {
        let date = parse_date("2024-01-15").unwrap();
        let mut aggregate = DailyAggregate::new(date, 10, 2);

        aggregate.record_failures(&[failure("1"), failure("2")]);
        aggregate.record_failures(&[failure("2")]);
        assert_eq!(aggregate.failures.len(), 2);

        aggregate.merge(vec![record("1", "model-a")]);
        assert_eq!(aggregate.failures.len(), 1);
        assert_eq!(aggregate.failures[0].match_id, "2");
    }

    #[test]
    fn test_pause_window() {
        let now = Utc::now();
        let window = PauseWindow {
            until: now + chrono::Duration::minutes(5),
            reason: None,
        };
        assert!(window.is_active(now));
        assert!(!window.is_active(now + chrono::Duration::minutes(6)));
    }
}
