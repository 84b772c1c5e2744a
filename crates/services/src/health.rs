use chrono::{DateTime, NaiveDate, Utc};
use matchcast_db::{get_json, StateStore};
use matchcast_models::{keys, DailyAggregate, MatchFailure, PauseWindow, ProgressState, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::controller::ControllerConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum HealthHint {
    NotStarted,
    ResumeRecommended,
    RateLimitPressure,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateSummary {
    pub processed: usize,
    pub total_matches: usize,
    pub featured_count: usize,
    pub failures: Vec<MatchFailure>,
    pub models: BTreeMap<String, usize>,
    pub updated_at: DateTime<Utc>,
}

impl From<&DailyAggregate> for AggregateSummary {
    fn from(aggregate: &DailyAggregate) -> Self {
        Self {
            processed: aggregate.processed,
            total_matches: aggregate.total_matches,
            featured_count: aggregate.featured_count,
            failures: aggregate.failures.clone(),
            models: aggregate.models.clone(),
            updated_at: aggregate.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthReport {
    pub date: NaiveDate,
    pub progress: Option<ProgressState>,
    pub aggregate: Option<AggregateSummary>,
    pub pause: Option<PauseWindow>,
    pub hints: Vec<HealthHint>,
}

pub struct HealthService {
    store: Arc<dyn StateStore>,
    controller: ControllerConfig,
}

impl HealthService {
    pub fn new(store: Arc<dyn StateStore>, controller: ControllerConfig) -> Self {
        Self { store, controller }
    }

    pub async fn report(&self, date: NaiveDate) -> Result<HealthReport> {
        let store = self.store.as_ref();
        let progress: Option<ProgressState> = get_json(store, &keys::daily_progress(date)).await?;
        let aggregate: Option<DailyAggregate> = get_json(store, &keys::daily_aggregate(date)).await?;
        let pause: Option<PauseWindow> = get_json(store, &keys::pause_until(date)).await?;

        let hints = derive_hints(
            progress.as_ref(),
            aggregate.as_ref(),
            pause.as_ref(),
            &self.controller,
            Utc::now(),
        );
        Ok(HealthReport {
            date,
            progress,
            aggregate: aggregate.as_ref().map(AggregateSummary::from),
            pause,
            hints,
        })
    }
}

pub fn derive_hints(
    progress: Option<&ProgressState>,
    aggregate: Option<&DailyAggregate>,
    pause: Option<&PauseWindow>,
    controller: &ControllerConfig,
    now: DateTime<Utc>,
) -> Vec<HealthHint> {
    let mut hints = Vec::new();

    if progress.is_none() && aggregate.is_none() {
        hints.push(HealthHint::NotStarted);
    }

    let unfinished = progress.is_some_and(|p| !p.done);
    let has_failures = aggregate.is_some_and(|a| !a.failures.is_empty());
    if unfinished || has_failures {
        hints.push(HealthHint::ResumeRecommended);
    }

    if let Some(p) = progress {
        let pressure_delay = controller.base_delay.as_millis().saturating_mul(4);
        if p.consecutive_rate_limited > 0 || p.circuit_open || u128::from(p.delay_ms) > pressure_delay {
            hints.push(HealthHint::RateLimitPressure);
        }
    }

    if pause.is_some_and(|w| w.is_active(now)) {
        hints.push(HealthHint::Paused);
    }

    hints
}
