// Shared fakes and wiring for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use matchcast_db::{MemoryStore, StateStore};
use matchcast_models::{
    FixtureMatch, MatchStatus, MatchcastError, OutcomeProbabilities, PredictedOutcome, PredictionPayload,
    ProviderError, ProviderErrorKind, Result, Score,
};
use matchcast_services::{
    AccuracyEngine, BatchOrchestrator, ControllerConfig, FixtureAdapter, FixtureSource, HealthService,
    Maintenance, PipelineConfig, PipelineMetrics, PredictionProvider, ProviderChain, RetryPolicy, TierSpec,
};

pub const FEATURED_LEAGUE: u32 = 39;
pub const OTHER_LEAGUE: u32 = 999;

pub fn day(raw: &str) -> NaiveDate {
    matchcast_models::parse_date(raw).unwrap()
}

pub fn fixture(match_id: &str, league: u32, home: &str, away: &str) -> FixtureMatch {
    let kickoff = Utc.with_ymd_and_hms(2024, 1, 15, 15, 0, 0).unwrap();
    FixtureMatch::new(match_id, league.to_string(), format!("League {league}"), home, away, kickoff)
}

pub fn finished(match_id: &str, league: u32, home: u8, away: u8) -> FixtureMatch {
    fixture(match_id, league, "Home", "Away")
        .with_status(MatchStatus::Finished)
        .with_score(Score::new(home, away))
}

/// Serves a fixed list of fixtures, filtered by league on request.
#[derive(Default)]
pub struct FakeFixtureSource {
    fixtures: Mutex<Vec<FixtureMatch>>,
    failing_leagues: Mutex<HashSet<u32>>,
    fail_global: Mutex<bool>,
    failing_dates: Mutex<HashSet<NaiveDate>>,
    calls: AtomicUsize,
}

impl FakeFixtureSource {
    pub fn new(fixtures: Vec<FixtureMatch>) -> Arc<Self> {
        Arc::new(Self {
            fixtures: Mutex::new(fixtures),
            ..Default::default()
        })
    }

    pub fn set_fixtures(&self, fixtures: Vec<FixtureMatch>) {
        *self.fixtures.lock().unwrap() = fixtures;
    }

    pub fn fail_league(&self, league: u32) {
        self.failing_leagues.lock().unwrap().insert(league);
    }

    pub fn fail_global(&self) {
        *self.fail_global.lock().unwrap() = true;
    }

    /// Every lookup for `date` fails, featured or not.
    pub fn fail_date(&self, date: NaiveDate) {
        self.failing_dates.lock().unwrap().insert(date);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FixtureSource for FakeFixtureSource {
    async fn fixtures(&self, date: NaiveDate, league: Option<u32>) -> Result<Vec<FixtureMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_dates.lock().unwrap().contains(&date) {
            return Err(MatchcastError::FixtureFetch(format!("no fixtures for {date}")));
        }
        match league {
            Some(id) => {
                if self.failing_leagues.lock().unwrap().contains(&id) {
                    return Err(MatchcastError::FixtureFetch(format!("league {id} unavailable")));
                }
                let wanted = id.to_string();
                Ok(self
                    .fixtures
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|f| f.league_id == wanted)
                    .cloned()
                    .collect())
            }
            None => {
                if *self.fail_global.lock().unwrap() {
                    return Err(MatchcastError::FixtureFetch("upstream returned 500".to_string()));
                }
                Ok(self.fixtures.lock().unwrap().clone())
            }
        }
    }
}

/// Succeeds with a home-win prediction unless a match has scripted errors queued,
/// or is marked as always failing with a given kind.
pub struct ScriptedProvider {
    name: String,
    scripts: Mutex<HashMap<String, VecDeque<ProviderErrorKind>>>,
    always_fail: Mutex<HashMap<String, ProviderErrorKind>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            scripts: Mutex::new(HashMap::new()),
            always_fail: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn script(&self, match_id: &str, errors: &[ProviderErrorKind]) {
        self.scripts
            .lock()
            .unwrap()
            .insert(match_id.to_string(), errors.iter().copied().collect());
    }

    pub fn always_fail(&self, match_id: &str, kind: ProviderErrorKind) {
        self.always_fail.lock().unwrap().insert(match_id.to_string(), kind);
    }

    pub fn heal(&self, match_id: &str) {
        self.always_fail.lock().unwrap().remove(match_id);
    }

    /// Match ids in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PredictionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(
        &self,
        _model: &str,
        fixture: &FixtureMatch,
    ) -> std::result::Result<PredictionPayload, ProviderError> {
        self.calls.lock().unwrap().push(fixture.match_id.clone());

        let always = self.always_fail.lock().unwrap().get(&fixture.match_id).copied();
        if let Some(kind) = always {
            return Err(ProviderError::new(kind, &self.name, "scripted failure"));
        }
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&fixture.match_id)
            .and_then(VecDeque::pop_front);
        if let Some(kind) = scripted {
            return Err(ProviderError::new(kind, &self.name, "scripted failure"));
        }

        Ok(home_win_payload())
    }
}

pub fn home_win_payload() -> PredictionPayload {
    PredictionPayload {
        outcome: Some(PredictedOutcome::HomeWin),
        probabilities: Some(OutcomeProbabilities::new(0.55, 0.25, 0.20)),
        exact_score: Some("2-1".to_string()),
        btts: Some(true),
        ..Default::default()
    }
}

pub fn fast_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        fallback_limit: 3,
        max_matches: 10,
        controller: ControllerConfig {
            base_delay: Duration::ZERO,
            max_delay: Duration::from_millis(5),
            break_backoff: Duration::from_millis(1),
            ..Default::default()
        },
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::ZERO,
        max_jitter: Duration::ZERO,
    }
}

/// The services wired against in-memory fakes.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub source: Arc<FakeFixtureSource>,
    pub provider: Arc<ScriptedProvider>,
    pub metrics: Arc<PipelineMetrics>,
    pub orchestrator: Arc<BatchOrchestrator>,
    pub accuracy: Arc<AccuracyEngine>,
    pub health: Arc<HealthService>,
    pub maintenance: Arc<Maintenance>,
}

impl Harness {
    pub fn new(fixtures: Vec<FixtureMatch>) -> Self {
        Self::with_retry(fixtures, fast_retry(2))
    }

    pub fn with_retry(fixtures: Vec<FixtureMatch>, retry: RetryPolicy) -> Self {
        Self::with_config(fixtures, retry, fast_pipeline_config())
    }

    pub fn with_config(fixtures: Vec<FixtureMatch>, retry: RetryPolicy, config: PipelineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn StateStore> = store.clone();
        let source = FakeFixtureSource::new(fixtures);
        let provider = ScriptedProvider::new("primary");
        let metrics = Arc::new(PipelineMetrics::new().unwrap());

        let adapter = Arc::new(FixtureAdapter::new(source.clone(), vec![FEATURED_LEAGUE, 140]));
        let chain = ProviderChain::new(TierSpec {
            provider: provider.clone(),
            model: "model-a".to_string(),
        })
        .with_retry_policy(retry);

        let orchestrator = Arc::new(BatchOrchestrator::new(
            dyn_store.clone(),
            adapter.clone(),
            Arc::new(chain),
            metrics.clone(),
            config.clone(),
        ));
        let accuracy = Arc::new(AccuracyEngine::new(dyn_store.clone(), adapter, metrics.clone()));
        let health = Arc::new(HealthService::new(dyn_store.clone(), config.controller));
        let maintenance = Arc::new(Maintenance::new(dyn_store));

        Self {
            store,
            source,
            provider,
            metrics,
            orchestrator,
            accuracy,
            health,
            maintenance,
        }
    }
}
