use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use futures::future::join_all;
use matchcast_models::{FixtureMatch, MatchStatus, MatchcastError, Result, Score};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Premier League, La Liga, Serie A, Bundesliga, Ligue 1, Champions League,
/// Europa League, Conference League.
pub const DEFAULT_FEATURED_LEAGUES: [u32; 8] = [39, 140, 135, 78, 61, 2, 3, 848];

/// Upstream fixture/results provider, queried by date and optionally one competition.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FixtureSource: Send + Sync {
    async fn fixtures(&self, date: NaiveDate, league: Option<u32>) -> Result<Vec<FixtureMatch>>;
}

/// Turns the raw source into the two lookups the pipeline needs: the featured
/// set (one lookup per allow-listed competition) and the whole day.
pub struct FixtureAdapter {
    source: Arc<dyn FixtureSource>,
    featured_leagues: Vec<u32>,
}

impl FixtureAdapter {
    pub fn new(source: Arc<dyn FixtureSource>, featured_leagues: Vec<u32>) -> Self {
        Self {
            source,
            featured_leagues,
        }
    }

    pub fn featured_leagues(&self) -> &[u32] {
        &self.featured_leagues
    }

    pub fn is_featured(&self, fixture: &FixtureMatch) -> bool {
        self.featured_leagues
            .iter()
            .any(|id| id.to_string() == fixture.league_id)
    }

    /// Featured mode unions the per-competition lookups and swallows individual
    /// failures. Unfiltered mode is a single lookup whose failure is fatal.
    pub async fn fetch(&self, date: NaiveDate, featured_only: bool) -> Result<Vec<FixtureMatch>> {
        if !featured_only {
            let fixtures = self.source.fixtures(date, None).await.map_err(|e| {
                if matches!(e, MatchcastError::FixtureFetch(_) | MatchcastError::MissingCredentials(_)) {
                    e
                } else {
                    MatchcastError::FixtureFetch(e.to_string())
                }
            })?;
            return Ok(dedup(fixtures));
        }

        let lookups = self
            .featured_leagues
            .iter()
            .map(|league| self.source.fixtures(date, Some(*league)));
        let results = join_all(lookups).await;

        let mut fixtures = Vec::new();
        for (league, result) in self.featured_leagues.iter().zip(results) {
            match result {
                Ok(found) => {
                    debug!(league, count = found.len(), %date, "featured lookup");
                    fixtures.extend(found);
                }
                Err(e) => warn!(league, %date, "featured lookup failed, skipping: {}", e),
            }
        }
        Ok(dedup(fixtures))
    }

    /// Finished matches with final scores, for accuracy scoring.
    pub async fn finished(&self, date: NaiveDate) -> Result<Vec<FixtureMatch>> {
        let fixtures = self.fetch(date, false).await?;
        Ok(fixtures.into_iter().filter(FixtureMatch::is_finished).collect())
    }
}

fn dedup(fixtures: Vec<FixtureMatch>) -> Vec<FixtureMatch> {
    let mut seen = HashSet::new();
    fixtures
        .into_iter()
        .filter(|f| seen.insert(f.match_id.clone()))
        .collect()
}

/// API-Football (v3) fixtures endpoint.
pub struct HttpFixtureSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpFixtureSource {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| MatchcastError::MissingCredentials("fixtures.api_key".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MatchcastError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

/// European seasons roll over in July.
fn season_for(date: NaiveDate) -> i32 {
    if date.month() >= 7 {
        date.year()
    } else {
        date.year() - 1
    }
}

#[async_trait]
impl FixtureSource for HttpFixtureSource {
    async fn fixtures(&self, date: NaiveDate, league: Option<u32>) -> Result<Vec<FixtureMatch>> {
        let mut query = vec![("date".to_string(), date.format("%Y-%m-%d").to_string())];
        if let Some(league) = league {
            query.push(("league".to_string(), league.to_string()));
            query.push(("season".to_string(), season_for(date).to_string()));
        }

        let response = self
            .client
            .get(format!("{}/fixtures", self.base_url))
            .header("x-apisports-key", &self.api_key)
            .query(&query)
            .send()
            .await
            .map_err(|e| MatchcastError::FixtureFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MatchcastError::FixtureFetch(format!(
                "fixtures endpoint returned {status}"
            )));
        }

        let body: ApiFootballResponse = response
            .json()
            .await
            .map_err(|e| MatchcastError::FixtureFetch(format!("invalid fixtures payload: {e}")))?;
        body.into_fixtures()
    }
}

#[derive(Debug, Deserialize)]
struct ApiFootballResponse {
    #[serde(default)]
    errors: serde_json::Value,
    #[serde(default)]
    response: Vec<ApiFixtureItem>,
}

#[derive(Debug, Deserialize)]
struct ApiFixtureItem {
    fixture: ApiFixture,
    league: ApiLeague,
    teams: ApiTeams,
    #[serde(default)]
    goals: ApiGoals,
    #[serde(default)]
    statistics: Vec<ApiTeamStatistics>,
}

#[derive(Debug, Deserialize)]
struct ApiFixture {
    id: u64,
    date: DateTime<Utc>,
    status: ApiStatus,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    short: String,
}

#[derive(Debug, Deserialize)]
struct ApiLeague {
    id: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiTeams {
    home: ApiTeam,
    away: ApiTeam,
}

#[derive(Debug, Deserialize)]
struct ApiTeam {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiGoals {
    home: Option<u8>,
    away: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct ApiTeamStatistics {
    #[serde(default)]
    statistics: Vec<ApiStatistic>,
}

#[derive(Debug, Deserialize)]
struct ApiStatistic {
    #[serde(rename = "type")]
    kind: String,
    value: serde_json::Value,
}

impl ApiFootballResponse {
    fn into_fixtures(self) -> Result<Vec<FixtureMatch>> {
        let has_errors = match &self.errors {
            serde_json::Value::Array(items) => !items.is_empty(),
            serde_json::Value::Object(map) => !map.is_empty(),
            _ => false,
        };
        if has_errors {
            return Err(MatchcastError::FixtureFetch(format!(
                "provider reported errors: {}",
                self.errors
            )));
        }
        Ok(self.response.into_iter().map(ApiFixtureItem::into_fixture).collect())
    }
}

impl ApiFixtureItem {
    fn into_fixture(self) -> FixtureMatch {
        let status = map_status(&self.fixture.status.short);
        let corners = total_corners(&self.statistics);
        let mut fixture = FixtureMatch::new(
            self.fixture.id.to_string(),
            self.league.id.to_string(),
            self.league.name,
            self.teams.home.name,
            self.teams.away.name,
            self.fixture.date,
        )
        .with_status(status);
        if let (Some(home), Some(away)) = (self.goals.home, self.goals.away) {
            fixture = fixture.with_score(Score::new(home, away));
        }
        if let Some(corners) = corners {
            fixture = fixture.with_corners(corners);
        }
        fixture
    }
}

fn map_status(short: &str) -> MatchStatus {
    match short {
        "1H" | "2H" | "ET" | "BT" | "P" | "LIVE" | "INT" => MatchStatus::Live,
        "HT" => MatchStatus::HalfTime,
        "FT" | "AET" | "PEN" => MatchStatus::Finished,
        "PST" | "SUSP" => MatchStatus::Postponed,
        "CANC" | "ABD" | "AWD" | "WO" => MatchStatus::Cancelled,
        _ => MatchStatus::Scheduled,
    }
}

/// Sums "Corner Kicks" over both teams; `None` unless both teams report it.
fn total_corners(statistics: &[ApiTeamStatistics]) -> Option<u32> {
    if statistics.len() != 2 {
        return None;
    }
    statistics
        .iter()
        .map(|team| {
            team.statistics
                .iter()
                .find(|s| s.kind == "Corner Kicks")
                .and_then(|s| s.value.as_u64())
                .and_then(|v| u32::try_from(v).ok())
        })
        .sum()
}
