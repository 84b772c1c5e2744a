use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One real-world match as returned by the fixture provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureMatch {
    pub match_id: String,
    pub league_id: String,
    pub league_name: String,
    pub team_home: String,
    pub team_away: String,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    pub score: Option<Score>,
    /// Total corners for both sides, when the provider reports them.
    pub corners: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MatchStatus {
    Scheduled,
    Live,
    HalfTime,
    Finished,
    Postponed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Score {
    pub home: u8,
    pub away: u8,
}

impl Score {
    pub fn new(home: u8, away: u8) -> Self {
        Self { home, away }
    }

    pub fn total(&self) -> u32 {
        u32::from(self.home) + u32::from(self.away)
    }

    pub fn scoreline(&self) -> String {
        format!("{}-{}", self.home, self.away)
    }
}

impl FixtureMatch {
    pub fn new(
        match_id: impl Into<String>,
        league_id: impl Into<String>,
        league_name: impl Into<String>,
        team_home: impl Into<String>,
        team_away: impl Into<String>,
        kickoff: DateTime<Utc>,
    ) -> Self {
        Self {
            match_id: match_id.into(),
            league_id: league_id.into(),
            league_name: league_name.into(),
            team_home: team_home.into(),
            team_away: team_away.into(),
            kickoff,
            status: MatchStatus::Scheduled,
            score: None,
            corners: None,
        }
    }

    pub fn with_score(mut self, score: Score) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_status(mut self, status: MatchStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_corners(mut self, corners: u32) -> Self {
        self.corners = Some(corners);
        self
    }

    pub fn is_live(&self) -> bool {
        matches!(self.status, MatchStatus::Live | MatchStatus::HalfTime)
    }

    /// Finished and carrying a final score, i.e. usable for scoring.
    pub fn is_finished(&self) -> bool {
        matches!(self.status, MatchStatus::Finished) && self.score.is_some()
    }

    pub fn title(&self) -> String {
        format!("{} vs {}", self.team_home, self.team_away)
    }
}
