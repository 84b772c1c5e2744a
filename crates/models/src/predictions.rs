use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::fixtures::FixtureMatch;
use crate::keys;

/// Goal line used when a prediction names a side but no line.
pub const DEFAULT_GOAL_LINE: f64 = 2.5;

/// Fixed market line for the corners criterion.
pub const CORNERS_LINE: f64 = 9.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PredictedOutcome {
    HomeWin,
    Draw,
    AwayWin,
}

impl PredictedOutcome {
    /// Accepts the labels model providers tend to emit ("Home Win", "draw", "X", "2", ...).
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect();
        match normalized.as_str() {
            "homewin" | "home" | "1" | "h" => Some(Self::HomeWin),
            "draw" | "x" | "d" | "tie" => Some(Self::Draw),
            "awaywin" | "away" | "2" | "a" => Some(Self::AwayWin),
            _ => None,
        }
    }

    pub fn from_score(home: u8, away: u8) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => Self::HomeWin,
            std::cmp::Ordering::Equal => Self::Draw,
            std::cmp::Ordering::Less => Self::AwayWin,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OverUnder {
    Over,
    Under,
}

impl OverUnder {
    pub fn from_label(label: &str) -> Option<Self> {
        let lower = label.trim().to_ascii_lowercase();
        if lower.starts_with("over") || lower == "o" {
            Some(Self::Over)
        } else if lower.starts_with("under") || lower == "u" {
            Some(Self::Under)
        } else {
            None
        }
    }

    pub fn for_total(total: f64, line: f64) -> Self {
        if total > line {
            Self::Over
        } else {
            Self::Under
        }
    }
}

/// Home/draw/away probabilities. Providers send fractions or percentages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OutcomeProbabilities {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl OutcomeProbabilities {
    pub fn new(home: f64, draw: f64, away: f64) -> Self {
        Self { home, draw, away }
    }

    /// Rescales to fractions summing to one. `None` for negative, non-finite or all-zero input.
    pub fn normalized(&self) -> Option<Self> {
        let values = [self.home, self.draw, self.away];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return None;
        }
        let sum: f64 = values.iter().sum();
        if sum <= 0.0 {
            return None;
        }
        Some(Self {
            home: self.home / sum,
            draw: self.draw / sum,
            away: self.away / sum,
        })
    }

    pub fn probability_of(&self, outcome: PredictedOutcome) -> f64 {
        match outcome {
            PredictedOutcome::HomeWin => self.home,
            PredictedOutcome::Draw => self.draw,
            PredictedOutcome::AwayWin => self.away,
        }
    }

    pub fn most_likely_outcome(&self) -> PredictedOutcome {
        if self.home >= self.away && self.home >= self.draw {
            PredictedOutcome::HomeWin
        } else if self.away >= self.draw {
            PredictedOutcome::AwayWin
        } else {
            PredictedOutcome::Draw
        }
    }

    /// Highest probability and its margin over the runner-up.
    pub fn top_and_margin(&self) -> (f64, f64) {
        let mut sorted = [self.home, self.draw, self.away];
        sorted.sort_by(|a, b| b.total_cmp(a));
        (sorted[0], sorted[0] - sorted[1])
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GoalLinePick {
    pub side: OverUnder,
    pub line: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OverUnderProbabilities {
    pub over: f64,
    pub under: f64,
    pub line: Option<f64>,
}

/// Probability that each side keeps a clean sheet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CleanSheetProbabilities {
    pub home: f64,
    pub away: f64,
}

/// What a provider predicted. Every field is optional; each accuracy criterion
/// decides for itself whether the fields it needs are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PredictionPayload {
    pub outcome: Option<PredictedOutcome>,
    pub probabilities: Option<OutcomeProbabilities>,
    pub exact_score: Option<String>,
    pub btts: Option<bool>,
    pub goal_line: Option<GoalLinePick>,
    pub over_under: Option<OverUnderProbabilities>,
    pub clean_sheet: Option<CleanSheetProbabilities>,
    pub corners: Option<OverUnder>,
    pub expected_corners: Option<f64>,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
}

impl PredictionPayload {
    /// Explicit outcome label first, otherwise the most likely class from the probabilities.
    pub fn predicted_outcome(&self) -> Option<PredictedOutcome> {
        self.outcome.or_else(|| {
            self.probabilities
                .and_then(|p| p.normalized())
                .map(|p| p.most_likely_outcome())
        })
    }

    /// Parses "2-1", "2:1" or "2 - 1".
    pub fn scoreline(&self) -> Option<(u8, u8)> {
        let raw = self.exact_score.as_deref()?;
        let (home, away) = raw.split_once(['-', ':'])?;
        Some((home.trim().parse().ok()?, away.trim().parse().ok()?))
    }

    /// Over/under pick on the goal line: literal label wins, else the likelier side of the
    /// probability pair. Equal probabilities give no pick.
    pub fn goal_line_pick(&self) -> Option<GoalLinePick> {
        if let Some(pick) = self.goal_line {
            return Some(pick);
        }
        let probs = self.over_under?;
        let line = probs.line.unwrap_or(DEFAULT_GOAL_LINE);
        if probs.over > probs.under {
            Some(GoalLinePick { side: OverUnder::Over, line })
        } else if probs.under > probs.over {
            Some(GoalLinePick { side: OverUnder::Under, line })
        } else {
            None
        }
    }

    /// Predicted clean sheets as (home keeps one, away keeps one).
    pub fn clean_sheet_pick(&self) -> Option<(bool, bool)> {
        if let Some((home, away)) = self.scoreline() {
            return Some((away == 0, home == 0));
        }
        self.clean_sheet.map(|cs| (normalize_percent(cs.home) > 0.5, normalize_percent(cs.away) > 0.5))
    }

    pub fn corners_pick(&self) -> Option<OverUnder> {
        self.corners
            .or_else(|| self.expected_corners.map(|c| OverUnder::for_total(c, CORNERS_LINE)))
    }
}

fn normalize_percent(value: f64) -> f64 {
    if value > 1.0 {
        value / 100.0
    } else {
        value
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTier {
    Primary,
    SameFamilyAlternate,
    CrossProvider,
}

/// One generated prediction for one match by one model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionRecord {
    pub match_id: String,
    pub league_id: String,
    pub league_name: String,
    pub team_home: String,
    pub team_away: String,
    pub kickoff: DateTime<Utc>,
    pub model: String,
    pub provider: String,
    pub tier: ProviderTier,
    pub attempts: u32,
    pub generated_at: DateTime<Utc>,
    pub prediction: PredictionPayload,
}

impl PredictionRecord {
    pub fn new(
        fixture: &FixtureMatch,
        model: impl Into<String>,
        provider: impl Into<String>,
        tier: ProviderTier,
        attempts: u32,
        prediction: PredictionPayload,
    ) -> Self {
        Self {
            match_id: fixture.match_id.clone(),
            league_id: fixture.league_id.clone(),
            league_name: fixture.league_name.clone(),
            team_home: fixture.team_home.clone(),
            team_away: fixture.team_away.clone(),
            kickoff: fixture.kickoff,
            model: model.into(),
            provider: provider.into(),
            tier,
            attempts,
            generated_at: Utc::now(),
            prediction,
        }
    }

    pub fn idempotency_key(&self, date: NaiveDate) -> String {
        keys::prediction(&self.match_id, &self.model, date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(PredictedOutcome::from_label("Home Win"), Some(PredictedOutcome::HomeWin));
        assert_eq!(PredictedOutcome::from_label("away_win"), Some(PredictedOutcome::AwayWin));
        assert_eq!(PredictedOutcome::from_label("X"), Some(PredictedOutcome::Draw));
        assert_eq!(PredictedOutcome::from_label("maybe"), None);
        assert_eq!(PredictedOutcome::from_score(3, 1), PredictedOutcome::HomeWin);
        assert_eq!(PredictedOutcome::from_score(0, 0), PredictedOutcome::Draw);
    }

    #[test]
    fn test_percentages_are_normalized() {
        let probs = OutcomeProbabilities::new(50.0, 30.0, 20.0).normalized().unwrap();
        assert!((probs.home - 0.5).abs() < 1e-9);
        assert!((probs.home + probs.draw + probs.away - 1.0).abs() < 1e-9);

        let (top, margin) = probs.top_and_margin();
        assert!((top - 0.5).abs() < 1e-9);
        assert!((margin - 0.2).abs() < 1e-9);

        assert!(OutcomeProbabilities::new(0.0, 0.0, 0.0).normalized().is_none());
        assert!(OutcomeProbabilities::new(-0.1, 0.6, 0.5).normalized().is_none());
    }

    #[test]
    fn test_outcome_falls_back_to_probabilities() {
        let payload = PredictionPayload {
            probabilities: Some(OutcomeProbabilities::new(0.2, 0.3, 0.5)),
            ..Default::default()
        };
        assert_eq!(payload.predicted_outcome(), Some(PredictedOutcome::AwayWin));
        assert_eq!(PredictionPayload::default().predicted_outcome(), None);
    }

    #[test]
    fn test_scoreline_parsing() {
        let mut payload = PredictionPayload {
            exact_score: Some("2 - 1".to_string()),
            ..Default::default()
        };
        assert_eq!(payload.scoreline(), Some((2, 1)));
        assert_eq!(payload.clean_sheet_pick(), Some((false, false)));

        payload.exact_score = Some("1:0".to_string());
        assert_eq!(payload.clean_sheet_pick(), Some((true, false)));

        payload.exact_score = Some("two-one".to_string());
        assert_eq!(payload.scoreline(), None);
    }

    #[test]
    fn test_goal_line_prefers_label() {
        let payload = PredictionPayload {
            goal_line: Some(GoalLinePick { side: OverUnder::Under, line: 3.5 }),
            over_under: Some(OverUnderProbabilities { over: 0.7, under: 0.3, line: None }),
            ..Default::default()
        };
        assert_eq!(payload.goal_line_pick().map(|p| p.side), Some(OverUnder::Under));

        let payload = PredictionPayload {
            over_under: Some(OverUnderProbabilities { over: 62.0, under: 38.0, line: None }),
            ..Default::default()
        };
        let pick = payload.goal_line_pick().unwrap();
        assert_eq!(pick.side, OverUnder::Over);
        assert!((pick.line - DEFAULT_GOAL_LINE).abs() < f64::EPSILON);
    }

    #[test]
    fn test_corners_pick() {
        let payload = PredictionPayload {
            expected_corners: Some(11.0),
            ..Default::default()
        };
        assert_eq!(payload.corners_pick(), Some(OverUnder::Over));
        assert_eq!(OverUnder::from_label("Under 9.5"), Some(OverUnder::Under));
    }

    proptest::proptest! {
        #[test]
        fn prop_normalized_sums_to_one(home in 0.0f64..100.0, draw in 0.0f64..100.0, away in 0.01f64..100.0) {
            let probs = OutcomeProbabilities::new(home, draw, away).normalized().unwrap();
            proptest::prop_assert!((probs.home + probs.draw + probs.away - 1.0).abs() < 1e-9);
            let (top, margin) = probs.top_and_margin();
            proptest::prop_assert!((0.0..=1.0).contains(&top));
            proptest::prop_assert!(margin >= 0.0);
        }
    }
}
