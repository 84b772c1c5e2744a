use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::fixtures::Score;

/// Per-criterion correctness. `None` means the prediction lacked the field the
/// criterion needs, which is never counted as incorrect.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CriterionFlags {
    pub outcome: Option<bool>,
    pub exact_score: Option<bool>,
    pub btts: Option<bool>,
    pub goal_line: Option<bool>,
    pub clean_sheet: Option<bool>,
    pub corners: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Calibration {
    pub brier: f64,
    pub log_loss: f64,
    pub actual_probability: f64,
    pub top_probability: f64,
    pub margin: f64,
}

/// Scoring of one finished match against its stored prediction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccuracyRecord {
    pub match_id: String,
    pub league_id: String,
    pub league_name: String,
    pub team_home: String,
    pub team_away: String,
    pub model: String,
    pub final_score: Score,
    pub total_corners: Option<u32>,
    pub criteria: CriterionFlags,
    /// `None` when none of the weighted criteria applied.
    pub weighted_accuracy: Option<f64>,
    pub calibration: Option<Calibration>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CriterionStats {
    pub correct: usize,
    pub applicable: usize,
    pub percentage: Option<f64>,
}

impl CriterionStats {
    pub fn record(&mut self, flag: Option<bool>) {
        if let Some(correct) = flag {
            self.applicable += 1;
            if correct {
                self.correct += 1;
            }
        }
        self.percentage = percentage(self.correct, self.applicable);
    }
}

/// `100 * correct / applicable`, undefined when nothing applied.
pub fn percentage(correct: usize, applicable: usize) -> Option<f64> {
    (applicable > 0).then(|| 100.0 * correct as f64 / applicable as f64)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CriteriaSummary {
    pub outcome: CriterionStats,
    pub exact_score: CriterionStats,
    pub btts: CriterionStats,
    pub goal_line: CriterionStats,
    pub clean_sheet: CriterionStats,
    pub corners: CriterionStats,
    /// Mean weighted accuracy over records that had at least one weighted criterion.
    pub overall_accuracy: Option<f64>,
    pub weighted_fixtures: usize,
    pub mean_brier: Option<f64>,
    pub mean_log_loss: Option<f64>,
    pub mean_top_probability: Option<f64>,
    pub calibrated_fixtures: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeagueAccuracy {
    pub league_id: String,
    pub league_name: String,
    pub processed: usize,
    #[serde(flatten)]
    pub summary: CriteriaSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccuracyAggregate {
    pub date: NaiveDate,
    pub processed: usize,
    #[serde(flatten)]
    pub summary: CriteriaSummary,
    pub leagues: Vec<LeagueAccuracy>,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStatus {
    Scored,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackfillEntry {
    pub date: NaiveDate,
    pub status: BackfillStatus,
    pub processed: usize,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BackfillReport {
    pub entries: Vec<BackfillEntry>,
}

impl BackfillReport {
    pub fn count(&self, status: BackfillStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_criterion_stats_ignore_inapplicable() {
        let mut stats = CriterionStats::default();
        stats.record(Some(true));
        stats.record(None);
        stats.record(Some(false));
        stats.record(None);

        assert_eq!(stats.applicable, 2);
        assert_eq!(stats.correct, 1);
        assert_eq!(stats.percentage, Some(50.0));
    }

    #[test]
    fn test_percentage_undefined_without_denominator() {
        assert_eq!(percentage(0, 0), None);
        assert_eq!(percentage(3, 4), Some(75.0));
    }
}
