//! Pure scoring of stored predictions against final results.
//!
//! Every criterion is nullable: a prediction that lacks the field a criterion
//! needs produces `None`, which never counts as wrong and never enters a
//! denominator.

use chrono::{NaiveDate, Utc};
use matchcast_models::{
    AccuracyAggregate, AccuracyRecord, Calibration, CriteriaSummary, CriterionFlags, FixtureMatch,
    LeagueAccuracy, OverUnder, PredictedOutcome, PredictionPayload, PredictionRecord, Score,
};
use std::collections::BTreeMap;

pub const OUTCOME_WEIGHT: f64 = 3.0;
pub const EXACT_SCORE_WEIGHT: f64 = 5.0;
pub const BTTS_WEIGHT: f64 = 2.0;

/// Floor applied to the actual-outcome probability before taking the log.
pub const LOG_LOSS_EPSILON: f64 = 1e-15;

pub fn criteria(prediction: &PredictionPayload, score: Score, total_corners: Option<u32>) -> CriterionFlags {
    let actual_outcome = PredictedOutcome::from_score(score.home, score.away);
    let actual_btts = score.home > 0 && score.away > 0;

    let goal_line = prediction.goal_line_pick().map(|pick| {
        OverUnder::for_total(f64::from(score.total()), pick.line) == pick.side
    });

    let clean_sheet = prediction
        .clean_sheet_pick()
        .map(|(home_cs, away_cs)| home_cs == (score.away == 0) && away_cs == (score.home == 0));

    let corners = match (prediction.corners_pick(), total_corners) {
        (Some(pick), Some(total)) => {
            Some(OverUnder::for_total(f64::from(total), matchcast_models::CORNERS_LINE) == pick)
        }
        _ => None,
    };

    CriterionFlags {
        outcome: prediction.predicted_outcome().map(|o| o == actual_outcome),
        exact_score: prediction
            .exact_score
            .as_ref()
            .map(|_| prediction.scoreline() == Some((score.home, score.away))),
        btts: prediction.btts.map(|b| b == actual_btts),
        goal_line,
        clean_sheet,
        corners,
    }
}

/// `100 * Σ(weight · correct) / Σ(weight · applicable)` over outcome, exact score and BTTS.
pub fn weighted_accuracy(flags: &CriterionFlags) -> Option<f64> {
    let mut earned = 0.0;
    let mut possible = 0.0;
    for (flag, weight) in [
        (flags.outcome, OUTCOME_WEIGHT),
        (flags.exact_score, EXACT_SCORE_WEIGHT),
        (flags.btts, BTTS_WEIGHT),
    ] {
        if let Some(correct) = flag {
            possible += weight;
            if correct {
                earned += weight;
            }
        }
    }
    (possible > 0.0).then(|| 100.0 * earned / possible)
}

/// Multi-class Brier score over (home, draw, away), divided by the class count.
pub fn brier_score(probs: [f64; 3], actual: PredictedOutcome) -> f64 {
    let target = one_hot(actual);
    probs
        .iter()
        .zip(target.iter())
        .map(|(p, y)| (p - y).powi(2))
        .sum::<f64>()
        / 3.0
}

pub fn log_loss(p_actual: f64) -> f64 {
    -p_actual.max(LOG_LOSS_EPSILON).ln()
}

pub fn calibration(prediction: &PredictionPayload, score: Score) -> Option<Calibration> {
    let probs = prediction.probabilities?.normalized()?;
    let actual = PredictedOutcome::from_score(score.home, score.away);
    let actual_probability = probs.probability_of(actual);
    let (top_probability, margin) = probs.top_and_margin();
    Some(Calibration {
        brier: brier_score([probs.home, probs.draw, probs.away], actual),
        log_loss: log_loss(actual_probability),
        actual_probability,
        top_probability,
        margin,
    })
}

/// Scores one finished fixture. `None` when the fixture has no final score.
pub fn score_fixture(fixture: &FixtureMatch, record: &PredictionRecord) -> Option<AccuracyRecord> {
    let score = fixture.score?;
    let criteria = criteria(&record.prediction, score, fixture.corners);
    Some(AccuracyRecord {
        match_id: fixture.match_id.clone(),
        league_id: fixture.league_id.clone(),
        league_name: fixture.league_name.clone(),
        team_home: fixture.team_home.clone(),
        team_away: fixture.team_away.clone(),
        model: record.model.clone(),
        final_score: score,
        total_corners: fixture.corners,
        weighted_accuracy: weighted_accuracy(&criteria),
        calibration: calibration(&record.prediction, score),
        criteria,
    })
}

pub fn summarize<'a>(records: impl IntoIterator<Item = &'a AccuracyRecord>) -> CriteriaSummary {
    let mut summary = CriteriaSummary::default();
    let mut weighted_sum = 0.0;
    let mut brier_sum = 0.0;
    let mut log_loss_sum = 0.0;
    let mut top_sum = 0.0;

    for record in records {
        let flags = &record.criteria;
        summary.outcome.record(flags.outcome);
        summary.exact_score.record(flags.exact_score);
        summary.btts.record(flags.btts);
        summary.goal_line.record(flags.goal_line);
        summary.clean_sheet.record(flags.clean_sheet);
        summary.corners.record(flags.corners);

        if let Some(accuracy) = record.weighted_accuracy {
            weighted_sum += accuracy;
            summary.weighted_fixtures += 1;
        }
        if let Some(cal) = &record.calibration {
            brier_sum += cal.brier;
            log_loss_sum += cal.log_loss;
            top_sum += cal.top_probability;
            summary.calibrated_fixtures += 1;
        }
    }

    if summary.weighted_fixtures > 0 {
        summary.overall_accuracy = Some(weighted_sum / summary.weighted_fixtures as f64);
    }
    if summary.calibrated_fixtures > 0 {
        let n = summary.calibrated_fixtures as f64;
        summary.mean_brier = Some(brier_sum / n);
        summary.mean_log_loss = Some(log_loss_sum / n);
        summary.mean_top_probability = Some(top_sum / n);
    }
    summary
}

/// Day rollup plus a per-league breakdown, recomputed from scratch.
pub fn aggregate(date: NaiveDate, records: &[AccuracyRecord]) -> AccuracyAggregate {
    let mut by_league: BTreeMap<&str, Vec<&AccuracyRecord>> = BTreeMap::new();
    for record in records {
        by_league.entry(record.league_id.as_str()).or_default().push(record);
    }

    let leagues = by_league
        .into_iter()
        .map(|(league_id, league_records)| LeagueAccuracy {
            league_id: league_id.to_string(),
            league_name: league_records
                .first()
                .map(|r| r.league_name.clone())
                .unwrap_or_default(),
            processed: league_records.len(),
            summary: summarize(league_records.iter().copied()),
        })
        .collect();

    AccuracyAggregate {
        date,
        processed: records.len(),
        summary: summarize(records),
        leagues,
        computed_at: Utc::now(),
    }
}

fn one_hot(outcome: PredictedOutcome) -> [f64; 3] {
    match outcome {
        PredictedOutcome::HomeWin => [1.0, 0.0, 0.0],
        PredictedOutcome::Draw => [0.0, 1.0, 0.0],
        PredictedOutcome::AwayWin => [0.0, 0.0, 1.0],
    }
}
