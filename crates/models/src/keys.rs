//! Persisted key scheme. The store is key-value only, so every record the
//! pipeline owns is addressed through these functions.

use chrono::NaiveDate;

pub const PREDICTION_PREFIX: &str = "prediction:";

pub fn prediction(match_id: &str, model: &str, date: NaiveDate) -> String {
    format!("prediction:{match_id}:{model}:{date}")
}

pub fn daily_aggregate(date: NaiveDate) -> String {
    format!("daily:{date}:aggregate")
}

pub fn daily_progress(date: NaiveDate) -> String {
    format!("daily:{date}:progress")
}

pub fn pause_until(date: NaiveDate) -> String {
    format!("daily:{date}:pause-until")
}

pub fn daily_prefix(date: NaiveDate) -> String {
    format!("daily:{date}:")
}

pub fn accuracy_fixture(date: NaiveDate, match_id: &str) -> String {
    format!("accuracy:{date}:fixture:{match_id}")
}

pub fn accuracy_aggregate(date: NaiveDate) -> String {
    format!("accuracy:{date}:aggregate")
}

pub fn accuracy_prefix(date: NaiveDate) -> String {
    format!("accuracy:{date}:")
}

/// True for `prediction:{matchId}:{model}:{date}` keys belonging to `date`.
pub fn is_prediction_for_date(key: &str, date: NaiveDate) -> bool {
    key.starts_with(PREDICTION_PREFIX) && key.ends_with(&format!(":{date}"))
}
