use chrono::{DateTime, NaiveDate, Utc};
use matchcast_db::{put_json, StateStore};
use matchcast_models::{keys, MatchcastError, PauseWindow, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClearReport {
    pub date: NaiveDate,
    pub deleted: usize,
    pub keys: Vec<String>,
}

/// Destructive and operator-facing state changes for a date.
pub struct Maintenance {
    store: Arc<dyn StateStore>,
}

impl Maintenance {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Deletes every key belonging to `date`: daily state, accuracy records and
    /// the individual prediction records. Requires `confirm`.
    pub async fn clear(&self, date: NaiveDate, confirm: bool) -> Result<ClearReport> {
        if !confirm {
            return Err(MatchcastError::ConfirmationRequired(date.to_string()));
        }

        let store = self.store.as_ref();
        let mut targets = store.list(&keys::daily_prefix(date)).await?;
        targets.extend(store.list(&keys::accuracy_prefix(date)).await?);
        targets.extend(
            store
                .list(keys::PREDICTION_PREFIX)
                .await?
                .into_iter()
                .filter(|key| keys::is_prediction_for_date(key, date)),
        );

        let mut deleted = Vec::with_capacity(targets.len());
        for key in targets {
            if store.delete(&key).await? {
                deleted.push(key);
            }
        }

        warn!(%date, deleted = deleted.len(), "cleared persisted state");
        Ok(ClearReport {
            date,
            deleted: deleted.len(),
            keys: deleted,
        })
    }

    pub async fn pause(&self, date: NaiveDate, until: DateTime<Utc>, reason: Option<String>) -> Result<PauseWindow> {
        let window = PauseWindow { until, reason };
        put_json(self.store.as_ref(), &keys::pause_until(date), &window).await?;
        info!(%date, %until, "pipeline paused");
        Ok(window)
    }

    /// Lifts a pause. Returns whether one was set.
    pub async fn unpause(&self, date: NaiveDate) -> Result<bool> {
        let removed = self.store.delete(&keys::pause_until(date)).await?;
        if removed {
            info!(%date, "pause lifted");
        }
        Ok(removed)
    }
}
