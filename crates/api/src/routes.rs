use axum::{
    extract::{Query, State},
    http::header,
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use matchcast_models::{
    parse_date, AccuracyAggregate, BackfillReport, MatchcastError, PauseWindow, RunOptions, RunResult,
};
use matchcast_services::{
    date_range, AccuracyEngine, BatchOrchestrator, ClearReport, HealthReport, HealthService, Maintenance,
    PipelineMetrics, MAX_BACKFILL_DAYS,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;
use crate::middleware::require_token;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BatchOrchestrator>,
    pub accuracy: Arc<AccuracyEngine>,
    pub health: Arc<HealthService>,
    pub maintenance: Arc<Maintenance>,
    pub metrics: Arc<PipelineMetrics>,
    pub trigger_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        })
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPredictionsParams {
    pub date: Option<String>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub resume: bool,
    pub wave: Option<usize>,
    #[serde(alias = "featured_only")]
    pub featured_only: Option<bool>,
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DateParams {
    pub date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BackfillParams {
    pub date: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub days: Option<i64>,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearParams {
    pub date: Option<String>,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct PauseParams {
    pub date: Option<String>,
    pub minutes: Option<i64>,
    pub until: Option<String>,
    pub reason: Option<String>,
}

const DEFAULT_PAUSE_MINUTES: i64 = 60;

pub fn create_routes() -> Router<AppState> {
    Router::new()
        // Prediction pipeline
        .route("/run-predictions", get(run_predictions).post(run_predictions))
        .route("/health", get(pipeline_health))

        // Accuracy scoring
        .route("/run-scores", get(run_scores).post(run_scores))
        .route("/backfill-accuracy", get(backfill_accuracy).post(backfill_accuracy))

        // Operator controls
        .route("/clear", post(clear_date).delete(clear_date))
        .route("/pause", post(pause_date).delete(unpause_date))
}

/// Full application router. Trigger routes sit behind the bearer-token guard;
/// liveness and metrics stay open.
pub fn create_router(state: AppState) -> Router {
    let triggers = create_routes().route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/livez", get(livez))
        .route("/metrics", get(metrics))
        .merge(triggers)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn date_or_today(raw: Option<&str>) -> Result<NaiveDate, MatchcastError> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => parse_date(raw),
        _ => Ok(Utc::now().date_naive()),
    }
}

// Generate (or resume) predictions for one date
async fn run_predictions(
    State(state): State<AppState>,
    Query(params): Query<RunPredictionsParams>,
) -> ApiResult<RunResult> {
    let date = date_or_today(params.date.as_deref())?;
    let options = RunOptions {
        force: params.force,
        resume: params.resume,
        wave_size: params.wave,
        featured_only: params.featured_only.unwrap_or(true),
        preferred_model: params.model.filter(|m| !m.trim().is_empty()),
    };
    info!(%date, ?options, "run-predictions triggered");

    let result = state.orchestrator.run_for_date(date, options).await?;
    let message = format!(
        "{} processed, {} generated, {} failures, {} remaining",
        result.processed,
        result.generated,
        result.failures.len(),
        result.remaining_after_wave
    );
    Ok(ApiResponse::ok(result, message))
}

// Score a date, the previous day by default
async fn run_scores(
    State(state): State<AppState>,
    Query(params): Query<DateParams>,
) -> ApiResult<AccuracyAggregate> {
    let aggregate = match params.date.as_deref() {
        Some(raw) => state.accuracy.score_date(parse_date(raw)?).await?,
        None => state.accuracy.score_previous_day(Utc::now().date_naive()).await?,
    };
    let message = format!("{} fixtures scored for {}", aggregate.processed, aggregate.date);
    Ok(ApiResponse::ok(aggregate, message))
}

async fn pipeline_health(
    State(state): State<AppState>,
    Query(params): Query<DateParams>,
) -> ApiResult<HealthReport> {
    let date = date_or_today(params.date.as_deref())?;
    let report = state.health.report(date).await?;
    let message = if report.hints.is_empty() {
        "ok".to_string()
    } else {
        format!("{} hint(s)", report.hints.len())
    };
    Ok(ApiResponse::ok(report, message))
}

async fn backfill_accuracy(
    State(state): State<AppState>,
    Query(params): Query<BackfillParams>,
) -> ApiResult<BackfillReport> {
    let dates = backfill_dates(&params, Utc::now().date_naive())?;
    info!(dates = dates.len(), force = params.force, "backfill triggered");

    let report = state.accuracy.backfill(&dates, params.force).await;
    let message = format!(
        "{} scored, {} skipped, {} failed",
        report.count(matchcast_models::BackfillStatus::Scored),
        report.count(matchcast_models::BackfillStatus::Skipped),
        report.count(matchcast_models::BackfillStatus::Failed)
    );
    Ok(ApiResponse::ok(report, message))
}

/// Resolves `date`, `start`+`end` or `days` (ending yesterday) into the dates to backfill.
pub fn backfill_dates(params: &BackfillParams, today: NaiveDate) -> Result<Vec<NaiveDate>, MatchcastError> {
    if let Some(raw) = params.date.as_deref() {
        return Ok(vec![parse_date(raw)?]);
    }
    match (params.start.as_deref(), params.end.as_deref(), params.days) {
        (Some(start), Some(end), _) => date_range(parse_date(start)?, parse_date(end)?, MAX_BACKFILL_DAYS),
        (None, None, Some(days)) => {
            if !(1..=MAX_BACKFILL_DAYS).contains(&days) {
                return Err(MatchcastError::InvalidRange(format!(
                    "days must be between 1 and {MAX_BACKFILL_DAYS}, got {days}"
                )));
            }
            let end = today - Duration::days(1);
            date_range(end - Duration::days(days - 1), end, MAX_BACKFILL_DAYS)
        }
        _ => Err(MatchcastError::InvalidRange(
            "expected date, start and end, or days".to_string(),
        )),
    }
}

async fn clear_date(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> ApiResult<ClearReport> {
    let raw = params
        .date
        .as_deref()
        .ok_or_else(|| MatchcastError::InvalidDate(String::new()))?;
    let report = state.maintenance.clear(parse_date(raw)?, params.confirm).await?;
    let message = format!("{} keys deleted", report.deleted);
    Ok(ApiResponse::ok(report, message))
}

async fn pause_date(
    State(state): State<AppState>,
    Query(params): Query<PauseParams>,
) -> ApiResult<PauseWindow> {
    let date = date_or_today(params.date.as_deref())?;
    let until = match params.until.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| MatchcastError::InvalidDate(raw.to_string()))?,
        None => Utc::now() + Duration::minutes(params.minutes.unwrap_or(DEFAULT_PAUSE_MINUTES).max(1)),
    };
    let window = state.maintenance.pause(date, until, params.reason).await?;
    let message = format!("paused {date} until {}", window.until.to_rfc3339());
    Ok(ApiResponse::ok(window, message))
}

async fn unpause_date(
    State(state): State<AppState>,
    Query(params): Query<DateParams>,
) -> ApiResult<bool> {
    let date = date_or_today(params.date.as_deref())?;
    let lifted = state.maintenance.unpause(date).await?;
    let message = if lifted { "pause lifted" } else { "no pause set" };
    Ok(ApiResponse::ok(lifted, message))
}

async fn livez() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(raw: &str) -> NaiveDate {
        parse_date(raw).unwrap()
    }

    #[test]
    fn test_backfill_dates_single_and_range() {
        let today = day("2024-02-10");
        let single = BackfillParams {
            date: Some("2024-01-15".into()),
            ..Default::default()
        };
        assert_eq!(backfill_dates(&single, today).unwrap(), vec![day("2024-01-15")]);

        let range = BackfillParams {
            start: Some("2024-01-01".into()),
            end: Some("2024-01-07".into()),
            ..Default::default()
        };
        assert_eq!(backfill_dates(&range, today).unwrap().len(), 7);
    }

    #[test]
    fn test_backfill_days_end_yesterday() {
        let params = BackfillParams {
            days: Some(3),
            ..Default::default()
        };
        let dates = backfill_dates(&params, day("2024-02-10")).unwrap();
        assert_eq!(dates, vec![day("2024-02-07"), day("2024-02-08"), day("2024-02-09")]);
    }

    #[test]
    fn test_backfill_dates_rejects_bad_requests() {
        let today = day("2024-02-10");
        assert!(backfill_dates(&BackfillParams::default(), today).is_err());
        let zero = BackfillParams {
            days: Some(0),
            ..Default::default()
        };
        assert!(matches!(backfill_dates(&zero, today), Err(MatchcastError::InvalidRange(_))));
        let too_long = BackfillParams {
            days: Some(90),
            ..Default::default()
        };
        assert!(matches!(backfill_dates(&too_long, today), Err(MatchcastError::InvalidRange(_))));
    }
}
