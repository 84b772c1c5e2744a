use config::{Config, ConfigError, Environment, File};
use matchcast_services::{ControllerConfig, PipelineConfig, RetryPolicy, SchedulerConfig, DEFAULT_FEATURED_LEAGUES};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fixtures: FixturesConfig,
    pub providers: ProvidersConfig,
    pub pipeline: PipelineSettings,
    pub controller: ControllerSettings,
    #[serde(default)]
    pub api: ApiConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// When unset the pipeline keeps its state in memory.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixturesConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub featured_leagues: Vec<u32>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub primary: ProviderEndpoint,
    pub alternate_model: Option<String>,
    pub fallback: Option<ProviderEndpoint>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_jitter_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub fallback_limit: usize,
    pub max_matches: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    pub initial_concurrency: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub recovery_factor: f64,
    pub break_threshold: u32,
    pub break_backoff_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    pub trigger_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub scoring_hour: u32,
    pub wave_size: Option<usize>,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let controller = ControllerConfig::default();
        let retry = RetryPolicy::default();
        let pipeline = PipelineConfig::default();
        let featured: Vec<i64> = DEFAULT_FEATURED_LEAGUES.iter().map(|&id| i64::from(id)).collect();

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("fixtures.base_url", "https://v3.football.api-sports.io")?
            .set_default("fixtures.featured_leagues", featured)?
            .set_default("fixtures.timeout_secs", 20)?
            .set_default("providers.primary.name", "openai")?
            .set_default("providers.primary.base_url", "https://api.openai.com/v1")?
            .set_default("providers.primary.model", "gpt-4o-mini")?
            .set_default("providers.timeout_secs", 60)?
            .set_default("providers.max_attempts", i64::from(retry.max_attempts))?
            .set_default("providers.base_delay_ms", millis(retry.base_delay))?
            .set_default("providers.max_jitter_ms", millis(retry.max_jitter))?
            .set_default("pipeline.fallback_limit", count(pipeline.fallback_limit))?
            .set_default("pipeline.max_matches", count(pipeline.max_matches))?
            .set_default("controller.min_concurrency", count(controller.min_concurrency))?
            .set_default("controller.max_concurrency", count(controller.max_concurrency))?
            .set_default("controller.initial_concurrency", count(controller.initial_concurrency))?
            .set_default("controller.base_delay_ms", millis(controller.base_delay))?
            .set_default("controller.max_delay_ms", millis(controller.max_delay))?
            .set_default("controller.backoff_multiplier", controller.backoff_multiplier)?
            .set_default("controller.recovery_factor", controller.recovery_factor)?
            .set_default("controller.break_threshold", i64::from(controller.break_threshold))?
            .set_default("controller.break_backoff_secs", millis(controller.break_backoff) / 1000)?
            .set_default("schedule.enabled", false)?
            .set_default("schedule.interval_minutes", 15)?
            .set_default("schedule.scoring_hour", 6)?
            .set_default("schedule.wave_size", 8)?
            // Add in settings from configuration file
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from environment variables, e.g. MATCHCAST_PROVIDERS__PRIMARY__API_KEY
            .add_source(
                Environment::with_prefix("MATCHCAST")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("fixtures.featured_leagues")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn fixtures_timeout(&self) -> Duration {
        Duration::from_secs(self.fixtures.timeout_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.providers.max_attempts,
            base_delay: Duration::from_millis(self.providers.base_delay_ms),
            max_jitter: Duration::from_millis(self.providers.max_jitter_ms),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let c = &self.controller;
        PipelineConfig {
            fallback_limit: self.pipeline.fallback_limit,
            max_matches: self.pipeline.max_matches,
            controller: ControllerConfig {
                min_concurrency: c.min_concurrency,
                max_concurrency: c.max_concurrency,
                initial_concurrency: c.initial_concurrency,
                base_delay: Duration::from_millis(c.base_delay_ms),
                max_delay: Duration::from_millis(c.max_delay_ms),
                backoff_multiplier: c.backoff_multiplier,
                recovery_factor: c.recovery_factor,
                break_threshold: c.break_threshold,
                break_backoff: Duration::from_secs(c.break_backoff_secs),
            },
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            prediction_interval: Duration::from_secs(self.schedule.interval_minutes.max(1) * 60),
            scoring_hour: self.schedule.scoring_hour.min(23),
            wave_size: self.schedule.wave_size,
        }
    }
}

fn millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
