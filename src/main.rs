mod config;

use anyhow::{Context, Result};
use config::{AppConfig, ProviderEndpoint};
use matchcast_api::{create_router, AppState};
use matchcast_db::{DatabaseConnection, MemoryStore, PgStore, StateStore};
use matchcast_services::{
    AccuracyEngine, BatchOrchestrator, ChatCompletionsProvider, FixtureAdapter, HealthService,
    HttpFixtureSource, Maintenance, PipelineMetrics, PredictionProvider, ProviderChain, Scheduler, TierSpec,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "matchcast=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting matchcast prediction pipeline");

    // Load configuration
    let config = AppConfig::new().context("failed to load configuration")?;
    info!("✅ Configuration loaded successfully");
    info!("🌐 Server will bind to: {}", config.server_addr());

    let store = connect_store(&config).await?;
    let metrics = Arc::new(PipelineMetrics::new().context("failed to build metrics registry")?);

    let source = HttpFixtureSource::new(
        config.fixtures.base_url.clone(),
        config.fixtures.api_key.clone(),
        config.fixtures_timeout(),
    )?;
    let fixtures = Arc::new(FixtureAdapter::new(Arc::new(source), config.fixtures.featured_leagues.clone()));
    info!("⚽ Featured leagues: {:?}", config.fixtures.featured_leagues);

    let chain = Arc::new(build_chain(&config)?);
    let pipeline = config.pipeline_config();

    let orchestrator = Arc::new(BatchOrchestrator::new(
        store.clone(),
        fixtures.clone(),
        chain,
        metrics.clone(),
        pipeline.clone(),
    ));
    let accuracy = Arc::new(AccuracyEngine::new(store.clone(), fixtures, metrics.clone()));

    let state = AppState {
        orchestrator: orchestrator.clone(),
        accuracy: accuracy.clone(),
        health: Arc::new(HealthService::new(store.clone(), pipeline.controller)),
        maintenance: Arc::new(Maintenance::new(store)),
        metrics,
        trigger_token: config.api.trigger_token.clone().filter(|t| !t.is_empty()),
    };
    if state.trigger_token.is_none() {
        warn!("🔓 No trigger token configured, trigger routes are open");
    }

    let scheduler_handle = if config.schedule.enabled {
        let scheduler = Scheduler::new(orchestrator, accuracy, config.scheduler_config());
        Some(tokio::spawn(async move { scheduler.start().await }))
    } else {
        info!("⏸️  Scheduler disabled, waiting for HTTP triggers");
        None
    };

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(config.server_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr()))?;
    info!("✅ Listening on {}", config.server_addr());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Shutting down gracefully");
    if let Some(handle) = scheduler_handle {
        handle.abort();
    }

    Ok(())
}

async fn connect_store(config: &AppConfig) -> Result<Arc<dyn StateStore>> {
    match config.database.url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => {
            let db = DatabaseConnection::new(url, config.database.max_connections).await?;
            db.ensure_schema().await?;
            if !db.health_check().await? {
                anyhow::bail!("database health check failed");
            }
            info!("📊 Using Postgres state store");
            Ok(Arc::new(PgStore::new(db.pool().clone())))
        }
        None => {
            warn!("📊 No database configured, state is kept in memory only");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn build_provider(endpoint: &ProviderEndpoint, timeout: Duration) -> Result<Arc<dyn PredictionProvider>> {
    let provider = ChatCompletionsProvider::new(
        endpoint.name.clone(),
        endpoint.base_url.clone(),
        endpoint.api_key.clone(),
        timeout,
    )?;
    Ok(Arc::new(provider))
}

fn build_chain(config: &AppConfig) -> Result<ProviderChain> {
    let timeout = config.provider_timeout();
    let primary = &config.providers.primary;
    let mut chain = ProviderChain::new(TierSpec {
        provider: build_provider(primary, timeout)?,
        model: primary.model.clone(),
    })
    .with_retry_policy(config.retry_policy());
    info!("🤖 Primary provider: {} ({})", primary.name, primary.model);

    if let Some(model) = config.providers.alternate_model.clone() {
        info!("🤖 Alternate model: {}", model);
        chain = chain.with_alternate_model(model);
    }

    if let Some(fallback) = &config.providers.fallback {
        match build_provider(fallback, timeout) {
            Ok(provider) => {
                info!("🤖 Fallback provider: {} ({})", fallback.name, fallback.model);
                chain = chain.with_fallback(TierSpec {
                    provider,
                    model: fallback.model.clone(),
                });
            }
            Err(e) => error!("❌ Fallback provider disabled: {}", e),
        }
    }

    Ok(chain)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ Failed to listen for shutdown signal: {}", e);
    }
}
