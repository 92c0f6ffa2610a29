use std::sync::Arc;

use axum::Router;
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::info;

use cityhall_agent::guardrails::NarrationGuardrails;
use cityhall_agent::intent::KeywordIntentClassifier;
use cityhall_agent::llm::{HttpLlmClient, LlmClient};
use cityhall_agent::narrator::Narrator;
use cityhall_agent::pipeline::DepartmentPipeline;
use cityhall_core::config::{AppConfig, ConfigError, LoadOptions};
use cityhall_core::jobs::{JobEngine, JobEngineConfig};
use cityhall_db::repositories::{
    SqlClaimRepository, SqlDecisionRepository, SqlJobRepository, SqlSnapshotProvider,
};
use cityhall_db::{connect_with_settings, migrations, DbPool};

use crate::api::{self, ApiState};
use crate::health;
use crate::orchestrator::Orchestrator;
use crate::worker::{spawn_watchdog, spawn_workers};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub router: Router,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client initialization failed: {0}")]
    Llm(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let narrator = if config.llm.enabled {
        let client = HttpLlmClient::new(
            config.llm.base_url.clone(),
            config.llm.model.clone(),
            config.llm.api_key.as_ref().map(|key| key.expose_secret().to_string()),
            config.llm.timeout_secs,
            config.llm.max_retries,
        )
        .map_err(|error| BootstrapError::Llm(error.to_string()))?;
        let client: Arc<dyn LlmClient> = Arc::new(client);
        Narrator::new(Some(client), NarrationGuardrails::default())
    } else {
        Narrator::disabled()
    };

    let snapshots = Arc::new(SqlSnapshotProvider::new(db_pool.clone()));
    let pipeline = Arc::new(DepartmentPipeline::new(
        snapshots,
        config.thresholds.clone(),
        narrator,
    ));

    let jobs = Arc::new(SqlJobRepository::new(db_pool.clone()));
    let decisions = Arc::new(SqlDecisionRepository::new(db_pool.clone()));
    let claims = Arc::new(SqlClaimRepository::new(db_pool.clone()));

    let engine = JobEngine::with_config(JobEngineConfig {
        job_timeout_secs: config.engine.job_timeout_secs as i64,
    });
    let (orchestrator, queue_rx) = Orchestrator::new(
        engine,
        jobs.clone(),
        claims,
        pipeline,
        Arc::new(KeywordIntentClassifier::new()),
    );

    orchestrator.requeue_pending().await;
    spawn_workers(Arc::clone(&orchestrator), queue_rx, config.engine.workers);
    spawn_watchdog(Arc::clone(&orchestrator), config.engine.watchdog_interval_secs);

    let router = api::router(ApiState {
        orchestrator: Arc::clone(&orchestrator),
        jobs,
        decisions,
        history_default_limit: config.engine.history_default_limit,
        history_max_limit: config.engine.history_max_limit,
    })
    .merge(health::router(db_pool.clone()));

    info!(
        event_name = "system.bootstrap.completed",
        correlation_id = "bootstrap",
        workers = config.engine.workers,
        "application bootstrap completed"
    );

    Ok(Application { config, db_pool, router, orchestrator })
}

#[cfg(test)]
mod tests {
    use cityhall_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_builds_router() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with in-memory database");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('decision_job', 'decision_audit', 'coordination_claim', 'department_budget')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("expected baseline tables after bootstrap");
        assert_eq!(table_count, 4);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_rejects_invalid_database_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://not-sqlite".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("database.url"));
    }
}
