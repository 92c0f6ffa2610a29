use std::sync::Arc;
use std::time::Instant;

use cityhall_agent::narrator::Narrator;
use cityhall_agent::pipeline::DepartmentPipeline;
use cityhall_core::config::{AppConfig, LoadOptions};
use cityhall_core::domain::department::Department;
use cityhall_core::domain::request::{ActionRequest, RequestKind};
use cityhall_core::jobs::JobEngine;
use cityhall_db::repositories::SqlSnapshotProvider;
use cityhall_db::{connect_with_settings, fixtures, migrations};

use crate::commands::{runtime, CommandResult};

/// End-to-end readiness: migrate an in-memory database, seed the demo city,
/// and run one request through the full evaluation pipeline.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "smoke",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "smoke",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let started = Instant::now();
    let result = runtime.block_on(async {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;
        fixtures::seed_demo_city(&pool)
            .await
            .map_err(|error| ("seed", error.to_string(), 6u8))?;

        let pipeline = DepartmentPipeline::new(
            Arc::new(SqlSnapshotProvider::new(pool.clone())),
            config.thresholds.clone(),
            Narrator::disabled(),
        );

        let job = JobEngine::new()
            .create_job(
                Department::Water,
                ActionRequest {
                    department: Department::Water,
                    kind: RequestKind::ReservoirInspection,
                    reason: "smoke validation inspection".to_string(),
                    location: "Zone-A".to_string(),
                    severity: None,
                    estimated_cost: None,
                    requested_window: None,
                    has_permit: false,
                },
                "corr-smoke",
            )
            .map_err(|error| ("submission", error.to_string(), 7u8))?;

        let (decision, _snapshot) = pipeline
            .evaluate(&job)
            .await
            .map_err(|error| ("evaluation", error.to_string(), 8u8))?;

        pool.close().await;
        Ok::<(String, f64), (&'static str, String, u8)>((
            decision.outcome.as_str().to_string(),
            decision.confidence,
        ))
    });

    match result {
        Ok((outcome, confidence)) => CommandResult::success(
            "smoke",
            format!(
                "end-to-end evaluation completed in {}ms: outcome={outcome} confidence={confidence:.2}",
                started.elapsed().as_millis()
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("smoke", error_class, message, exit_code)
        }
    }
}
