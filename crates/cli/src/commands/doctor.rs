use serde::Serialize;

use crate::commands::runtime;
use crate::commands::CommandResult;
use cityhall_core::config::{AppConfig, LoadOptions};
use cityhall_db::connect_with_settings;

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    command: &'static str,
    status: &'static str,
    checks: Vec<DoctorCheck>,
}

pub fn run(json: bool) -> CommandResult {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config",
                status: "ok",
                detail: format!(
                    "configuration valid; {} workers, {}s job timeout",
                    config.engine.workers, config.engine.job_timeout_secs
                ),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config",
                status: "error",
                detail: error.to_string(),
            });
            None
        }
    };

    if let Some(config) = &config {
        match runtime() {
            Ok(runtime) => {
                let database_check = runtime.block_on(async {
                    match connect_with_settings(
                        &config.database.url,
                        config.database.max_connections,
                        config.database.timeout_secs,
                    )
                    .await
                    {
                        Ok(pool) => {
                            pool.close().await;
                            DoctorCheck {
                                name: "database",
                                status: "ok",
                                detail: format!("connected to {}", config.database.url),
                            }
                        }
                        Err(error) => DoctorCheck {
                            name: "database",
                            status: "error",
                            detail: error.to_string(),
                        },
                    }
                });
                checks.push(database_check);
            }
            Err(error) => {
                checks.push(DoctorCheck {
                    name: "database",
                    status: "error",
                    detail: format!("failed to initialize async runtime: {error}"),
                });
            }
        }

        checks.push(DoctorCheck {
            name: "llm",
            status: "ok",
            detail: if config.llm.enabled {
                format!("narration enabled via {} ({})", config.llm.base_url, config.llm.model)
            } else {
                "narration disabled; decisions carry deterministic reasoning only".to_string()
            },
        });
    }

    let healthy = checks.iter().all(|check| check.status == "ok");
    let report = DoctorReport {
        command: "doctor",
        status: if healthy { "ok" } else { "error" },
        checks,
    };

    let output = if json {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| error.to_string())
    } else {
        let mut lines = vec![format!("doctor: {}", report.status)];
        for check in &report.checks {
            lines.push(format!("  [{}] {}: {}", check.status, check.name, check.detail));
        }
        lines.join("\n")
    };

    CommandResult { exit_code: u8::from(!healthy), output }
}
