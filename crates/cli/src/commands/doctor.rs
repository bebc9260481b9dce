use serde::Serialize;

use crate::commands::CommandResult;
use leadline_core::config::{AppConfig, LoadOptions};
use leadline_db::connect_with_settings;

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: &'static str,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
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
                    "business `{}` offering {} service(s), policy v{}",
                    config.business.name,
                    config.business.services.len(),
                    config.policy.version
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
        checks.push(database_check(config));
        checks.push(DoctorCheck {
            name: "sms",
            status: "ok",
            detail: if config.sms.enabled {
                format!("http delivery via {}", config.sms.api_base_url)
            } else {
                "disabled (noop delivery)".to_string()
            },
        });
        checks.push(DoctorCheck {
            name: "fsm",
            status: "ok",
            detail: if config.fsm.enabled {
                format!("http client via {}", config.fsm.api_base_url)
            } else {
                "disabled (noop client)".to_string()
            },
        });
    }

    let healthy = checks.iter().all(|check| check.status == "ok");
    let report =
        DoctorReport { status: if healthy { "ok" } else { "error" }, checks };

    let output = if json {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!("{{\"status\":\"error\",\"message\":\"{error}\"}}")
        })
    } else {
        render_text(&report)
    };

    if healthy {
        CommandResult { exit_code: 0, output }
    } else {
        CommandResult { exit_code: 2, output }
    }
}

fn database_check(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "database",
                status: "error",
                detail: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await?;
        sqlx_probe(&pool).await?;
        pool.close().await;
        Ok::<(), sqlx::Error>(())
    });

    match result {
        Ok(()) => DoctorCheck {
            name: "database",
            status: "ok",
            detail: format!("reachable at {}", config.database.url),
        },
        Err(error) => DoctorCheck {
            name: "database",
            status: "error",
            detail: error.to_string(),
        },
    }
}

async fn sqlx_probe(pool: &leadline_db::DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await.map(|_| ())
}

fn render_text(report: &DoctorReport) -> String {
    let mut lines = vec![format!("doctor: {}", report.status)];
    for check in &report.checks {
        lines.push(format!("  [{}] {} - {}", check.status, check.name, check.detail));
    }
    lines.join("\n")
}
