use std::sync::Arc;

use insights_agent::OpenRouterClient;
use insights_core::config::{AppConfig, LoadOptions};
use insights_core::guard::READABLE_TABLES;
use insights_db::{connect_read_only, QueryExecutor, SqliteReadOnlySource};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str, reason: &str) -> Self {
        Self { name, status: CheckStatus::Skipped, details: format!("skipped because {reason}") }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass("config_validation", "configuration loaded and validated"));
            checks.push(check_llm_client(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            for name in ["llm_client", "database_connectivity", "analytics_tables"] {
                checks.push(DoctorCheck::skipped(name, "configuration did not load"));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_llm_client(config: &AppConfig) -> DoctorCheck {
    match OpenRouterClient::from_config(&config.llm) {
        Ok(client) => DoctorCheck::pass(
            "llm_client",
            format!("model `{}` via `{}`", config.llm.model, client.endpoint()),
        ),
        Err(error) => DoctorCheck::fail("llm_client", error.to_string()),
    }
}

/// Opens the runtime database exactly the way the agent does and reads every
/// readable table through the guard.
fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![
                DoctorCheck::fail(
                    "database_connectivity",
                    format!("failed to initialize async runtime: {error}"),
                ),
                DoctorCheck::skipped("analytics_tables", "the async runtime did not start"),
            ];
        }
    };

    runtime.block_on(async {
        let pool = match connect_read_only(
            &config.database.runtime_url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        {
            Ok(pool) => pool,
            Err(error) => {
                return vec![
                    DoctorCheck::fail(
                        "database_connectivity",
                        format!("failed to open `{}` read-only: {error}", config.database.runtime_url),
                    ),
                    DoctorCheck::skipped("analytics_tables", "the database did not open"),
                ];
            }
        };

        let executor =
            QueryExecutor::new(Arc::new(SqliteReadOnlySource::new(pool.clone())), &config.query);
        let mut unreadable = Vec::new();
        for table in READABLE_TABLES {
            if let Err(error) = executor.run_sql_text(&format!("SELECT COUNT(*) FROM {table}")).await
            {
                unreadable.push(format!("{table} ({error})"));
            }
        }
        pool.close().await;

        let tables = if unreadable.is_empty() {
            DoctorCheck::pass(
                "analytics_tables",
                format!("{} analytics tables readable", READABLE_TABLES.len()),
            )
        } else {
            DoctorCheck::fail("analytics_tables", format!("unreadable: {}", unreadable.join(", ")))
        };

        vec![
            DoctorCheck::pass(
                "database_connectivity",
                format!("opened `{}` read-only", config.database.runtime_url),
            ),
            tables,
        ]
    })
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
