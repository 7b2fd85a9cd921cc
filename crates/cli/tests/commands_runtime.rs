use std::env;
use std::sync::{Mutex, OnceLock};

use insights_cli::commands::{ask, doctor, migrate, seed};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&database_env(&dir, true), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_without_api_key() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&database_env(&dir, false), || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_every_demo_table() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&database_env(&dir, true), || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or("");
        for table in ["dim_geo", "fact_measure", "extended_fact_measure"] {
            assert!(message.contains(table), "{table} missing from {message}");
        }
    });
}

#[test]
fn seed_is_idempotent_across_runs() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&database_env(&dir, true), || {
        let first = seed::run();
        assert_eq!(first.exit_code, 0, "expected first seed invocation success");
        let second = seed::run();
        assert_eq!(second.exit_code, 0, "expected second seed invocation success");

        assert_eq!(parse_payload(&first.output)["message"], parse_payload(&second.output)["message"]);
    });
}

#[test]
fn doctor_passes_after_seed() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&database_env(&dir, true), || {
        assert_eq!(seed::run().exit_code, 0);

        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected passing doctor report: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "pass");
        let names = payload["checks"]
            .as_array()
            .map(|checks| checks.iter().map(|check| check["name"].clone()).collect::<Vec<_>>())
            .unwrap_or_default();
        assert_eq!(
            names,
            ["config_validation", "llm_client", "database_connectivity", "analytics_tables"]
        );
    });
}

#[test]
fn doctor_fails_when_runtime_database_is_missing() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&database_env(&dir, true), || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 1);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][2]["status"], "fail");
        assert_eq!(payload["checks"][3]["status"], "skipped");
    });
}

#[test]
fn doctor_skips_dependent_checks_without_config() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&database_env(&dir, false), || {
        let result = doctor::run(false);
        assert_eq!(result.exit_code, 1);
        assert!(result.output.starts_with("doctor: one or more readiness checks failed"));
        assert!(result.output.contains("- [fail] config_validation:"));
        assert!(result.output.contains("- [skip] analytics_tables:"));
    });
}

#[test]
fn ask_rejects_non_object_filters_before_loading_config() {
    with_env(&[], || {
        let result = ask::run("Forest cover?", Some("[\"Ranchi\"]"));
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["error_class"], "invalid_filters");
    });
}

#[test]
fn ask_reports_missing_runtime_database() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&database_env(&dir, true), || {
        let result = ask::run("Forest cover?", None);
        assert_eq!(result.exit_code, 4, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["error_class"], "db_connectivity");
    });
}

fn database_env(dir: &TempDir, with_api_key: bool) -> Vec<(&'static str, String)> {
    let url = format!("sqlite://{}", dir.path().join("insights.db").display());
    let mut vars = vec![
        ("INSIGHTS_DATABASE_URL", url.clone()),
        ("INSIGHTS_RUNTIME_DATABASE_URL", url),
    ];
    if with_api_key {
        vars.push(("INSIGHTS_LLM_API_KEY", "sk-test".to_string()));
    }
    vars
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, String)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "INSIGHTS_DATABASE_URL",
        "INSIGHTS_RUNTIME_DATABASE_URL",
        "INSIGHTS_DATABASE_MAX_CONNECTIONS",
        "INSIGHTS_DATABASE_TIMEOUT_SECS",
        "INSIGHTS_LLM_API_KEY",
        "INSIGHTS_LLM_BASE_URL",
        "INSIGHTS_LLM_MODEL",
        "INSIGHTS_LLM_TIMEOUT_SECS",
        "INSIGHTS_LLM_TEMPERATURE",
        "INSIGHTS_LLM_MAX_TOKENS",
        "INSIGHTS_QUERY_TIMEOUT_SECS",
        "INSIGHTS_MAX_ROWS_RETURNED",
        "INSIGHTS_MAX_PREVIEW_ROWS",
        "INSIGHTS_MAX_TOOL_ROUNDS",
        "INSIGHTS_LOGGING_LEVEL",
        "INSIGHTS_LOGGING_FORMAT",
        "INSIGHTS_LOG_LEVEL",
        "INSIGHTS_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
