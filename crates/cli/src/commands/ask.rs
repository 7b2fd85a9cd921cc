use anyhow::{ensure, Context};
use insights_core::config::{AppConfig, LoadOptions};
use serde_json::Value;

use crate::bootstrap::{build_agent, BootstrapError};
use crate::commands::{block_on, CommandResult};

pub fn run(prompt: &str, raw_filters: Option<&str>) -> CommandResult {
    let filters = match parse_filters(raw_filters) {
        Ok(filters) => filters,
        Err(error) => {
            return CommandResult::failure("ask", "invalid_filters", format!("{error:#}"), 2);
        }
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let result = match block_on("ask", async {
        let runtime = build_agent(&config).await?;
        Ok::<_, BootstrapError>(runtime.generate(prompt, &filters).await)
    }) {
        Ok(result) => result,
        Err(failure) => return failure,
    };

    match result {
        Ok(response) => CommandResult::json(&response),
        Err(error) => CommandResult::failure(
            "ask",
            error.error_class(),
            error.to_string(),
            error.exit_code(),
        ),
    }
}

/// Absent filters mean "no filters"; anything given must be a JSON object.
pub fn parse_filters(raw: Option<&str>) -> anyhow::Result<Value> {
    let Some(raw) = raw else {
        return Ok(Value::Object(Default::default()));
    };

    let value: Value = serde_json::from_str(raw).context("--filters is not valid JSON")?;
    ensure!(value.is_object(), "--filters must be a JSON object");
    Ok(value)
}
