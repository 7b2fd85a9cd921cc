use crate::bootstrap::{prepare_database, BootstrapError};
use crate::commands::{block_on, CommandResult};
use insights_core::config::{AppConfig, LoadOptions};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let result = match block_on("migrate", async {
        let pool = prepare_database(&config).await?;
        pool.close().await;
        Ok::<(), BootstrapError>(())
    }) {
        Ok(result) => result,
        Err(failure) => return failure,
    };

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(error) => CommandResult::failure(
            "migrate",
            error.error_class(),
            error.to_string(),
            error.exit_code(),
        ),
    }
}
