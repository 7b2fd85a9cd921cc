use crate::bootstrap::prepare_database;
use crate::commands::{block_on, CommandResult};
use insights_core::config::{AppConfig, LoadOptions};
use insights_db::DemoDataset;

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let result = match block_on("seed", async {
        let pool = prepare_database(&config)
            .await
            .map_err(|error| (error.error_class(), error.to_string(), error.exit_code()))?;

        let seed_result = DemoDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result: Result<Vec<&'static str>, (&'static str, String, u8)> =
            if verification.all_present {
                Ok(seed_result.tables_seeded)
            } else {
                let failed_checks = verification
                    .checks
                    .iter()
                    .filter_map(|(check, passed)| (!passed).then_some(*check))
                    .collect::<Vec<_>>();
                Err(("seed_verification", verification_message(&failed_checks), 6u8))
            };

        pool.close().await;
        run_result
    }) {
        Ok(result) => result,
        Err(failure) => return failure,
    };

    match result {
        Ok(tables) => CommandResult::success(
            "seed",
            format!("demo dataset loaded into: {}", tables.join(", ")),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn verification_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for tables: {}", failed_checks.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_tables() {
        assert_eq!(
            verification_message(&["fact_measure", "dataset_indicator"]),
            "Seed verification failed for tables: fact_measure, dataset_indicator"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        assert_eq!(verification_message(&[]), "Some seed data failed to load");
    }
}
