use std::sync::Arc;

use insights_agent::{AgentConfig, AgentRuntime, OpenRouterClient, ProviderError, ToolDispatcher};
use insights_core::config::{AppConfig, ConfigError};
use insights_core::domain::schema::SchemaDescriptor;
use insights_db::{
    connect_read_only, connect_with_settings, migrations, DbPool, QueryExecutor,
    SqliteReadOnlySource,
};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client initialization failed: {0}")]
    LlmClient(#[source] ProviderError),
}

impl BootstrapError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_validation",
            Self::DatabaseConnect(_) => "db_connectivity",
            Self::Migration(_) => "migration",
            Self::LlmClient(_) => "llm_client",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::DatabaseConnect(_) => 4,
            Self::Migration(_) => 5,
            Self::LlmClient(_) => 7,
        }
    }
}

/// Owner pool with the analytics schema applied. Used by `migrate` and `seed`.
pub async fn prepare_database(config: &AppConfig) -> Result<DbPool, BootstrapError> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;

    migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    Ok(pool)
}

/// Wires the agent against the read-only runtime database. The owner pool is
/// never opened here.
pub async fn build_agent(config: &AppConfig) -> Result<AgentRuntime, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        "starting agent bootstrap"
    );

    let pool = connect_read_only(
        &config.database.runtime_url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "read-only database connection established"
    );

    let executor = QueryExecutor::new(Arc::new(SqliteReadOnlySource::new(pool)), &config.query);
    let dispatcher = ToolDispatcher::new(Arc::new(SchemaDescriptor::analytics()), executor);
    let llm = OpenRouterClient::from_config(&config.llm).map_err(BootstrapError::LlmClient)?;

    Ok(AgentRuntime::new(Arc::new(llm), dispatcher, AgentConfig::from(config)))
}
