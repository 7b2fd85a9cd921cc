use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

/// `url` is the owner-privileged database used by migrations and seeding.
/// `runtime_url` is opened read-only and is the only one the agent sees.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub runtime_url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryConfig {
    pub statement_timeout_secs: u64,
    pub max_rows_returned: usize,
    pub max_preview_rows: usize,
    pub max_tool_rounds: usize,
}

impl QueryConfig {
    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            statement_timeout_secs: 10,
            max_rows_returned: 5000,
            max_preview_rows: 50,
            max_tool_rounds: 6,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub runtime_database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub max_tool_rounds: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://insights.db".to_string(),
                runtime_url: "sqlite://insights.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://openrouter.ai/api/v1".to_string(),
                model: "openai/gpt-4".to_string(),
                timeout_secs: 30,
                temperature: 0.1,
                max_tokens: 2000,
            },
            query: QueryConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("insights.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(runtime_url) = database.runtime_url {
                self.database.runtime_url = runtime_url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(query) = patch.query {
            if let Some(statement_timeout_secs) = query.statement_timeout_secs {
                self.query.statement_timeout_secs = statement_timeout_secs;
            }
            if let Some(max_rows_returned) = query.max_rows_returned {
                self.query.max_rows_returned = max_rows_returned;
            }
            if let Some(max_preview_rows) = query.max_preview_rows {
                self.query.max_preview_rows = max_preview_rows;
            }
            if let Some(max_tool_rounds) = query.max_tool_rounds {
                self.query.max_tool_rounds = max_tool_rounds;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("INSIGHTS_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("INSIGHTS_RUNTIME_DATABASE_URL") {
            self.database.runtime_url = value;
        }
        if let Some(value) = read_env("INSIGHTS_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_value("INSIGHTS_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("INSIGHTS_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_value("INSIGHTS_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INSIGHTS_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("INSIGHTS_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("INSIGHTS_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("INSIGHTS_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_value("INSIGHTS_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("INSIGHTS_LLM_TEMPERATURE") {
            self.llm.temperature = parse_value("INSIGHTS_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("INSIGHTS_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_value("INSIGHTS_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("INSIGHTS_QUERY_TIMEOUT_SECS") {
            self.query.statement_timeout_secs =
                parse_value("INSIGHTS_QUERY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("INSIGHTS_MAX_ROWS_RETURNED") {
            self.query.max_rows_returned = parse_value("INSIGHTS_MAX_ROWS_RETURNED", &value)?;
        }
        if let Some(value) = read_env("INSIGHTS_MAX_PREVIEW_ROWS") {
            self.query.max_preview_rows = parse_value("INSIGHTS_MAX_PREVIEW_ROWS", &value)?;
        }
        if let Some(value) = read_env("INSIGHTS_MAX_TOOL_ROUNDS") {
            self.query.max_tool_rounds = parse_value("INSIGHTS_MAX_TOOL_ROUNDS", &value)?;
        }

        let log_level =
            read_env("INSIGHTS_LOGGING_LEVEL").or_else(|| read_env("INSIGHTS_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INSIGHTS_LOGGING_FORMAT").or_else(|| read_env("INSIGHTS_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(runtime_database_url) = overrides.runtime_database_url {
            self.database.runtime_url = runtime_database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = llm_base_url;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(max_tool_rounds) = overrides.max_tool_rounds {
            self.query.max_tool_rounds = max_tool_rounds;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_query(&self.query)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("insights.toml"), PathBuf::from("config/insights.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn is_sqlite_url(url: &str) -> bool {
    let url = url.trim();
    url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:"
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    if !is_sqlite_url(&database.url) {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }
    if !is_sqlite_url(&database.runtime_url) {
        return Err(ConfigError::Validation(
            "database.runtime_url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    let missing =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    if missing {
        return Err(ConfigError::Validation(
            "llm.api_key is required. Set INSIGHTS_LLM_API_KEY or [llm].api_key".to_string(),
        ));
    }

    let base_url = llm.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.base_url must start with http:// or https://".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_query(query: &QueryConfig) -> Result<(), ConfigError> {
    if query.statement_timeout_secs == 0 || query.statement_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "query.statement_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if query.max_rows_returned == 0 {
        return Err(ConfigError::Validation(
            "query.max_rows_returned must be greater than zero".to_string(),
        ));
    }

    if query.max_preview_rows == 0 || query.max_preview_rows > query.max_rows_returned {
        return Err(ConfigError::Validation(
            "query.max_preview_rows must be in range 1..=query.max_rows_returned".to_string(),
        ));
    }

    if query.max_tool_rounds == 0 {
        return Err(ConfigError::Validation(
            "query.max_tool_rounds must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    query: Option<QueryPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    runtime_url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryPatch {
    statement_timeout_secs: Option<u64>,
    max_rows_returned: Option<usize>,
    max_preview_rows: Option<usize>,
    max_tool_rounds: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
