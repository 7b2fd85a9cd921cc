pub mod config;
pub mod domain;
pub mod errors;
pub mod guard;
pub mod normalizer;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, QueryConfig};
pub use domain::filters::Filters;
pub use domain::insight::{DataPreview, InsightResponse, Visualization};
pub use domain::query::QueryResult;
pub use domain::schema::{SchemaDescriptor, SchemaProvider};
pub use errors::{ExecutionError, QueryError};
pub use guard::{GuardError, SanitizedQuery, SqlGuard};
pub use normalizer::ResponseNormalizer;
