pub mod connection;
pub mod executor;
pub mod fixtures;
pub mod migrations;

pub use connection::{connect_owner, connect_read_only, connect_with_settings, DbPool};
pub use executor::{QueryExecutor, ReadOnlySource, SqliteReadOnlySource};
pub use fixtures::{DemoDataset, SeedResult, VerificationResult};
