pub mod filters;
pub mod insight;
pub mod query;
pub mod schema;
