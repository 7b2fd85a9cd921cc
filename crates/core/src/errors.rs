use thiserror::Error;

use crate::guard::GuardError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("query exceeded the statement timeout of {seconds}s")]
    Timeout { seconds: u64 },
    #[error("database error: {0}")]
    Database(String),
}

/// Failure of the guard → executor composition behind `run_sql`.
///
/// Both variants are scoped to a single tool call: the message is handed back
/// to the model, which may retry with a corrected query.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl QueryError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Guard(GuardError::EmptyQuery) => "guard.empty_query",
            Self::Guard(GuardError::ForbiddenKeyword { .. }) => "guard.forbidden_keyword",
            Self::Guard(GuardError::UnauthorizedTable { .. }) => "guard.unauthorized_table",
            Self::Guard(GuardError::InvalidQueryType) => "guard.invalid_query_type",
            Self::Execution(ExecutionError::Timeout { .. }) => "execution.timeout",
            Self::Execution(ExecutionError::Database(_)) => "execution.database",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ExecutionError, QueryError};
    use crate::guard::GuardError;

    #[test]
    fn guard_failures_keep_their_message_for_the_model() {
        let error = QueryError::from(GuardError::ForbiddenKeyword {
            keywords: vec!["DROP".to_string()],
        });

        assert_eq!(error.to_string(), "Forbidden SQL keywords detected: DROP");
        assert_eq!(error.error_class(), "guard.forbidden_keyword");
    }

    #[test]
    fn timeout_reports_budget() {
        let error = QueryError::from(ExecutionError::Timeout { seconds: 10 });

        assert_eq!(error.to_string(), "query exceeded the statement timeout of 10s");
        assert_eq!(error.error_class(), "execution.timeout");
    }
}
