//! The closed set of tools the model may call.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use insights_core::domain::schema::SchemaProvider;
use insights_db::QueryExecutor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::conversation::ToolCall;

pub const GET_SCHEMA: &str = "get_schema";
pub const RUN_SQL: &str = "run_sql";
pub const SEARCH_DOCS: &str = "search_docs";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct DocSearchQuery {
    pub text: String,
    #[serde(default)]
    pub ward: Option<String>,
    #[serde(default)]
    pub from_date: Option<String>,
    #[serde(default)]
    pub to_date: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolInvocation {
    GetSchema,
    RunSql { query: String },
    SearchDocs(DocSearchQuery),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
}

#[derive(Deserialize)]
struct RunSqlArguments {
    query: String,
}

impl ToolInvocation {
    pub fn parse(call: &ToolCall) -> Result<Self, ToolCallError> {
        let name = call.name();
        let invalid = |reason: String| ToolCallError::InvalidArguments { tool: name.to_string(), reason };

        // Some models send an empty string for parameterless tools.
        let raw = call.function.arguments.trim();
        let arguments = if raw.is_empty() {
            json!({})
        } else {
            serde_json::from_str::<Value>(raw).map_err(|error| invalid(error.to_string()))?
        };

        match name {
            GET_SCHEMA => Ok(Self::GetSchema),
            RUN_SQL => serde_json::from_value::<RunSqlArguments>(arguments)
                .map(|arguments| Self::RunSql { query: arguments.query })
                .map_err(|error| invalid(error.to_string())),
            SEARCH_DOCS => serde_json::from_value::<DocSearchQuery>(arguments)
                .map(Self::SearchDocs)
                .map_err(|error| invalid(error.to_string())),
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetSchema => GET_SCHEMA,
            Self::RunSql { .. } => RUN_SQL,
            Self::SearchDocs(_) => SEARCH_DOCS,
        }
    }
}

/// Envelope handed back to the model for every tool call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolResult {
    pub fn ok(result: Value) -> Self {
        Self { success: true, result: Some(result), error: None, duration_ms: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, result: None, error: Some(error.into()), duration_ms: None }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn to_content(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"success":false,"error":"unserializable tool result"}"#.to_string())
    }
}

/// Citation lookup behind `search_docs`.
#[async_trait]
pub trait DocSearch: Send + Sync {
    async fn search(&self, query: &DocSearchQuery) -> anyhow::Result<Vec<Value>>;
}

/// No document index is wired in; every search finds nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptyDocSearch;

#[async_trait]
impl DocSearch for EmptyDocSearch {
    async fn search(&self, _query: &DocSearchQuery) -> anyhow::Result<Vec<Value>> {
        Ok(Vec::new())
    }
}

/// What a successful `run_sql` actually executed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutedSql {
    pub query: String,
    pub row_count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DispatchOutcome {
    pub result: ToolResult,
    pub executed_sql: Option<ExecutedSql>,
}

impl From<ToolResult> for DispatchOutcome {
    fn from(result: ToolResult) -> Self {
        Self { result, executed_sql: None }
    }
}

#[derive(Clone)]
pub struct ToolDispatcher {
    schema: Arc<dyn SchemaProvider>,
    executor: QueryExecutor,
    docs: Arc<dyn DocSearch>,
}

impl ToolDispatcher {
    pub fn new(schema: Arc<dyn SchemaProvider>, executor: QueryExecutor) -> Self {
        Self { schema, executor, docs: Arc::new(EmptyDocSearch) }
    }

    pub fn with_doc_search(mut self, docs: Arc<dyn DocSearch>) -> Self {
        self.docs = docs;
        self
    }

    /// OpenAI function definitions for the three tools.
    pub fn definitions(&self) -> Vec<Value> {
        vec![
            json!({
                "type": "function",
                "function": {
                    "name": GET_SCHEMA,
                    "description": "Get the sanitized database schema with tables, columns, and join information",
                    "parameters": {"type": "object", "properties": {}, "required": []}
                }
            }),
            json!({
                "type": "function",
                "function": {
                    "name": RUN_SQL,
                    "description": "Execute a read-only SQL query against the database",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "query": {
                                "type": "string",
                                "description": "The SQL query to execute (SELECT or WITH statements only)"
                            }
                        },
                        "required": ["query"]
                    }
                }
            }),
            json!({
                "type": "function",
                "function": {
                    "name": SEARCH_DOCS,
                    "description": "Search for relevant documentation or citations",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "text": {"type": "string", "description": "Text to search for in documentation"},
                            "ward": {"type": "string", "description": "Optional ward name to filter results"},
                            "from_date": {"type": "string", "description": "Optional start date for filtering (YYYY-MM-DD)"},
                            "to_date": {"type": "string", "description": "Optional end date for filtering (YYYY-MM-DD)"}
                        },
                        "required": ["text"]
                    }
                }
            }),
        ]
    }

    /// Never fails: parse and handler errors become `success: false`.
    pub async fn dispatch(&self, call: &ToolCall) -> DispatchOutcome {
        let outcome = match ToolInvocation::parse(call) {
            Ok(invocation) => self.invoke(invocation).await,
            Err(error) => ToolResult::failure(error.to_string()).into(),
        };

        debug!(
            event_name = "agent.tool.dispatched",
            tool_call_id = %call.id,
            tool = call.name(),
            success = outcome.result.success,
            "tool call dispatched"
        );
        outcome
    }

    async fn invoke(&self, invocation: ToolInvocation) -> DispatchOutcome {
        match invocation {
            ToolInvocation::GetSchema => match serde_json::to_value(self.schema.schema()) {
                Ok(schema) => ToolResult::ok(schema).into(),
                Err(error) => ToolResult::failure(error.to_string()).into(),
            },
            ToolInvocation::RunSql { query } => self.run_sql(&query).await,
            ToolInvocation::SearchDocs(query) => match self.docs.search(&query).await {
                Ok(citations) => ToolResult::ok(Value::Array(citations)).into(),
                Err(error) => ToolResult::failure(error.to_string()).into(),
            },
        }
    }

    async fn run_sql(&self, query: &str) -> DispatchOutcome {
        let started = Instant::now();
        let outcome = self.executor.run_sql_text(query).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok((sanitized, result)) => {
                let row_count = result.row_count;
                let payload = json!({
                    "columns": result.columns,
                    "rows": result.rows,
                    "row_count": row_count,
                    "duration_ms": duration_ms,
                });
                DispatchOutcome {
                    result: ToolResult::ok(payload),
                    executed_sql: Some(ExecutedSql { query: sanitized.into_string(), row_count }),
                }
            }
            Err(error) => {
                debug!(
                    event_name = "agent.tool.run_sql_rejected",
                    error_class = error.error_class(),
                    error = %error,
                    "run_sql failed"
                );
                ToolResult::failure(error.to_string()).with_duration_ms(duration_ms).into()
            }
        }
    }
}
