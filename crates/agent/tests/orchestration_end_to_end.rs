use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use insights_agent::{
    AgentConfig, AgentRuntime, ChatRequest, ChatResponse, LlmClient, OrchestrationState,
    ProviderError, Role, ToolCall, ToolDispatcher, ToolResult,
};
use insights_core::config::QueryConfig;
use insights_core::domain::filters::Filters;
use insights_core::domain::schema::SchemaDescriptor;
use insights_db::{
    connect_read_only, connect_with_settings, migrations, DemoDataset, QueryExecutor,
    SqliteReadOnlySource,
};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Mutex;

type TestResult<T = ()> = Result<T, String>;

const FOREST_SQL: &str = "SELECT t.year, f.value FROM fact_measure f \
     JOIN dim_indicator i ON f.indicator_id = i.id \
     JOIN dim_time t ON f.time_id = t.id \
     WHERE i.slug = 'forest_cover_area' ORDER BY t.year";

#[derive(Default)]
struct ScriptedLlm {
    responses: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
        Arc::new(Self { responses: Mutex::new(responses.into()), ..Self::default() })
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.requests.lock().await.push(request.clone());
        self.responses
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| ProviderError::MalformedResponse("script exhausted".to_string()))
    }
}

struct Harness {
    _dir: TempDir,
    runtime: AgentRuntime,
}

async fn harness(llm: Arc<ScriptedLlm>) -> TestResult<Harness> {
    let dir = TempDir::new().map_err(|error| format!("tempdir: {error}"))?;
    let url = format!("sqlite://{}", dir.path().join("analytics.db").display());

    let owner = connect_with_settings(&url, 1, 30).await.map_err(|error| error.to_string())?;
    migrations::run_pending(&owner).await.map_err(|error| error.to_string())?;
    DemoDataset::load(&owner).await.map_err(|error| error.to_string())?;
    owner.close().await;

    let pool = connect_read_only(&url, 2, 5).await.map_err(|error| error.to_string())?;
    let executor =
        QueryExecutor::new(Arc::new(SqliteReadOnlySource::new(pool)), &QueryConfig::default());
    let dispatcher = ToolDispatcher::new(Arc::new(SchemaDescriptor::analytics()), executor);

    Ok(Harness { _dir: dir, runtime: AgentRuntime::new(llm, dispatcher, AgentConfig::default()) })
}

fn tool_results(messages: &[insights_agent::Message]) -> TestResult<Vec<ToolResult>> {
    messages
        .iter()
        .filter(|message| message.role == Role::Tool)
        .map(|message| serde_json::from_str(&message.content).map_err(|error| error.to_string()))
        .collect()
}

#[tokio::test]
async fn schema_then_sql_then_answer_against_seeded_database() -> TestResult {
    let final_answer = json!({
        "insight_text": "Forest cover in Ranchi declined from 15420.5 to 15365.8 hectares.",
        "data_preview": {"columns": ["year", "value"], "rows": [[2019, 15420.5], [2021, 15365.8]]},
        "viz": {"type": "vega-lite", "spec": {"mark": "line"}}
    });
    let llm = ScriptedLlm::new(vec![
        ChatResponse::tool_calls(vec![
            ToolCall::new("call_schema", "get_schema", &json!({})),
            ToolCall::new("call_sql", "run_sql", &json!({"query": FOREST_SQL})),
        ]),
        ChatResponse::text(final_answer.to_string()),
    ]);
    let harness = harness(llm.clone()).await?;

    let report = harness
        .runtime
        .run("How did forest cover change in Ranchi?", &Filters::default())
        .await;

    if report.final_state != OrchestrationState::TerminalSuccess {
        return Err(format!("unexpected final state {:?}: {:?}", report.final_state, report.outcome));
    }
    let results = tool_results(report.conversation.messages())?;
    if results.len() != 2 || !results.iter().all(|result| result.success) {
        return Err(format!("both tools should succeed: {results:?}"));
    }
    let rows = results[1].result.as_ref().map(|result| result["rows"].clone()).unwrap_or_default();
    if rows[0] != json!([2019, 15420.5]) || rows.as_array().map(Vec::len) != Some(3) {
        return Err(format!("unexpected sql rows {rows}"));
    }
    if report.trace.sql_used.as_deref() != Some(format!("{FOREST_SQL} LIMIT 5000").as_str()) {
        return Err(format!("unexpected sql_used {:?}", report.trace.sql_used));
    }
    if llm.requests.lock().await.len() != 2 {
        return Err("expected exactly two model requests".to_string());
    }
    Ok(())
}

#[tokio::test]
async fn rejected_sql_is_retried_and_response_is_normalized() -> TestResult {
    let llm = ScriptedLlm::new(vec![
        ChatResponse::tool_calls(vec![ToolCall::new(
            "call_bad",
            "run_sql",
            &json!({"query": "SELECT name FROM sqlite_master"}),
        )]),
        ChatResponse::tool_calls(vec![ToolCall::new(
            "call_good",
            "run_sql",
            &json!({"query": FOREST_SQL}),
        )]),
        ChatResponse::text(
            json!({"insight_text": "Forest cover is stable.", "sql_used": ""}).to_string(),
        ),
    ]);
    let harness = harness(llm).await?;
    let filters = json!({"place": {"district": "Ranchi"}, "time": {"from": "2019", "to": "2021"}});

    let response = harness.runtime.generate("Forest cover trend?", &filters).await;

    if response.insight_text != "Forest cover is stable." {
        return Err(format!("unexpected insight text {:?}", response.insight_text));
    }
    if response.sql_used != format!("{FOREST_SQL} LIMIT 5000") {
        return Err(format!("sql_used should come from the executed query: {}", response.sql_used));
    }
    if response.filters_applied != Filters::from_raw(&filters) {
        return Err(format!("filters were not echoed: {:?}", response.filters_applied));
    }
    if response.viz.kind != "generic" || !response.data_preview.rows.is_empty() {
        return Err("missing fields should take their defaults".to_string());
    }
    Ok(())
}
