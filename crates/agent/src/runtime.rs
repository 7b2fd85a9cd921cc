//! Conversation orchestrator: drives model turns and tool rounds for one
//! request, then normalizes the final answer.

use std::sync::Arc;
use std::time::Instant;

use insights_core::config::AppConfig;
use insights_core::domain::filters::Filters;
use insights_core::domain::insight::InsightResponse;
use insights_core::normalizer::{ResponseNormalizer, FORMATTING_DISCLAIMER};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conversation::{Conversation, Message};
use crate::llm::{ChatRequest, LlmClient, ProviderError};
use crate::prompt::{user_message, SYSTEM_PROMPT};
use crate::tools::ToolDispatcher;

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 6;
pub const ERROR_DISCLAIMER: &str = "Error occurred during analysis";
pub const ROUND_LIMIT_DISCLAIMER: &str = "Analysis stopped after reaching the tool round limit";

#[derive(Clone, Debug, PartialEq)]
pub struct AgentConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_tool_rounds: usize,
    pub max_preview_rows: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4".to_string(),
            temperature: 0.1,
            max_tokens: 2000,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            max_preview_rows: 50,
        }
    }
}

impl From<&AppConfig> for AgentConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            max_tool_rounds: config.query.max_tool_rounds,
            max_preview_rows: config.query.max_preview_rows,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestrationState {
    Init,
    AwaitingModel,
    ExecutingTools,
    TerminalSuccess,
    TerminalError,
}

impl OrchestrationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::TerminalSuccess | Self::TerminalError)
    }
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("tool round limit of {limit} reached")]
    MaxRoundsExceeded { limit: usize },
}

/// Observability record of one run, kept whatever the terminal state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunTrace {
    /// Query text of the last successful `run_sql`.
    pub sql_used: Option<String>,
    pub row_count: usize,
    pub rounds: usize,
    pub tool_calls: usize,
}

#[derive(Debug)]
pub struct OrchestrationReport {
    pub correlation_id: String,
    pub outcome: Result<String, OrchestrationError>,
    pub final_state: OrchestrationState,
    pub trace: RunTrace,
    pub conversation: Conversation,
}

pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    dispatcher: ToolDispatcher,
    normalizer: ResponseNormalizer,
    config: AgentConfig,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>, dispatcher: ToolDispatcher, config: AgentConfig) -> Self {
        let normalizer = ResponseNormalizer::new(config.max_preview_rows);
        Self { llm, dispatcher, normalizer, config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Caller entry point. Always returns a fully populated response.
    pub async fn generate(&self, prompt: &str, raw_filters: &Value) -> InsightResponse {
        let started = Instant::now();
        let filters = Filters::from_raw(raw_filters);
        let report = self.run(prompt, &filters).await;

        let (response, error) = match &report.outcome {
            Ok(content) => {
                let mut response = self.normalizer.normalize(content, &filters);
                if response.sql_used.trim().is_empty() {
                    if let Some(sql) = &report.trace.sql_used {
                        response.sql_used = sql.clone();
                    }
                }
                let error = response
                    .disclaimers
                    .iter()
                    .any(|disclaimer| disclaimer == FORMATTING_DISCLAIMER)
                    .then(|| "final answer was not a JSON object".to_string());
                (response, error)
            }
            Err(error) => {
                let disclaimer = match error {
                    OrchestrationError::Provider(_) => ERROR_DISCLAIMER,
                    OrchestrationError::MaxRoundsExceeded { .. } => ROUND_LIMIT_DISCLAIMER,
                };
                let response = InsightResponse::failure(
                    format!("Sorry, I encountered an error while processing your request: {error}"),
                    disclaimer,
                    filters.clone(),
                );
                (response, Some(error.to_string()))
            }
        };

        info!(
            event_name = "agent.insight.completed",
            correlation_id = %report.correlation_id,
            prompt_hash = %prompt_hash(prompt),
            filters = %filters.to_json(),
            sql_used = %response.sql_used,
            duration_ms = started.elapsed().as_millis() as u64,
            row_count = report.trace.row_count,
            rounds = report.trace.rounds,
            tool_calls = report.trace.tool_calls,
            success = error.is_none(),
            error = error.as_deref().unwrap_or(""),
            "insight request completed"
        );

        response
    }

    /// Runs the model/tool loop to a terminal state without normalizing.
    pub async fn run(&self, prompt: &str, filters: &Filters) -> OrchestrationReport {
        let correlation_id = Uuid::new_v4().to_string();
        let tools = self.dispatcher.definitions();
        let mut conversation = Conversation::new(
            Message::system(SYSTEM_PROMPT),
            Message::user(user_message(prompt, filters)),
        );
        let mut trace = RunTrace::default();
        let mut state = OrchestrationState::Init;

        let outcome = loop {
            transition(&mut state, OrchestrationState::AwaitingModel, &correlation_id);
            let request = ChatRequest {
                model: self.config.model.clone(),
                messages: conversation.messages().to_vec(),
                tools: tools.clone(),
                tool_choice: Some("auto".to_string()),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            };

            let response = match self.llm.chat(&request).await {
                Ok(response) => response,
                Err(error) => break Err(OrchestrationError::from(error)),
            };

            if response.tool_calls.is_empty() {
                let content = response.content.clone().unwrap_or_default();
                conversation.push(response.into_message());
                break Ok(content);
            }

            if trace.rounds >= self.config.max_tool_rounds {
                warn!(
                    event_name = "agent.orchestration.round_limit",
                    correlation_id = %correlation_id,
                    limit = self.config.max_tool_rounds,
                    pending_tool_calls = response.tool_calls.len(),
                    "model requested tools after the round limit"
                );
                break Err(OrchestrationError::MaxRoundsExceeded {
                    limit: self.config.max_tool_rounds,
                });
            }

            transition(&mut state, OrchestrationState::ExecutingTools, &correlation_id);
            trace.rounds += 1;
            let calls = response.tool_calls.clone();
            conversation.push(response.into_message());

            for call in &calls {
                let outcome = self.dispatcher.dispatch(call).await;
                trace.tool_calls += 1;
                if let Some(executed) = outcome.executed_sql {
                    trace.sql_used = Some(executed.query);
                    trace.row_count = executed.row_count;
                }
                conversation.push(Message::tool(call.id.clone(), outcome.result.to_content()));
            }
        };

        let terminal = if outcome.is_ok() {
            OrchestrationState::TerminalSuccess
        } else {
            OrchestrationState::TerminalError
        };
        transition(&mut state, terminal, &correlation_id);

        OrchestrationReport { correlation_id, outcome, final_state: state, trace, conversation }
    }
}

fn transition(state: &mut OrchestrationState, next: OrchestrationState, correlation_id: &str) {
    debug!(
        event_name = "agent.orchestration.transition",
        correlation_id = %correlation_id,
        from = ?*state,
        to = ?next,
        "orchestration state changed"
    );
    *state = next;
}

/// First 8 hex characters of the SHA-256 of the prompt.
fn prompt_hash(prompt: &str) -> String {
    Sha256::digest(prompt.as_bytes()).iter().take(4).map(|byte| format!("{byte:02x}")).collect()
}
