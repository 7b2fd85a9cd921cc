//! Agent runtime: lets a chat model answer analytics questions by calling a
//! small set of tools against the read-only analytics database.
//!
//! - `conversation` holds the message history sent to the model
//! - `llm` is the provider seam and the OpenAI-compatible HTTP client
//! - `tools` parses tool calls and dispatches them to the schema, SQL and
//!   document backends
//! - `runtime` drives the model/tool loop and normalizes the final answer
//!
//! The model never touches the database directly. Every statement it asks
//! for passes the SQL guard in `insights-core` first.

pub mod conversation;
pub mod llm;
pub mod prompt;
pub mod runtime;
pub mod tools;

pub use conversation::{Conversation, Message, Role, ToolCall};
pub use llm::{ChatRequest, ChatResponse, LlmClient, OpenRouterClient, ProviderError};
pub use runtime::{
    AgentConfig, AgentRuntime, OrchestrationError, OrchestrationReport, OrchestrationState,
    RunTrace,
};
pub use tools::{DocSearch, DocSearchQuery, EmptyDocSearch, ToolDispatcher, ToolResult};
