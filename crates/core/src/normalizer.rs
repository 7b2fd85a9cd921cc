//! Turns the model's final message into an [`InsightResponse`].
//!
//! Normalization is total: whatever the model produced, the caller receives a
//! fully populated envelope. `filters_applied` is always taken from the
//! caller, never from the model.

use serde_json::{json, Map, Value};

use crate::domain::filters::Filters;
use crate::domain::insight::{DataPreview, InsightResponse, Visualization, DEFAULT_VIZ_TYPE};

pub const DEFAULT_MAX_PREVIEW_ROWS: usize = 50;
pub const FALLBACK_PREFIX_CHARS: usize = 500;
pub const FORMATTING_DISCLAIMER: &str = "Response formatting issue - partial results shown";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponseNormalizer {
    max_preview_rows: usize,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PREVIEW_ROWS)
    }
}

impl ResponseNormalizer {
    pub fn new(max_preview_rows: usize) -> Self {
        Self { max_preview_rows }
    }

    pub fn max_preview_rows(&self) -> usize {
        self.max_preview_rows
    }

    pub fn normalize(&self, content: &str, filters: &Filters) -> InsightResponse {
        let mut response = match parse_document(content) {
            Some(document) => from_document(&document, filters.clone()),
            None => fallback(content, filters.clone()),
        };

        if response.data_preview.rows.len() > self.max_preview_rows {
            response.data_preview.rows.truncate(self.max_preview_rows);
            response
                .disclaimers
                .push(format!("Data preview limited to {} rows", self.max_preview_rows));
        }

        response.filters_applied = filters.clone();
        response
    }
}

fn parse_document(content: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(strip_code_fence(content)) {
        Ok(Value::Object(document)) => Some(document),
        _ => None,
    }
}

/// Models often wrap JSON in a Markdown fence even when told not to.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) on the opening line.
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

fn from_document(document: &Map<String, Value>, filters: Filters) -> InsightResponse {
    let mut response = InsightResponse::empty(filters);

    if let Some(text) = document.get("insight_text").and_then(Value::as_str) {
        response.insight_text = text.to_string();
    }
    if let Some(sql) = document.get("sql_used").and_then(Value::as_str) {
        response.sql_used = sql.to_string();
    }
    if let Some(Value::Object(preview)) = document.get("data_preview") {
        response.data_preview = data_preview(preview);
    }
    if let Some(Value::Object(viz)) = document.get("viz") {
        response.viz = visualization(viz);
    }
    if let Some(citations) = document.get("doc_citations").and_then(Value::as_array) {
        response.doc_citations = citations.clone();
    }
    if let Some(disclaimers) = document.get("disclaimers").and_then(Value::as_array) {
        response.disclaimers =
            disclaimers.iter().filter_map(Value::as_str).map(str::to_string).collect();
    }

    response
}

fn data_preview(preview: &Map<String, Value>) -> DataPreview {
    let columns = preview
        .get("columns")
        .and_then(Value::as_array)
        .map(|columns| {
            columns
                .iter()
                .map(|column| match column {
                    Value::String(name) => name.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();
    let rows = preview.get("rows").and_then(Value::as_array).cloned().unwrap_or_default();

    DataPreview { columns, rows }
}

fn visualization(viz: &Map<String, Value>) -> Visualization {
    let kind = viz.get("type").and_then(Value::as_str).unwrap_or(DEFAULT_VIZ_TYPE).to_string();
    let spec = match viz.get("spec") {
        Some(spec @ Value::Object(_)) => spec.clone(),
        _ => json!({}),
    };

    Visualization { kind, spec }
}

fn fallback(content: &str, filters: Filters) -> InsightResponse {
    let insight_text = if content.chars().count() > FALLBACK_PREFIX_CHARS {
        let prefix = content.chars().take(FALLBACK_PREFIX_CHARS).collect::<String>();
        format!("{prefix}...")
    } else {
        content.to_string()
    };

    InsightResponse::failure(insight_text, FORMATTING_DISCLAIMER, filters)
}
