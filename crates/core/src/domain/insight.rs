use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::filters::Filters;

pub const DEFAULT_VIZ_TYPE: &str = "generic";

/// The fixed-shape answer returned to callers. Every field is always present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsightResponse {
    pub insight_text: String,
    pub sql_used: String,
    pub data_preview: DataPreview,
    pub viz: Visualization,
    pub doc_citations: Vec<Value>,
    pub filters_applied: Filters,
    pub disclaimers: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataPreview {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    #[serde(rename = "type")]
    pub kind: String,
    pub spec: Value,
}

impl Default for Visualization {
    fn default() -> Self {
        Self { kind: DEFAULT_VIZ_TYPE.to_string(), spec: json!({}) }
    }
}

impl InsightResponse {
    /// An envelope with every field at its documented default.
    pub fn empty(filters: Filters) -> Self {
        Self {
            insight_text: String::new(),
            sql_used: String::new(),
            data_preview: DataPreview::default(),
            viz: Visualization::default(),
            doc_citations: Vec::new(),
            filters_applied: filters,
            disclaimers: Vec::new(),
        }
    }

    /// A human-readable failure envelope. Callers get one of these instead of
    /// a bare error.
    pub fn failure(
        insight_text: impl Into<String>,
        disclaimer: impl Into<String>,
        filters: Filters,
    ) -> Self {
        Self {
            insight_text: insight_text.into(),
            disclaimers: vec![disclaimer.into()],
            ..Self::empty(filters)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::InsightResponse;
    use crate::domain::filters::Filters;

    #[test]
    fn serializes_viz_kind_as_type() {
        let value = serde_json::to_value(InsightResponse::empty(Filters::default()))
            .expect("serializable");

        assert_eq!(value["viz"], json!({"type": "generic", "spec": {}}));
        assert_eq!(value["data_preview"], json!({"columns": [], "rows": []}));
        for field in [
            "insight_text",
            "sql_used",
            "data_preview",
            "viz",
            "doc_citations",
            "filters_applied",
            "disclaimers",
        ] {
            assert!(value.get(field).is_some(), "{field} should always be present");
        }
    }

    #[test]
    fn failure_carries_single_disclaimer() {
        let response = InsightResponse::failure("boom", "Error occurred during analysis", Filters::default());

        assert_eq!(response.insight_text, "boom");
        assert_eq!(response.disclaimers, vec!["Error occurred during analysis".to_string()]);
        assert!(response.sql_used.is_empty());
    }
}
