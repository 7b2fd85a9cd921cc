use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller filters after validation. Everything the model sees and everything
/// echoed back in `filters_applied` goes through this shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    pub time: TimeFilter,
    pub place: PlaceFilter,
    pub extra: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFilter {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceFilter {
    pub state: Option<String>,
    pub district: Option<String>,
    pub ward: Option<String>,
    pub zone: Option<String>,
}

impl Filters {
    /// Builds filters from untrusted request JSON. Unknown keys are dropped,
    /// blank values are dropped and scalars are stringified.
    pub fn from_raw(raw: &Value) -> Self {
        let mut filters = Self::default();

        if let Some(time) = raw.get("time").and_then(Value::as_object) {
            filters.time.from = time.get("from").and_then(filter_text);
            filters.time.to = time.get("to").and_then(filter_text);
        }

        if let Some(place) = raw.get("place").and_then(Value::as_object) {
            filters.place.state = place.get("state").and_then(filter_text);
            filters.place.district = place.get("district").and_then(filter_text);
            filters.place.ward = place.get("ward").and_then(filter_text);
            filters.place.zone = place.get("zone").and_then(filter_text);
        }

        if let Some(extra) = raw.get("extra").and_then(Value::as_object) {
            filters.extra = extra
                .iter()
                .filter_map(|(key, value)| filter_text(value).map(|text| (key.clone(), text)))
                .collect();
        }

        filters
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn filter_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        Value::Array(items) if items.is_empty() => None,
        Value::Object(fields) if fields.is_empty() => None,
        other => Some(other.to_string()),
    }
}
