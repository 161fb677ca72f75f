use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Key under which per-field numeric history is nested inside the raw state.
pub const HISTORY_KEY: &str = "history";

/// Caller-supplied health inputs for a single request.
///
/// Every key is optional. A missing key means no rule fires for it, so partial
/// input is the normal case rather than an error. Trend history lives under
/// `history`, keyed by the same field names: `{"ldl": 145, "history": {"ldl": [170, 160]}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct RawHealthState(BTreeMap<String, Value>);

impl RawHealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map.into_iter().collect()),
            _ => Self::default(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder form of [`insert`](Self::insert), handy for fixtures.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn with_history(mut self, key: &str, points: &[f64]) -> Self {
        let entry = self
            .0
            .entry(HISTORY_KEY.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(history) = entry {
            history.insert(key.to_string(), Value::from(points.to_vec()));
        }
        self
    }

    /// Merge `other` into `self`; keys in `other` win.
    pub fn merge(&mut self, other: RawHealthState) {
        self.0.extend(other.0);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Presence check that treats `Sleep_Hours` and `sleep_hours` as the same key.
    pub fn contains_key_ignore_case(&self, key: &str) -> bool {
        self.0.keys().any(|k| k.eq_ignore_ascii_case(key))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Present keys in sorted order. The `history` container counts as a key.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Numeric value of a field. Non-numeric values read as absent.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Truthiness of a flag field: `true`, a non-zero number, or a non-empty string.
    pub fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Null) | None => false,
        }
    }

    /// Numeric history for a field, oldest first. Non-numeric points are skipped.
    pub fn history(&self, key: &str) -> Vec<f64> {
        self.0
            .get(HISTORY_KEY)
            .and_then(|h| h.get(key))
            .and_then(Value::as_array)
            .map(|points| points.iter().filter_map(Value::as_f64).collect())
            .unwrap_or_default()
    }
}

impl From<BTreeMap<String, Value>> for RawHealthState {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

/// Render a reading exactly as given; whole numbers print without `.0`.
pub fn format_number(value: f64) -> String {
    value.to_string()
}
