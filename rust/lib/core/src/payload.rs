//! Mutation payload preparation.
//!
//! Form values arrive loosely typed: blanks as `""`, references as numeric
//! strings, numbers, or whole objects. Before anything goes on the wire,
//! blanks are stripped and reference fields are reduced to numeric id
//! arrays.

use serde_json::{Map, Value};

/// Fields that hold id references on most resources.
pub const REFERENCE_FIELDS: &[&str] = &["assigned_to", "contacts", "teams"];

/// Field that receives the current profile on record creation.
pub const ASSIGNEE_FIELD: &str = "assigned_to";

/// Reduce a single reference to a numeric id.
///
/// `""`, `null` and non-numeric strings give `None`; `"42"` and `42` give
/// `Some(42)`; an object is reduced through its `id` field.
pub fn normalize_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Object(obj) => obj.get("id").and_then(normalize_id),
        _ => None,
    }
}

/// Reduce a reference collection to numeric ids, dropping entries that do
/// not resolve. A missing value gives an empty array; a scalar is treated
/// as a one-element array. Applying it to its own output is a no-op.
pub fn normalize_id_array(value: Option<&Value>) -> Vec<i64> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(normalize_id).collect(),
        Some(other) => normalize_id(other).into_iter().collect(),
    }
}

/// Remove every field whose value is the empty string.
pub fn strip_empty(map: &mut Map<String, Value>) {
    map.retain(|_, v| v.as_str() != Some(""));
}

/// Whether a form is creating a record or editing an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Update,
}

/// A partial record headed for a create/update call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Only JSON objects make payloads.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Build the payload a form submits.
    ///
    /// Blank fields are dropped. New records with no assignee are assigned
    /// to `profile_id` when one is known; updates never are.
    pub fn from_form(mut form: Map<String, Value>, mode: FormMode, profile_id: Option<&str>) -> Self {
        strip_empty(&mut form);
        if mode == FormMode::Create {
            let unassigned = match form.get(ASSIGNEE_FIELD) {
                None | Some(Value::Null) => true,
                Some(Value::Array(items)) => items.is_empty(),
                Some(_) => false,
            };
            if let Some(profile) = profile_id.map(str::trim).filter(|p| !p.is_empty()) {
                if unassigned {
                    form.insert(
                        ASSIGNEE_FIELD.to_string(),
                        Value::Array(vec![Value::String(profile.to_string())]),
                    );
                }
            }
        }
        Self(form)
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// The wire body: blanks stripped, `reference_fields` that are present
    /// rewritten as numeric id arrays.
    pub fn prepare(&self, reference_fields: &[&str]) -> Value {
        let mut body = self.0.clone();
        strip_empty(&mut body);
        for field in reference_fields {
            if let Some(value) = body.get(*field) {
                let ids = normalize_id_array(Some(value));
                body.insert(
                    field.to_string(),
                    Value::Array(ids.into_iter().map(Value::from).collect()),
                );
            }
        }
        Value::Object(body)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
