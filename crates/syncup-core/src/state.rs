//! The state record threaded through every node of a run.
//!
//! `State` is an open key-value map of JSON values plus an append-only
//! trace and an optional captured failure. Nodes never mutate it directly:
//! they return a [`StateUpdate`] which the executor merges field by field.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SyncupError};
use crate::types::NodeFailure;

/// Mutable, serializable record owned by the executor for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    fields: Map<String, Value>,
    #[serde(default)]
    trace: Vec<String>,
    #[serde(default)]
    error: Option<NodeFailure>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state seeded with the given fields.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    /// Create a state from a JSON object. Anything else is rejected.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self::from_fields(fields)),
            other => Err(SyncupError::Config(format!(
                "initial state must be a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    /// Seed a field (builder style). Only meant for constructing the initial record.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.fields.get(key).and_then(|v| v.as_u64())
    }

    /// Deserialize a field into `T`. Returns `None` when the field is
    /// absent, null, or has the wrong shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.fields.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => serde_json::from_value(v.clone()).ok(),
        }
    }

    /// Like [`get_as`](Self::get_as) but a missing field is an error.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_as(key)
            .ok_or_else(|| SyncupError::MissingField(key.to_string()))
    }

    /// A list of strings, tolerating a missing field.
    pub fn get_strings(&self, key: &str) -> Vec<String> {
        self.get_as::<Vec<String>>(key).unwrap_or_default()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// The last `n` trace entries, oldest first.
    pub fn trace_tail(&self, n: usize) -> &[String] {
        let start = self.trace.len().saturating_sub(n);
        &self.trace[start..]
    }

    pub fn error(&self) -> Option<&NodeFailure> {
        self.error.as_ref()
    }

    /// Record a node failure. The first failure wins.
    pub fn record_failure(&mut self, failure: NodeFailure) {
        if self.error.is_none() {
            self.error = Some(failure);
        }
    }

    /// Merge a partial update: named fields are overwritten, everything
    /// else is left untouched, and trace entries are appended in order.
    pub fn merge(&mut self, update: StateUpdate) {
        for (k, v) in update.fields {
            self.fields.insert(k, v);
        }
        self.trace.extend(update.trace);
    }

    /// Render the whole record as a JSON object (fields, trace, error).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Partial update returned by a node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    fields: Map<String, Value>,
    trace: Vec<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a field.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Overwrite a field with any serializable value.
    pub fn set_serialized<T: Serialize>(self, key: impl Into<String>, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value)?;
        Ok(self.set(key, value))
    }

    /// Append a human-readable trace entry.
    pub fn trace(mut self, entry: impl Into<String>) -> Self {
        self.trace.push(entry.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn trace_entries(&self) -> &[String] {
        &self.trace
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.trace.is_empty()
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
