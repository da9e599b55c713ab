//! State schema and reducers
//!
//! Graph state is a JSON object. Nodes return **partial** updates; the
//! [`StateSchema`] merges them into the current state one field at a time.
//! Each field can register a [`Reducer`] that decides how a write combines
//! with the existing value. Fields without a reducer are overwritten.
//!
//! | Reducer | Behavior |
//! |---------|----------|
//! | [`OverwriteReducer`] | replace the value (default) |
//! | [`AppendReducer`] | concatenate arrays, push scalars |
//! | [`MergeReducer`] | shallow-merge objects |
//! | [`SumReducer`] | add numbers |
//!
//! ```rust
//! use waypoint_core::state::{AppendReducer, StateSchema};
//! use serde_json::json;
//!
//! let schema = StateSchema::new().with_field("log", AppendReducer);
//!
//! let mut state = json!({"log": ["start"], "status": "idle"});
//! schema.apply(&mut state, &json!({"log": ["ran"], "status": "busy"})).unwrap();
//!
//! assert_eq!(state["log"], json!(["start", "ran"]));
//! assert_eq!(state["status"], "busy");
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while applying state updates
#[derive(Debug, Error)]
pub enum StateError {
    /// State structure is invalid (e.g. not an object)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Reducer encountered incompatible values
    #[error("Reducer error on field '{field}': {message}")]
    ReducerError {
        /// Field being reduced
        field: String,
        /// What went wrong
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Combines the current value of a field with an update
///
/// `current` is `Value::Null` when the field is not yet present. Errors are
/// plain messages; the schema attaches the field name.
pub trait Reducer: Send + Sync {
    fn reduce(&self, current: &Value, update: &Value) -> std::result::Result<Value, String>;

    /// Human-readable name, used in debug output
    fn name(&self) -> &str;
}

/// Replaces the current value with the update
#[derive(Debug, Clone, Copy, Default)]
pub struct OverwriteReducer;

impl Reducer for OverwriteReducer {
    fn reduce(&self, _current: &Value, update: &Value) -> std::result::Result<Value, String> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "overwrite"
    }
}

/// Appends to an array
///
/// - array + array: concatenation
/// - array + scalar: push
/// - null + anything: start a new array
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendReducer;

impl Reducer for AppendReducer {
    fn reduce(&self, current: &Value, update: &Value) -> std::result::Result<Value, String> {
        match (current, update) {
            (Value::Array(curr), Value::Array(upd)) => {
                let mut result = curr.clone();
                result.extend_from_slice(upd);
                Ok(Value::Array(result))
            }
            (Value::Null, Value::Array(upd)) => Ok(Value::Array(upd.clone())),
            (Value::Array(curr), single) => {
                let mut result = curr.clone();
                result.push(single.clone());
                Ok(Value::Array(result))
            }
            (Value::Null, single) => Ok(Value::Array(vec![single.clone()])),
            _ => Err("append requires the current value to be an array".to_string()),
        }
    }

    fn name(&self) -> &str {
        "append"
    }
}

/// Shallow-merges objects; keys of the update win
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeReducer;

impl Reducer for MergeReducer {
    fn reduce(&self, current: &Value, update: &Value) -> std::result::Result<Value, String> {
        match (current, update) {
            (Value::Object(curr), Value::Object(upd)) => {
                let mut result = curr.clone();
                for (key, value) in upd {
                    result.insert(key.clone(), value.clone());
                }
                Ok(Value::Object(result))
            }
            (Value::Null, Value::Object(upd)) => Ok(Value::Object(upd.clone())),
            _ => Err("merge requires object values".to_string()),
        }
    }

    fn name(&self) -> &str {
        "merge"
    }
}

/// Adds numbers, keeping integers exact
#[derive(Debug, Clone, Copy, Default)]
pub struct SumReducer;

impl Reducer for SumReducer {
    fn reduce(&self, current: &Value, update: &Value) -> std::result::Result<Value, String> {
        match (current, update) {
            (Value::Number(a), Value::Number(b)) => {
                if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                    if let Some(sum) = a.checked_add(b) {
                        return Ok(Value::Number(sum.into()));
                    }
                }
                match (a.as_f64(), b.as_f64()) {
                    (Some(a), Some(b)) => serde_json::Number::from_f64(a + b)
                        .map(Value::Number)
                        .ok_or_else(|| "sum is not a finite number".to_string()),
                    _ => Err("cannot add non-numeric values".to_string()),
                }
            }
            (Value::Null, Value::Number(_)) => Ok(update.clone()),
            _ => Err("sum requires numeric values".to_string()),
        }
    }

    fn name(&self) -> &str {
        "sum"
    }
}

/// Field reducers for a graph's state
///
/// Cloning a schema is cheap; reducers are shared.
#[derive(Clone, Default)]
pub struct StateSchema {
    fields: HashMap<String, Arc<dyn Reducer>>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reducer for a field
    pub fn add_field(&mut self, field: impl Into<String>, reducer: impl Reducer + 'static) {
        self.fields.insert(field.into(), Arc::new(reducer));
    }

    /// Builder form of [`add_field`](Self::add_field)
    pub fn with_field(mut self, field: impl Into<String>, reducer: impl Reducer + 'static) -> Self {
        self.add_field(field, reducer);
        self
    }

    /// Reducer registered for a field, if any
    pub fn reducer(&self, field: &str) -> Option<&dyn Reducer> {
        self.fields.get(field).map(|r| r.as_ref())
    }

    /// Merge a partial update into `state`
    ///
    /// `Value::Null` updates are a no-op. Any other non-object update is
    /// rejected, as is a non-object state.
    pub fn apply(&self, state: &mut Value, update: &Value) -> Result<()> {
        if update.is_null() {
            return Ok(());
        }
        if state.is_null() {
            *state = Value::Object(Default::default());
        }

        let state_obj = state
            .as_object_mut()
            .ok_or_else(|| StateError::InvalidState("State must be an object".to_string()))?;
        let update_obj = update.as_object().ok_or_else(|| {
            StateError::InvalidState(format!("Update must be an object, got {}", update))
        })?;

        for (field, value) in update_obj {
            let reduced = match self.fields.get(field) {
                Some(reducer) => {
                    let current = state_obj.get(field).unwrap_or(&Value::Null);
                    reducer
                        .reduce(current, value)
                        .map_err(|message| StateError::ReducerError {
                            field: field.clone(),
                            message,
                        })?
                }
                None => value.clone(),
            };
            state_obj.insert(field.clone(), reduced);
        }

        Ok(())
    }

    /// Names of fields with a registered reducer
    pub fn fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for StateSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for name in self.fields() {
            if let Some(reducer) = self.fields.get(&name) {
                map.entry(&name, &reducer.name());
            }
        }
        map.finish()
    }
}
