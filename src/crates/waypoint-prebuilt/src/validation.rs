//! JSON-schema validation of human-supplied values
//!
//! Resume values come from people (or UIs built by other people) and may be
//! malformed. [`ResumeValidator`] checks them against a JSON schema before a
//! node acts on them, optionally substituting a fallback value.

use jsonschema::JSONSchema;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::error::{PrebuiltError, Result};

/// Validate `value` against `schema`, collecting every violation
pub fn validate_against_schema(value: &Value, schema: &Value) -> Result<()> {
    let compiled =
        JSONSchema::compile(schema).map_err(|e| PrebuiltError::Schema(e.to_string()))?;
    check(&compiled, value).map_err(|errors| PrebuiltError::InvalidInput(errors.join("; ")))
}

fn check(schema: &JSONSchema, value: &Value) -> std::result::Result<(), Vec<String>> {
    match schema.validate(value) {
        Ok(()) => Ok(()),
        Err(errors) => Err(errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect()),
    }
}

/// Schema-checked resume values with an optional fallback
#[derive(Clone)]
pub struct ResumeValidator {
    schema: Value,
    compiled: Arc<JSONSchema>,
    fallback: Option<Value>,
}

impl ResumeValidator {
    /// Compile `schema`; fails when it is not a valid JSON schema
    pub fn new(schema: Value) -> Result<Self> {
        let compiled =
            JSONSchema::compile(&schema).map_err(|e| PrebuiltError::Schema(e.to_string()))?;
        Ok(Self {
            schema,
            compiled: Arc::new(compiled),
            fallback: None,
        })
    }

    /// Schema for review responses: `{action?: string, data?: any}`
    pub fn review_response() -> Result<Self> {
        Self::new(json!({
            "type": "object",
            "properties": {
                "action": {"type": "string"},
                "data": {}
            }
        }))
    }

    /// Use `fallback` instead of failing when a value is invalid
    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Return `value` if it matches, the fallback if one is set, else an error
    pub fn validate(&self, value: Value) -> Result<Value> {
        match check(&self.compiled, &value) {
            Ok(()) => Ok(value),
            Err(errors) => match &self.fallback {
                Some(fallback) => {
                    warn!(errors = ?errors, "Resume value rejected, using fallback");
                    Ok(fallback.clone())
                }
                None => Err(PrebuiltError::InvalidReview(errors.join("; "))),
            },
        }
    }
}

impl fmt::Debug for ResumeValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeValidator")
            .field("schema", &self.schema)
            .field("fallback", &self.fallback)
            .finish()
    }
}
