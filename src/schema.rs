use std::fmt;

use jsonschema::error::ValidationErrorKind;
use jsonschema::{validator_for, ValidationError, Validator};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
#[error("Schema compile error: {0}")]
pub struct SchemaCompileError(String);

/// A single schema violation at a JSON Pointer path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{path}: {}", self.message)
    }
}

/// Every violation found in one input, ordered by path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", render(.violations))]
pub struct ValidationFailure {
    pub violations: Vec<Violation>,
}

fn render(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A tool input schema compiled once and reused for every call.
#[derive(Debug, Clone)]
pub struct InputSchema {
    schema: Value,
    validator: Validator,
}

impl InputSchema {
    /// Compile `schema` (draft 2020-12 unless it declares `$schema`).
    pub fn compile(schema: Value) -> Result<Self, SchemaCompileError> {
        let validator = validator_for(&schema).map_err(|e| SchemaCompileError(e.to_string()))?;
        Ok(Self { schema, validator })
    }

    pub fn as_value(&self) -> &Value {
        &self.schema
    }

    /// Validate `input`.
    ///
    /// Defaults declared under `properties` are filled in first, then every
    /// keyword is checked and all violations are collected. The returned
    /// value is the input with defaults applied, ready for typed
    /// deserialization.
    pub fn validate(&self, input: Value) -> Result<Value, ValidationFailure> {
        let mut value = input;
        apply_defaults(&self.schema, &mut value);

        let mut violations: Vec<Violation> =
            self.validator.iter_errors(&value).map(|e| violation(&e)).collect();
        if violations.is_empty() {
            return Ok(value);
        }
        violations.sort_by(|a, b| a.path.cmp(&b.path));
        Err(ValidationFailure { violations })
    }
}

/// A missing required property is reported at the property's own path.
fn violation(error: &ValidationError<'_>) -> Violation {
    let mut path = error.instance_path().as_str().to_string();
    if let ValidationErrorKind::Required { property: Value::String(name) } = error.kind() {
        path.push('/');
        path.push_str(&name.replace('~', "~0").replace('/', "~1"));
    }
    Violation {
        path,
        message: error.to_string(),
    }
}

fn apply_defaults(schema: &Value, value: &mut Value) {
    match value {
        Value::Object(map) => {
            let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
                return;
            };
            for (name, prop_schema) in properties {
                match map.get_mut(name) {
                    Some(child) => apply_defaults(prop_schema, child),
                    None => {
                        if let Some(default) = prop_schema.get("default") {
                            map.insert(name.clone(), default.clone());
                        }
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for item in items {
                    apply_defaults(item_schema, item);
                }
            }
        }
        _ => {}
    }
}
