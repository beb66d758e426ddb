// SPDX-License-Identifier: MIT

//! State schema definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Schema constraining the shape of a state container.
///
/// Fields are kept sorted so validation reports errors in a stable order.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
pub struct StateSchema {
    /// Field definitions
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldDef>,
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required field of the given type.
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.insert(
            name.into(),
            FieldDef {
                field_type,
                default: None,
            },
        );
        self
    }

    /// Adds an optional field that falls back to the given default.
    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        field_type: FieldType,
        default: Value,
    ) -> Self {
        self.fields.insert(
            name.into(),
            FieldDef {
                field_type,
                default: Some(default),
            },
        );
        self
    }
}

/// Definition of a single state field
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct FieldDef {
    /// Type of the field
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Default value; fields without one are required
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    /// Checks a value against this field's type.
    ///
    /// Returns `Ok(None)` when the value conforms as-is, `Ok(Some(v))`
    /// when a lossless coercion applies (numeric or boolean strings),
    /// and an error message otherwise.
    pub fn check(&self, key: &str, value: &Value) -> Result<Option<Value>, String> {
        match (&self.field_type, value) {
            (FieldType::String, Value::String(_))
            | (FieldType::Number, Value::Number(_))
            | (FieldType::Boolean, Value::Bool(_))
            | (FieldType::Array, Value::Array(_))
            | (FieldType::Object, Value::Object(_)) => Ok(None),
            (FieldType::Number, Value::String(text)) => {
                if let Ok(int) = text.trim().parse::<i64>() {
                    return Ok(Some(Value::from(int)));
                }
                if let Ok(float) = text.trim().parse::<f64>() {
                    return Ok(Some(Value::from(float)));
                }
                Err(type_error(key, &self.field_type, value))
            }
            (FieldType::Boolean, Value::String(text)) => match text.trim() {
                "true" => Ok(Some(Value::Bool(true))),
                "false" => Ok(Some(Value::Bool(false))),
                _ => Err(type_error(key, &self.field_type, value)),
            },
            _ => Err(type_error(key, &self.field_type, value)),
        }
    }
}

/// Supported field types
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

fn type_error(key: &str, expected: &FieldType, actual: &Value) -> String {
    format!(
        "Field '{}' expected {}, got {}",
        key,
        expected.as_str(),
        value_type_name(actual)
    )
}

/// Lowercase name of a JSON value's type, for error messages.
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
