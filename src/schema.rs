//! JSON-schema to runtime validator: a small utility used by leaf LLM steps
//! to validate decoded JSON against a schema fragment. Not a step itself,
//! and implements just enough of JSON Schema to be useful:
//! `object`/`array`/scalar types, `required`, and nested
//! `properties`/`items`. Unsupported schema shapes fall back to "any".

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error("at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("at {path}: missing required field '{field}'")]
    MissingField { path: String, field: String },
}

#[derive(Debug, Clone)]
pub enum SchemaType {
    Object {
        properties: Vec<(String, SchemaType)>,
        required: Vec<String>,
    },
    Array(Box<SchemaType>),
    String,
    Number,
    Boolean,
    Any,
}

impl SchemaType {
    pub fn from_json_schema(schema: &Value) -> Result<Self, SchemaError> {
        let obj = schema
            .as_object()
            .ok_or_else(|| SchemaError::InvalidSchema("schema must be an object".to_string()))?;

        let type_name = obj.get("type").and_then(Value::as_str).unwrap_or("any");

        match type_name {
            "object" => {
                let required: Vec<String> = obj
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();

                let properties = obj
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| {
                        props
                            .iter()
                            .map(|(name, sub)| Ok((name.clone(), SchemaType::from_json_schema(sub)?)))
                            .collect::<Result<Vec<_>, SchemaError>>()
                    })
                    .transpose()?
                    .unwrap_or_default();

                Ok(SchemaType::Object { properties, required })
            }
            "array" => {
                let items = obj
                    .get("items")
                    .map(SchemaType::from_json_schema)
                    .transpose()?
                    .unwrap_or(SchemaType::Any);
                Ok(SchemaType::Array(Box::new(items)))
            }
            "string" => Ok(SchemaType::String),
            "number" | "integer" => Ok(SchemaType::Number),
            "boolean" => Ok(SchemaType::Boolean),
            _ => Ok(SchemaType::Any),
        }
    }

    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        self.validate_at("$", value)
    }

    fn validate_at(&self, path: &str, value: &Value) -> Result<(), SchemaError> {
        match self {
            SchemaType::Any => Ok(()),
            SchemaType::String => expect(path, "string", value, Value::is_string),
            SchemaType::Number => expect(path, "number", value, Value::is_number),
            SchemaType::Boolean => expect(path, "boolean", value, Value::is_boolean),
            SchemaType::Array(items) => {
                let arr = value.as_array().ok_or_else(|| SchemaError::TypeMismatch {
                    path: path.to_string(),
                    expected: "array".to_string(),
                    found: type_name_of(value),
                })?;
                for (i, item) in arr.iter().enumerate() {
                    items.validate_at(&format!("{path}[{i}]"), item)?;
                }
                Ok(())
            }
            SchemaType::Object { properties, required } => {
                let obj = value.as_object().ok_or_else(|| SchemaError::TypeMismatch {
                    path: path.to_string(),
                    expected: "object".to_string(),
                    found: type_name_of(value),
                })?;

                for field in required {
                    if !obj.contains_key(field) {
                        return Err(SchemaError::MissingField {
                            path: path.to_string(),
                            field: field.clone(),
                        });
                    }
                }

                for (name, sub_schema) in properties {
                    if let Some(sub_value) = obj.get(name) {
                        sub_schema.validate_at(&format!("{path}.{name}"), sub_value)?;
                    }
                }

                Ok(())
            }
        }
    }
}

fn expect(path: &str, expected: &str, value: &Value, check: fn(&Value) -> bool) -> Result<(), SchemaError> {
    if check(value) {
        Ok(())
    } else {
        Err(SchemaError::TypeMismatch {
            path: path.to_string(),
            expected: expected.to_string(),
            found: type_name_of(value),
        })
    }
}

fn type_name_of(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
    .to_string()
}
