//! Stream schemas and schema-aware record coercion

use crate::Record;
use serde_json::Value;

/// JSON-schema description of one stream's columns
#[derive(Debug, Clone)]
pub struct StreamSchema {
    raw: Value,
    properties: serde_json::Map<String, Value>,
}

impl StreamSchema {
    /// Build a schema from a JSON-schema object with a `properties` map
    pub fn from_value(raw: Value) -> Result<Self, SchemaError> {
        let properties = raw
            .get("properties")
            .and_then(Value::as_object)
            .cloned()
            .ok_or(SchemaError::MissingProperties)?;
        if properties.is_empty() {
            return Err(SchemaError::Empty);
        }
        Ok(Self { raw, properties })
    }

    /// Column names in schema order
    pub fn column_names(&self) -> Vec<&str> {
        self.properties().keys().map(String::as_str).collect()
    }

    /// Whether the schema defines the named column
    pub fn has_column(&self, name: &str) -> bool {
        self.properties().contains_key(name)
    }

    /// Declared JSON type of a column (the first non-null entry of a type
    /// union, e.g. `["null", "integer"]` yields `integer`)
    pub fn column_type(&self, name: &str) -> Option<&str> {
        let ty = self.properties().get(name)?.get("type")?;
        match ty {
            Value::String(s) => Some(s.as_str()),
            Value::Array(arr) => arr
                .iter()
                .filter_map(Value::as_str)
                .find(|s| *s != "null"),
            _ => None,
        }
    }

    /// The raw JSON-schema value, as emitted in SCHEMA messages
    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    fn properties(&self) -> &serde_json::Map<String, Value> {
        &self.properties
    }
}

/// Schema construction errors
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Schema object carried no `properties` map
    #[error("schema has no properties object")]
    MissingProperties,

    /// Schema declared zero columns
    #[error("schema declares no columns")]
    Empty,
}

/// Coerces raw string-valued records into schema-typed values before emission
pub trait SchemaCoercer: Send + Sync {
    /// Coerce one record against the stream schema
    fn coerce(&self, schema: &StreamSchema, record: Record) -> Record;
}

/// Default coercion: parses integers, numbers, and booleans from the raw
/// cell strings per the declared column type; leaves nulls and unparseable
/// cells untouched so the sink still sees the source value.
#[derive(Debug, Default)]
pub struct DefaultCoercer;

impl SchemaCoercer for DefaultCoercer {
    fn coerce(&self, schema: &StreamSchema, record: Record) -> Record {
        record
            .into_iter()
            .map(|(name, value)| {
                let coerced = coerce_cell(schema.column_type(&name), value);
                (name, coerced)
            })
            .collect()
    }
}

fn coerce_cell(column_type: Option<&str>, value: Value) -> Value {
    let Value::String(s) = &value else {
        return value;
    };
    match column_type {
        Some("integer") => s
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or(value),
        Some("number") => s
            .parse::<f64>()
            .ok()
            .and_then(|n| serde_json::Number::from_f64(n).map(Value::Number))
            .unwrap_or(value),
        Some("boolean") => match s.as_str() {
            "true" | "TRUE" | "True" => Value::Bool(true),
            "false" | "FALSE" | "False" => Value::Bool(false),
            _ => value,
        },
        _ => value,
    }
}
