//! Typed structured-output contracts
//!
//! An [`OutputSchema`] pairs the JSON schema of a Rust type (generated with
//! `schemars`, shown to the model) with a validator that deserializes the
//! model's answer into that type. Validation runs immediately after a task
//! finishes:
//!
//! 1. extract the JSON object from the raw answer (code fences and
//!    surrounding prose are tolerated)
//! 2. coerce scalar values toward the declared property types
//!    (`"500"` → `500` for integer fields, numbers → strings for string fields)
//! 3. deserialize into the target type and re-serialize the canonical form

use std::sync::Arc;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// The answer could not be turned into the schema's type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SchemaMismatch(pub String);

type Validator = fn(Value) -> Result<Value, serde_json::Error>;

/// Structured output contract for a task
#[derive(Debug, Clone)]
pub struct OutputSchema {
    name: String,
    schema: Arc<Value>,
    validator: Validator,
}

fn validate_as<T: DeserializeOwned + Serialize>(value: Value) -> Result<Value, serde_json::Error> {
    let typed: T = serde_json::from_value(value)?;
    serde_json::to_value(typed)
}

impl OutputSchema {
    /// Contract for the type `T`
    pub fn of<T>() -> Self
    where
        T: JsonSchema + DeserializeOwned + Serialize,
    {
        let full_name = std::any::type_name::<T>();
        let name = full_name.rsplit("::").next().unwrap_or(full_name).to_string();
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();

        Self {
            name,
            schema: Arc::new(schema),
            validator: validate_as::<T>,
        }
    }

    /// Short type name, e.g. `VenueDetails`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// JSON schema document
    pub fn json_schema(&self) -> &Value {
        &self.schema
    }

    /// Validate a raw answer, returning the canonical JSON value
    pub fn validate(&self, raw: &str) -> Result<Value, SchemaMismatch> {
        let mut value = extract_json(raw)?;
        coerce(&mut value, &self.schema);
        (self.validator)(value).map_err(|e| SchemaMismatch(e.to_string()))
    }
}

/// Pull a JSON object out of a model answer
pub fn extract_json(raw: &str) -> Result<Value, SchemaMismatch> {
    let trimmed = strip_code_fence(raw.trim());

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    // Fall back to the outermost {...} span inside surrounding prose
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => {
            match serde_json::from_str::<Value>(&trimmed[start..=end]) {
                Ok(value @ Value::Object(_)) => Ok(value),
                Ok(_) => Err(SchemaMismatch("expected a JSON object".to_string())),
                Err(e) => Err(SchemaMismatch(format!("invalid JSON: {e}"))),
            }
        }
        _ => Err(SchemaMismatch("no JSON object found in output".to_string())),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip an optional language tag such as ```json
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Declared JSON type(s) of a schema node, ignoring `null`
fn declared_types(schema: &Value) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts
            .iter()
            .filter_map(Value::as_str)
            .filter(|t| *t != "null")
            .collect(),
        _ => Vec::new(),
    }
}

/// Nudge scalar values toward the types the schema declares
fn coerce(value: &mut Value, schema: &Value) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    let Value::Object(fields) = value else {
        return;
    };

    normalize_keys(fields, properties);

    for (key, property) in properties {
        if let Some(field) = fields.get_mut(key) {
            coerce_scalar(field, &declared_types(property));
            if field.is_object() {
                coerce(field, property);
            }
        }
    }
}

fn coerce_scalar(field: &mut Value, types: &[&str]) {
    let replacement = match (types.first().copied(), &*field) {
        (Some("integer"), Value::String(s)) => parse_integer(s).map(Value::from),
        (Some("integer"), Value::Number(n)) if n.as_i64().is_none() => n
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| Value::from(f as i64)),
        (Some("number"), Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok().map(Value::from),
        (Some("string"), Value::Number(n)) => Some(Value::String(n.to_string())),
        (Some("string"), Value::Bool(b)) => Some(Value::String(b.to_string())),
        (Some("boolean"), Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(Value::Bool(true)),
            "false" | "no" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    };

    if let Some(replacement) = replacement {
        *field = replacement;
    }
}

/// Parse "500", "1,200" or "500 people" into an integer
fn parse_integer(text: &str) -> Option<i64> {
    let digits: String = text
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '-')
        .filter(|c| *c != ',')
        .collect();
    digits.parse().ok()
}

/// Map keys that differ only by case/spacing ("Booking Status") onto schema keys
fn normalize_keys(fields: &mut Map<String, Value>, properties: &Map<String, Value>) {
    let canonical = |key: &str| {
        key.chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase()
    };

    for expected in properties.keys() {
        if fields.contains_key(expected) {
            continue;
        }
        let wanted = canonical(expected.as_str());
        let found = fields.keys().find(|k| canonical(k.as_str()) == wanted).cloned();
        if let Some(found) = found {
            if let Some(value) = fields.remove(&found) {
                fields.insert(expected.clone(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
    struct Booking {
        name: String,
        capacity: i64,
        confirmed: bool,
    }

    fn schema() -> OutputSchema {
        OutputSchema::of::<Booking>()
    }

    #[test]
    fn test_schema_name_and_document() {
        let schema = schema();
        assert_eq!(schema.name(), "Booking");
        let properties = schema.json_schema()["properties"].as_object().unwrap();
        assert!(properties.contains_key("capacity"));
    }

    #[test]
    fn test_validate_plain_json() {
        let value = schema()
            .validate(r#"{"name": "Pier 27", "capacity": 800, "confirmed": true}"#)
            .unwrap();
        assert_eq!(value["capacity"], 800);
    }

    #[test]
    fn test_validate_fenced_json_with_coercion() {
        let raw = "Here is the venue:\n```json\n{\"name\": \"Pier 27\", \"capacity\": \"1,200 guests\", \"confirmed\": \"yes\"}\n```";
        let value = schema().validate(raw).unwrap();
        assert_eq!(value["capacity"], 1200);
        assert_eq!(value["confirmed"], true);
    }

    #[test]
    fn test_validate_prose_wrapped_json() {
        let raw = "Final answer: {\"Name\": \"Fort Mason\", \"capacity\": 300.0, \"confirmed\": false} Thanks!";
        let value = schema().validate(raw).unwrap();
        assert_eq!(value["name"], "Fort Mason");
        assert_eq!(value["capacity"], 300);
    }

    #[test]
    fn test_validate_rejects_missing_field() {
        let err = schema()
            .validate(r#"{"name": "Pier 27", "confirmed": true}"#)
            .unwrap_err();
        assert!(err.0.contains("capacity"));
    }

    #[test]
    fn test_validate_rejects_uncoercible_value() {
        let err = schema()
            .validate(r#"{"name": "Pier 27", "capacity": "lots", "confirmed": true}"#)
            .unwrap_err();
        assert!(err.0.contains("invalid type"));
    }

    #[test]
    fn test_extract_json_without_object() {
        assert!(extract_json("I could not find a venue.").is_err());
        assert!(extract_json("[1, 2, 3]").is_err());
    }
}
