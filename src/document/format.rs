//! Document file formats

use serde_json::Value;
use std::path::Path;

/// Serialization format of a document file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Toml,
}

impl Format {
    /// Format implied by a file extension; anything but `.toml` is JSON
    pub fn of(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Format::Toml,
            _ => Format::Json,
        }
    }

    pub fn parse(self, contents: &str) -> Result<Value, String> {
        match self {
            Format::Json => {
                serde_json::from_str(contents).map_err(|e| format!("JSON parse error: {}", e))
            }
            Format::Toml => toml::from_str::<toml::Value>(contents)
                .map(toml_to_json)
                .map_err(|e| format!("TOML parse error: {}", e)),
        }
    }
}

/// Convert a TOML value into the JSON value model
pub fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => {
            Value::Object(table.into_iter().map(|(k, v)| (k, toml_to_json(v))).collect())
        }
    }
}
