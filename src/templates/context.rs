//! Render context for one record.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::records::RecordRow;

/// Aliases that expose the whole record, e.g. `{{ h["First Name"] }}`.
pub const RECORD_ALIASES: [&str; 2] = ["h", "header"];
/// System namespace key.
pub const SYSTEM_KEY: &str = "s";

/// Values under the `s` key.
#[derive(Debug, Clone, Serialize)]
pub struct SystemNamespace {
    /// Absolute folder of the template, with a trailing separator, for linking assets.
    pub path: String,
    /// Milliseconds since the Unix epoch at bind time.
    pub timestamp: i64,
    /// Extra keys from the template's settings file.
    pub settings: Value,
}

/// Variables visible to template expressions.
///
/// Reserved keys are set first; a record field with the same name never replaces them and
/// stays reachable through the record aliases.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    values: Map<String, Value>,
}

impl RenderContext {
    pub fn new(record: &RecordRow, system: SystemNamespace) -> Self {
        let mut values = Map::new();
        let whole = serde_json::to_value(&record.fields).unwrap_or(Value::Null);

        for alias in RECORD_ALIASES {
            values.insert(alias.to_string(), whole.clone());
        }
        values.insert(
            SYSTEM_KEY.to_string(),
            serde_json::to_value(system).unwrap_or(Value::Null),
        );

        for (key, value) in &record.fields {
            if values.contains_key(key) {
                log::debug!("Record field '{}' shadowed by a reserved key", key);
                continue;
            }
            values.insert(key.clone(), Value::String(value.clone()));
        }

        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn to_tera(&self) -> tera::Context {
        let mut context = tera::Context::new();
        for (key, value) in &self.values {
            context.insert(key.as_str(), value);
        }
        context
    }
}
