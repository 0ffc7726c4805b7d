//! Face Gate - Result Redaction
//!
//! Strips internal-only fields (raw face imagery) from anything that leaves
//! the service. Works on the serialized `serde_json::Value` so it covers every
//! result shape, including nested objects and arrays.

use serde::Serialize;
use serde_json::Value;

use crate::error::ServiceResult;

/// Field names never allowed across the trust boundary
pub const INTERNAL_FIELDS: &[&str] = &["face_image", "faceImage"];

/// Removes internal-only fields at any depth
#[derive(Debug, Clone)]
pub struct ResultRedactor {
    fields: Vec<String>,
}

impl Default for ResultRedactor {
    fn default() -> Self {
        Self {
            fields: INTERNAL_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ResultRedactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redact an additional field name
    pub fn with_field(mut self, name: &str) -> Self {
        self.fields.push(name.to_string());
        self
    }

    /// Strip internal fields in place
    pub fn redact_value(&self, value: &mut Value) {
        match value {
            Value::Object(map) => {
                map.retain(|key, _| !self.fields.iter().any(|f| f == key));
                for child in map.values_mut() {
                    self.redact_value(child);
                }
            }
            Value::Array(items) => {
                for item in items.iter_mut() {
                    self.redact_value(item);
                }
            }
            _ => {}
        }
    }

    /// Serialize `result` and strip internal fields
    pub fn redact<T: Serialize>(&self, result: &T) -> ServiceResult<Value> {
        let mut value = serde_json::to_value(result)?;
        self.redact_value(&mut value);
        Ok(value)
    }
}
