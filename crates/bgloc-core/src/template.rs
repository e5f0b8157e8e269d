use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use crate::model::LocationRecord;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("location serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("rendered payload is not a JSON object")]
    NotAnObject,
}

/// Maps a location onto the wire payload the endpoint expects.
pub trait PayloadTemplate: Send + Sync + fmt::Debug {
    fn render(&self, location: &LocationRecord) -> Result<Value, TemplateError>;
}

/// Serializes the record as-is (camelCase keys).
#[derive(Clone, Debug, Default)]
pub struct DefaultTemplate;

impl PayloadTemplate for DefaultTemplate {
    fn render(&self, location: &LocationRecord) -> Result<Value, TemplateError> {
        let v = serde_json::to_value(location)?;
        if !v.is_object() {
            return Err(TemplateError::NotAnObject);
        }
        Ok(v)
    }
}

/// Output key -> placeholder (`@latitude`, `@time`, ...). Values that are not
/// a known placeholder are emitted verbatim as strings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldMapTemplate {
    fields: BTreeMap<String, String>,
}

impl FieldMapTemplate {
    pub fn new(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    fn resolve(location: &LocationRecord, placeholder: &str) -> Value {
        let v = match placeholder {
            "@id" => location.id.map(|id| Value::from(id.0)),
            "@time" => Some(Value::from(location.recorded_at_ms)),
            "@latitude" => Some(Value::from(location.latitude)),
            "@longitude" => Some(Value::from(location.longitude)),
            "@speed" => location.speed.map(Value::from),
            "@bearing" => location.bearing.map(Value::from),
            "@accuracy" => location.accuracy.map(Value::from),
            "@altitude" => location.altitude.map(Value::from),
            "@provider" => location.provider.clone().map(Value::from),
            "@position" => location.position.clone().map(Value::from),
            "@direction" => location.direction.clone().map(Value::from),
            "@estimateMiles" => location.estimate_miles.map(Value::from),
            other => return Value::from(other),
        };
        v.unwrap_or(Value::Null)
    }
}

impl PayloadTemplate for FieldMapTemplate {
    fn render(&self, location: &LocationRecord) -> Result<Value, TemplateError> {
        let mut out = Map::new();
        for (key, placeholder) in &self.fields {
            out.insert(key.clone(), Self::resolve(location, placeholder));
        }
        Ok(Value::Object(out))
    }
}
