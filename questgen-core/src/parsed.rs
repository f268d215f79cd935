use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Map;

use crate::{GenerationError, TryFromValue, Value};

/// Structured data extracted from one successful model response.
///
/// Fresh out of the extractor a result is unscored: `is_complete` is false and
/// `quality_score` is zero until the validator fills them in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedResult {
    pub fields: Map<String, Value>,
    pub is_complete: bool,
    pub quality_score: f64,
}

impl ParsedResult {
    pub fn unscored(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            is_complete: false,
            quality_score: 0.0,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Deserializes the fields into a typed struct. Unknown fields are ignored
    /// unless `T` denies them.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, GenerationError> {
        T::try_from_value(self.to_value())
    }
}
