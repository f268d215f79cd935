use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};

use crate::GenerationError;

pub type Value = serde_json::Value;

/// Ordered so that prompt rendering and fingerprints are stable.
pub type Context = BTreeMap<String, Value>;

pub trait IntoValue {
    fn into_value(self) -> Result<Value, GenerationError>;
}

pub trait TryFromValue: Sized {
    fn try_from_value(value: Value) -> Result<Self, GenerationError>;
}

impl<T> IntoValue for T
where
    T: Serialize,
{
    fn into_value(self) -> Result<Value, GenerationError> {
        serde_json::to_value(self)
            .map_err(|err| GenerationError::Configuration(format!("unserializable value: {err}")))
    }
}

impl<T> TryFromValue for T
where
    T: DeserializeOwned,
{
    fn try_from_value(value: Value) -> Result<Self, GenerationError> {
        serde_json::from_value(value).map_err(|err| GenerationError::validation(err.to_string()))
    }
}

/// Builds a [`Context`] from `key => value` pairs.
#[macro_export]
macro_rules! context {
    () => { $crate::Context::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut context = $crate::Context::new();
        $( context.insert(::std::string::String::from($key), $crate::Value::from($value)); )+
        context
    }};
}
