use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::GenerationError;

/// Retry, timeout and sampling settings for one generation call.
///
/// Durations serialize as integer milliseconds (`base_backoff_ms`, ...), which
/// keeps YAML settings files readable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_retries: u32,
    #[serde(rename = "base_backoff_ms", with = "duration_ms")]
    pub base_backoff: Duration,
    #[serde(rename = "max_backoff_ms", with = "duration_ms")]
    pub max_backoff: Duration,
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
    pub temperature: f32,
    /// Overall budget for the call, measured from its start. Once spent, no
    /// further attempts are made.
    #[serde(
        rename = "deadline_ms",
        with = "optional_duration_ms",
        skip_serializing_if = "Option::is_none"
    )]
    pub deadline: Option<Duration>,
    pub jitter: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            timeout: Duration::from_secs(60),
            temperature: 0.7,
            deadline: None,
            jitter: true,
            max_output_tokens: None,
        }
    }
}

impl GenerationConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(GenerationError::Configuration(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if self.timeout.is_zero() {
            return Err(GenerationError::Configuration(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_backoff < self.base_backoff {
            return Err(GenerationError::Configuration(format!(
                "max_backoff ({:?}) is smaller than base_backoff ({:?})",
                self.max_backoff, self.base_backoff
            )));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => super::duration_ms::serialize(duration, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_backoff_bounds() {
        let config = GenerationConfig::default()
            .with_backoff(Duration::from_secs(5), Duration::from_secs(1));
        assert!(matches!(
            config.validate(),
            Err(GenerationError::Configuration(_))
        ));
    }

    #[test]
    fn durations_round_trip_as_milliseconds() {
        let config = GenerationConfig::default().with_deadline(Duration::from_secs(30));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["base_backoff_ms"], 500);
        assert_eq!(json["deadline_ms"], 30_000);

        let parsed: GenerationConfig =
            serde_json::from_value(serde_json::json!({"max_retries": 1, "timeout_ms": 250}))
                .unwrap();
        assert_eq!(parsed.max_retries, 1);
        assert_eq!(parsed.timeout, Duration::from_millis(250));
        assert_eq!(parsed.deadline, None);
        assert_eq!(parsed.base_backoff, Duration::from_millis(500));
    }
}
