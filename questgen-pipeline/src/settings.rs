use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use questgen_core::{GenerationConfig, GenerationError, QualityScorer, DEFAULT_CACHE_CAPACITY};
use questgen_prompt::PromptLibrary;

use crate::{AcceptancePolicy, RegenerationPolicy};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings document: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid settings: {0}")]
    Invalid(#[from] GenerationError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub capacity: usize,
    #[serde(rename = "ttl_secs", with = "duration_secs")]
    pub ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CACHE_CAPACITY,
            ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Everything tunable about the pipeline, typically loaded from YAML:
///
/// ```yaml
/// generation:
///   max_retries: 3
///   base_backoff_ms: 500
///   timeout_ms: 30000
/// acceptance:
///   accept_threshold: 0.75
/// scoring:
///   vocabulary:
///     forbidden: [boring, worksheet]
/// cache:
///   ttl_secs: 600
/// prompt_library: prompts.yaml
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub generation: GenerationConfig,
    pub acceptance: AcceptancePolicy,
    pub regeneration: RegenerationPolicy,
    pub scoring: QualityScorer,
    pub cache: CacheSettings,
    /// Extra prompt templates merged over the built-ins. Relative paths are
    /// resolved against the settings file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_library: Option<PathBuf>,
}

impl PipelineSettings {
    pub fn from_yaml_str(source: &str) -> Result<Self, SettingsError> {
        let settings: PipelineSettings = serde_yaml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_yaml_str(&source)?;
        if let (Some(library), Some(dir)) = (&settings.prompt_library, path.parent()) {
            if library.is_relative() {
                settings.prompt_library = Some(dir.join(library));
            }
        }
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        self.generation.validate()?;
        self.acceptance.validate()?;
        self.regeneration.validate()?;
        self.scoring.validate()?;
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(GenerationError::Configuration(
                "cache capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Built-in prompts, overlaid with `prompt_library` when one is set.
    pub fn prompt_library(&self) -> Result<PromptLibrary, GenerationError> {
        let mut library = PromptLibrary::builtin();
        if let Some(path) = &self.prompt_library {
            library.merge(PromptLibrary::from_yaml_path(path)?);
            library.check_fragments()?;
        }
        Ok(library)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
