use std::path::Path;

use questgen_core::GenerationError;

use crate::PromptLibrary;

impl PromptLibrary {
    /// Parses a library document with top-level `fragments` and `templates`
    /// maps. Fragment references are left unresolved; call
    /// [`PromptLibrary::check_fragments`] after merging.
    pub fn from_yaml_str(source: &str) -> Result<Self, GenerationError> {
        serde_yaml::from_str(source)
            .map_err(|e| GenerationError::Configuration(format!("invalid prompt library: {e}")))
    }

    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, GenerationError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            GenerationError::Configuration(format!(
                "failed to read prompt library {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&source)
    }
}
