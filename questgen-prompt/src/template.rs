use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use questgen_core::{Context, GenerationError, Value};

const PLACEHOLDER: &str = r"\{\{\s*(\w+)\s*\}\}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.template
    }

    /// Placeholder names in order of first appearance, without duplicates.
    pub fn variables(&self) -> Result<Vec<String>, GenerationError> {
        let pattern = placeholder_pattern()?;
        let mut seen = BTreeSet::new();
        Ok(pattern
            .captures_iter(&self.template)
            .map(|caps| caps[1].to_string())
            .filter(|name| seen.insert(name.clone()))
            .collect())
    }

    /// Replaces `{{ name }}` with the context value: strings verbatim, other
    /// values as compact JSON, absent keys as the empty string.
    pub fn render(&self, vars: &Context) -> Result<String, GenerationError> {
        let pattern = placeholder_pattern()?;
        let rendered = pattern.replace_all(&self.template, |caps: &regex::Captures| {
            vars.get(&caps[1]).map(render_value).unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }
}

pub(crate) fn render_value(value: &Value) -> String {
    value
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

fn placeholder_pattern() -> Result<&'static Regex, GenerationError> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(PLACEHOLDER))
        .as_ref()
        .map_err(|e| GenerationError::Configuration(e.to_string()))
}
