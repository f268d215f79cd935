use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use questgen_core::{Context, GenerationError};

use crate::template::{render_value, PromptTemplate};

/// A named prompt: shared fragments, in order, followed by a rendered body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSpec {
    #[serde(default)]
    pub fragments: Vec<String>,
    #[serde(default)]
    pub required_context: Vec<String>,
    pub body: PromptTemplate,
}

impl PromptSpec {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            fragments: Vec::new(),
            required_context: Vec::new(),
            body: PromptTemplate::new(body),
        }
    }

    pub fn fragments<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fragments = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn require<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_context = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// Registry of prompt fragments and templates; the prompt builder.
///
/// [`PromptLibrary::build`] is pure: the same template id and context always
/// give the same text, which is what makes cache fingerprints meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptLibrary {
    #[serde(default)]
    fragments: BTreeMap<String, String>,
    #[serde(default)]
    templates: BTreeMap<String, PromptSpec>,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fragment(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.fragments.insert(name.into(), text.into());
        self
    }

    pub fn with_template(mut self, id: impl Into<String>, spec: PromptSpec) -> Self {
        self.templates.insert(id.into(), spec);
        self
    }

    pub fn contains(&self, template_id: &str) -> bool {
        self.templates.contains_key(template_id)
    }

    pub fn template_ids(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn template(&self, template_id: &str) -> Option<&PromptSpec> {
        self.templates.get(template_id)
    }

    /// Adds `other`'s fragments and templates, replacing same-named entries.
    pub fn merge(&mut self, other: PromptLibrary) {
        self.fragments.extend(other.fragments);
        self.templates.extend(other.templates);
    }

    /// Fails if any template names a fragment the library does not define.
    pub fn check_fragments(&self) -> Result<(), GenerationError> {
        for (id, spec) in &self.templates {
            if let Some(name) = spec
                .fragments
                .iter()
                .find(|name| !self.fragments.contains_key(name.as_str()))
            {
                return Err(GenerationError::Configuration(format!(
                    "prompt template '{id}' references unknown fragment '{name}'"
                )));
            }
        }
        Ok(())
    }

    pub fn build(&self, template_id: &str, context: &Context) -> Result<String, GenerationError> {
        let spec = self.templates.get(template_id).ok_or_else(|| {
            GenerationError::Configuration(format!("unknown prompt template '{template_id}'"))
        })?;

        let missing: Vec<&str> = spec
            .required_context
            .iter()
            .filter(|key| context.get(key.as_str()).map_or(true, |value| value.is_null()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(GenerationError::Configuration(format!(
                "prompt template '{template_id}' is missing context: {}",
                missing.join(", ")
            )));
        }

        let mut sections = Vec::with_capacity(spec.fragments.len() + 2);
        for name in &spec.fragments {
            let fragment = self.fragments.get(name).ok_or_else(|| {
                GenerationError::Configuration(format!(
                    "prompt template '{template_id}' references unknown fragment '{name}'"
                ))
            })?;
            sections.push(fragment.trim().to_string());
        }

        sections.push(spec.body.render(context)?.trim().to_string());

        let used = spec.body.variables()?;
        let extra: Vec<String> = context
            .iter()
            .filter(|(key, value)| !value.is_null() && !used.iter().any(|name| name == *key))
            .map(|(key, value)| format!("- {key}: {}", render_value(value)))
            .collect();
        if !extra.is_empty() {
            sections.push(format!("Additional context:\n{}", extra.join("\n")));
        }

        Ok(sections.join("\n\n"))
    }

    /// Built-in placeholder prompts for quests, courses and badges.
    pub fn builtin() -> Self {
        PromptLibrary::new()
            .with_fragment(
                "philosophy",
                "You design learning experiences for a self-directed education platform. \
                 Learning follows curiosity, connects to the real world, and values the \
                 process of growing over a polished result.",
            )
            .with_fragment(
                "safety",
                "All content must be age-appropriate, inclusive, and safe to attempt \
                 without specialist supervision.",
            )
            .with_fragment(
                "json_output",
                "Respond with a single JSON object and no other text.",
            )
            .with_template(
                "quest_outline",
                PromptSpec::new(
                    "Create a quest about {{topic}} for learners aged {{age_range}}.\n\
                     Return JSON with: title (string), description (string), \
                     difficulty (beginner | intermediate | advanced), xp (integer), and \
                     tasks (non-empty array of objects with title, description, pillar, \
                     xp_value).",
                )
                .fragments(["philosophy", "safety", "json_output"])
                .require(["topic", "age_range"]),
            )
            .with_template(
                "course_outline",
                PromptSpec::new(
                    "Design a course on {{subject}} for learners aged {{age_range}}.\n\
                     Return JSON with: title (string), description (string), \
                     learning_outcomes (array of strings), and quests (non-empty array \
                     of objects with title and summary).",
                )
                .fragments(["philosophy", "safety", "json_output"])
                .require(["subject", "age_range"]),
            )
            .with_template(
                "badge_concept",
                PromptSpec::new(
                    "Propose a badge that celebrates {{theme}}.\n\
                     Return JSON with: name (string), identity_statement (string), \
                     description (string), pillar (string), min_quests (integer), and \
                     criteria (non-empty array of strings).",
                )
                .fragments(["philosophy", "json_output"])
                .require(["theme"]),
            )
    }
}
