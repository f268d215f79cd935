//! Content kinds the platform generates, with their schemas and typed shapes.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use questgen_core::{FieldSpec, FieldType, GenerationError, ParsedResult, Schema};

pub const PILLARS: [&str; 5] = ["stem", "arts", "communication", "wellness", "civics"];
pub const DIFFICULTIES: [&str; 3] = ["beginner", "intermediate", "advanced"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    QuestOutline,
    CourseOutline,
    BadgeConcept,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [
        ContentKind::QuestOutline,
        ContentKind::CourseOutline,
        ContentKind::BadgeConcept,
    ];

    pub fn template_id(&self) -> &'static str {
        match self {
            ContentKind::QuestOutline => "quest_outline",
            ContentKind::CourseOutline => "course_outline",
            ContentKind::BadgeConcept => "badge_concept",
        }
    }

    pub fn from_template_id(template_id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.template_id() == template_id)
    }

    pub fn schema(&self) -> Schema {
        match self {
            ContentKind::QuestOutline => Schema::new(self.template_id())
                .field(FieldSpec::string("title").required().non_empty().length(Some(3), Some(120)))
                .field(FieldSpec::string("description").required().non_empty().length(None, Some(2000)))
                .field(FieldSpec::new("difficulty", FieldType::one_of(DIFFICULTIES)).required())
                .field(FieldSpec::integer("xp").required())
                .field(
                    FieldSpec::array("tasks", FieldType::Object)
                        .required()
                        .non_empty()
                        .length(None, Some(12)),
                ),
            ContentKind::CourseOutline => Schema::new(self.template_id())
                .field(FieldSpec::string("title").required().non_empty().length(Some(3), Some(120)))
                .field(FieldSpec::string("description").required().non_empty().length(None, Some(3000)))
                .field(
                    FieldSpec::array("learning_outcomes", FieldType::String)
                        .required()
                        .non_empty(),
                )
                .field(
                    FieldSpec::array("quests", FieldType::Object)
                        .required()
                        .non_empty()
                        .length(None, Some(20)),
                ),
            ContentKind::BadgeConcept => Schema::new(self.template_id())
                .field(FieldSpec::string("name").required().non_empty().length(Some(3), Some(80)))
                .field(FieldSpec::string("identity_statement").required().non_empty().length(None, Some(200)))
                .field(FieldSpec::string("description").required().non_empty())
                .field(FieldSpec::new("pillar", FieldType::one_of(PILLARS)).required())
                .field(FieldSpec::integer("min_quests").required())
                .field(
                    FieldSpec::array("criteria", FieldType::String)
                        .required()
                        .non_empty(),
                ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pillar {
    Stem,
    Arts,
    Communication,
    Wellness,
    Civics,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub pillar: Pillar,
    #[serde(default)]
    pub xp_value: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestOutline {
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub xp: u32,
    pub tasks: Vec<QuestTask>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseQuest {
    pub title: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CourseOutline {
    pub title: String,
    pub description: String,
    pub learning_outcomes: Vec<String>,
    pub quests: Vec<CourseQuest>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BadgeConcept {
    pub name: String,
    pub identity_statement: String,
    pub description: String,
    pub pillar: Pillar,
    pub min_quests: u32,
    pub criteria: Vec<String>,
}

/// A typed catalog output that can be read back from a scored result.
pub trait CatalogItem: DeserializeOwned {
    const KIND: ContentKind;

    /// Fails with a validation error unless the result is complete.
    fn from_result(result: &ParsedResult) -> Result<Self, GenerationError> {
        if !result.is_complete {
            return Err(GenerationError::Validation {
                reason: format!(
                    "{} result is incomplete",
                    Self::KIND.template_id()
                ),
                raw_response: None,
                partial: Some(Box::new(result.clone())),
            });
        }
        result.deserialize()
    }
}

impl CatalogItem for QuestOutline {
    const KIND: ContentKind = ContentKind::QuestOutline;
}

impl CatalogItem for CourseOutline {
    const KIND: ContentKind = ContentKind::CourseOutline;
}

impl CatalogItem for BadgeConcept {
    const KIND: ContentKind = ContentKind::BadgeConcept;
}
