use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{GenerationError, ParsedResult};

/// Expected semantic type of a schema field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    OneOf { values: Vec<String> },
    ArrayOf { items: Box<FieldType> },
    Object,
}

impl FieldType {
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldType::OneOf {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn array_of(items: FieldType) -> Self {
        FieldType::ArrayOf {
            items: Box::new(items),
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Number, Value::Number(_)) => true,
            (FieldType::Integer, Value::Number(number)) => {
                number.is_i64() || number.is_u64()
            }
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::OneOf { values }, Value::String(value)) => {
                values.iter().any(|allowed| allowed == value)
            }
            (FieldType::ArrayOf { items }, Value::Array(elements)) => {
                elements.iter().all(|element| items.matches(element))
            }
            (FieldType::Object, Value::Object(_)) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    /// Empty strings and arrays do not satisfy a non-empty required field.
    #[serde(default)]
    pub non_empty: bool,
    /// Characters for strings, items for arrays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            non_empty: false,
            min_len: None,
            max_len: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn array(name: impl Into<String>, items: FieldType) -> Self {
        Self::new(name, FieldType::array_of(items))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }

    pub fn length(mut self, min: Option<usize>, max: Option<usize>) -> Self {
        self.min_len = min;
        self.max_len = max;
        self
    }

    fn has_bounds(&self) -> bool {
        self.min_len.is_some() || self.max_len.is_some()
    }

    fn satisfied_by(&self, value: Option<&Value>) -> bool {
        let Some(value) = value.filter(|value| !value.is_null()) else {
            return false;
        };
        if !self.field_type.matches(value) {
            return false;
        }
        !(self.non_empty && measure(value) == Some(0))
    }

    fn within_bounds(&self, value: &Value) -> bool {
        let Some(length) = measure(value) else {
            return true;
        };
        self.min_len.map_or(true, |min| length >= min)
            && self.max_len.map_or(true, |max| length <= max)
    }
}

fn measure(value: &Value) -> Option<usize> {
    match value {
        Value::String(text) => Some(text.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub id: String,
    pub fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|field| field.required)
    }
}

/// Relative weight of each score component. Only the ratios matter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub completeness: f64,
    pub vocabulary: f64,
    pub length: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            completeness: 0.6,
            vocabulary: 0.2,
            length: 0.2,
        }
    }
}

impl ScoringWeights {
    /// Weights must be finite and non-negative, and completeness must count,
    /// so that a missing required field always lowers the score.
    pub fn validate(&self) -> Result<(), GenerationError> {
        for (name, weight) in [
            ("completeness", self.completeness),
            ("vocabulary", self.vocabulary),
            ("length", self.length),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(GenerationError::Configuration(format!(
                    "{name} weight must be a finite, non-negative number, got {weight}"
                )));
            }
        }
        if self.completeness <= 0.0 {
            return Err(GenerationError::Configuration(
                "completeness weight must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Forbidden and encouraged vocabulary, supplied as policy data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyPolicy {
    pub forbidden: Vec<String>,
    pub encouraged: Vec<String>,
    /// Score lost per forbidden hit.
    pub forbidden_penalty: Option<f64>,
    /// Encouraged hits needed for the full encouraged bonus.
    pub encouraged_target: Option<usize>,
}

impl VocabularyPolicy {
    const DEFAULT_FORBIDDEN_PENALTY: f64 = 0.25;
    const DEFAULT_ENCOURAGED_TARGET: usize = 3;

    pub fn validate(&self) -> Result<(), GenerationError> {
        match self.forbidden_penalty {
            Some(penalty) if !penalty.is_finite() || penalty < 0.0 => {
                Err(GenerationError::Configuration(format!(
                    "forbidden_penalty must be a finite, non-negative number, got {penalty}"
                )))
            }
            _ => Ok(()),
        }
    }

    fn score(&self, forbidden_hits: usize, encouraged_hits: usize) -> f64 {
        let base = if self.encouraged.is_empty() {
            1.0
        } else {
            let target = self
                .encouraged_target
                .unwrap_or(Self::DEFAULT_ENCOURAGED_TARGET)
                .max(1);
            0.5 + 0.5 * (encouraged_hits.min(target) as f64 / target as f64)
        };
        let penalty = self
            .forbidden_penalty
            .unwrap_or(Self::DEFAULT_FORBIDDEN_PENALTY)
            * forbidden_hits as f64;
        (base - penalty).clamp(0.0, 1.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub is_complete: bool,
    pub completeness: f64,
    pub vocabulary: f64,
    pub length: f64,
    pub score: f64,
    pub missing_fields: Vec<String>,
    pub out_of_bounds: Vec<String>,
    pub forbidden_hits: Vec<String>,
    pub encouraged_hits: Vec<String>,
}

/// Reports completeness and a coarse quality score for a parsed result.
///
/// Accepting or rejecting on the score is left to the caller.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityScorer {
    #[serde(default)]
    pub weights: ScoringWeights,
    #[serde(default)]
    pub vocabulary: VocabularyPolicy,
}

impl QualityScorer {
    pub fn new(weights: ScoringWeights, vocabulary: VocabularyPolicy) -> Self {
        Self {
            weights,
            vocabulary,
        }
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        self.weights.validate()?;
        self.vocabulary.validate()
    }

    pub fn score(&self, parsed: ParsedResult, schema: &Schema) -> ParsedResult {
        let report = self.report(&parsed, schema);
        ParsedResult {
            is_complete: report.is_complete,
            quality_score: report.score,
            ..parsed
        }
    }

    pub fn report(&self, parsed: &ParsedResult, schema: &Schema) -> QualityReport {
        let required: Vec<&FieldSpec> = schema.required_fields().collect();
        let missing_fields: Vec<String> = required
            .iter()
            .filter(|field| !field.satisfied_by(parsed.get(&field.name)))
            .map(|field| field.name.clone())
            .collect();
        let completeness = if required.is_empty() {
            1.0
        } else {
            (required.len() - missing_fields.len()) as f64 / required.len() as f64
        };

        let bounded: Vec<(&FieldSpec, &Value)> = schema
            .fields
            .iter()
            .filter(|field| field.has_bounds())
            .filter_map(|field| parsed.get(&field.name).map(|value| (field, value)))
            .collect();
        let out_of_bounds: Vec<String> = bounded
            .iter()
            .filter(|(field, value)| !field.within_bounds(value))
            .map(|(field, _)| field.name.clone())
            .collect();
        let length = if bounded.is_empty() {
            1.0
        } else {
            (bounded.len() - out_of_bounds.len()) as f64 / bounded.len() as f64
        };

        let words = schema_words(parsed, schema);
        let forbidden_hits = matching_terms(&self.vocabulary.forbidden, &words);
        let encouraged_hits = matching_terms(&self.vocabulary.encouraged, &words);
        let vocabulary = self
            .vocabulary
            .score(forbidden_hits.len(), encouraged_hits.len());

        let weights = &self.weights;
        let total = weights.completeness + weights.vocabulary + weights.length;
        let score = if total <= 0.0 {
            completeness
        } else {
            (weights.completeness * completeness
                + weights.vocabulary * vocabulary
                + weights.length * length)
                / total
        };

        QualityReport {
            is_complete: missing_fields.is_empty(),
            completeness,
            vocabulary,
            length,
            score: score.clamp(0.0, 1.0),
            missing_fields,
            out_of_bounds,
            forbidden_hits,
            encouraged_hits,
        }
    }
}

/// Lowercased words (and word n-grams, joined by spaces) from the string
/// content of the schema's fields. Unknown fields are not inspected.
fn schema_words(parsed: &ParsedResult, schema: &Schema) -> Vec<String> {
    let mut words = Vec::new();
    for field in &schema.fields {
        if let Some(value) = parsed.get(&field.name) {
            collect_words(value, &mut words);
        }
    }
    words
}

fn collect_words(value: &Value, words: &mut Vec<String>) {
    match value {
        Value::String(text) => words.extend(
            text.split(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
                .filter(|word| !word.is_empty())
                .map(str::to_lowercase),
        ),
        Value::Array(items) => items.iter().for_each(|item| collect_words(item, words)),
        Value::Object(map) => map.values().for_each(|item| collect_words(item, words)),
        _ => {}
    }
}

/// Terms found in `words`; multi-word terms must appear as a consecutive run.
fn matching_terms(terms: &[String], words: &[String]) -> Vec<String> {
    let mut hits = BTreeSet::new();
    for term in terms {
        let needle: Vec<String> = term.split_whitespace().map(str::to_lowercase).collect();
        if needle.is_empty() {
            continue;
        }
        if words.windows(needle.len()).any(|window| window == needle.as_slice()) {
            hits.insert(term.clone());
        }
    }
    hits.into_iter().collect()
}
