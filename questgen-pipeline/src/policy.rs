use serde::{Deserialize, Serialize};

use questgen_core::{GenerationError, ParsedResult, RecordStatus};

/// What the pipeline does with a scored result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    NeedsReview,
    Rejected,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::NeedsReview => "needs_review",
            Verdict::Rejected => "rejected",
        }
    }

    pub fn record_status(&self) -> RecordStatus {
        match self {
            Verdict::Accepted => RecordStatus::Accepted,
            Verdict::NeedsReview => RecordStatus::NeedsReview,
            Verdict::Rejected => RecordStatus::Rejected,
        }
    }
}

/// Score thresholds separating accepted, reviewable and rejected content.
///
/// An incomplete result is never accepted, whatever its score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcceptancePolicy {
    pub accept_threshold: f64,
    pub review_threshold: f64,
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self {
            accept_threshold: 0.7,
            review_threshold: 0.4,
        }
    }
}

impl AcceptancePolicy {
    pub fn new(accept_threshold: f64, review_threshold: f64) -> Self {
        Self {
            accept_threshold,
            review_threshold,
        }
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        let in_range = |value: f64| (0.0..=1.0).contains(&value);
        if !in_range(self.accept_threshold) || !in_range(self.review_threshold) {
            return Err(GenerationError::Configuration(
                "acceptance thresholds must be within [0, 1]".to_string(),
            ));
        }
        if self.review_threshold > self.accept_threshold {
            return Err(GenerationError::Configuration(format!(
                "review threshold {} is above accept threshold {}",
                self.review_threshold, self.accept_threshold
            )));
        }
        Ok(())
    }

    pub fn classify(&self, result: &ParsedResult) -> Verdict {
        if result.is_complete && result.quality_score >= self.accept_threshold {
            Verdict::Accepted
        } else if result.quality_score >= self.review_threshold {
            Verdict::NeedsReview
        } else {
            Verdict::Rejected
        }
    }
}

/// How many extra generations a rejected or unparseable response earns, and
/// how much colder each one samples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenerationPolicy {
    pub max_regenerations: u32,
    pub temperature_step: f32,
}

impl Default for RegenerationPolicy {
    fn default() -> Self {
        Self {
            max_regenerations: 1,
            temperature_step: 0.2,
        }
    }
}

impl RegenerationPolicy {
    pub fn disabled() -> Self {
        Self {
            max_regenerations: 0,
            ..Self::default()
        }
    }

    /// Sampling temperature for the given regeneration round, floored at 0.
    pub fn temperature(&self, base: f32, round: u32) -> f32 {
        (base - self.temperature_step * round as f32).max(0.0)
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if !self.temperature_step.is_finite() || self.temperature_step < 0.0 {
            return Err(GenerationError::Configuration(
                "temperature step must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}
