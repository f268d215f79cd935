use serde::{Deserialize, Serialize};

use crate::{fingerprint, Context, GenerationConfig};

/// A fully specified generation request. Built once and never mutated;
/// regenerations derive a new request through [`GenerationRequest::with_temperature`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    template_id: String,
    context: Context,
    max_retries: u32,
    temperature: f32,
}

impl GenerationRequest {
    pub fn new(template_id: impl Into<String>, context: Context, config: &GenerationConfig) -> Self {
        Self {
            template_id: template_id.into(),
            context,
            max_retries: config.max_retries,
            temperature: config.temperature,
        }
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.template_id, &self.context)
    }

    pub fn with_temperature(&self, temperature: f32) -> Self {
        Self {
            temperature,
            ..self.clone()
        }
    }
}
