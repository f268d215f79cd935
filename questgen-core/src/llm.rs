use serde::{Deserialize, Serialize};

use crate::ProviderError;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Overrides the provider's default model when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature,
            max_output_tokens: None,
            model: None,
        }
    }
}

/// Token consumption reported by the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Completion {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            finish_reason: None,
            usage: None,
        }
    }
}

/// One call to an external text-generation API. Implementations classify their
/// failures through [`ProviderError::kind`] so the retry loop can tell transient
/// failures from fatal ones.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync + 'static {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;
}

#[async_trait::async_trait]
impl<T> TextGenerator for std::sync::Arc<T>
where
    T: TextGenerator + ?Sized,
{
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        (**self).complete(request).await
    }
}
