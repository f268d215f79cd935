//! Google Gemini `generateContent` client

use std::fmt;
use std::time::Duration;

use reqwest::{header::HeaderMap, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use questgen_core::{
    Completion, CompletionRequest, GenerationError, ProviderError, ProviderErrorKind,
    TextGenerator, TokenUsage,
};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Backstop for a hung connection; per-attempt timeouts are enforced by the
/// retry loop.
const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: SecretString,
    model: String,
    http: Client,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiClient {
    pub fn new(api_key: SecretString, model: impl Into<String>) -> Result<Self, GenerationError> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(GenerationError::Configuration(
                "Gemini API key is empty".to_string(),
            ));
        }
        let model = model.into();
        if model.trim().is_empty() {
            return Err(GenerationError::Configuration(
                "Gemini model name is empty".to_string(),
            ));
        }
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|err| GenerationError::Configuration(format!("http client: {err}")))?;

        Ok(Self {
            base_url: GEMINI_BASE_URL.to_string(),
            api_key,
            model,
            http,
        })
    }

    /// Reads the key from `GEMINI_API_KEY` and uses the default model.
    pub fn from_env() -> Result<Self, GenerationError> {
        let key = std::env::var(GEMINI_API_KEY_ENV).map_err(|_| {
            GenerationError::Configuration(format!("{GEMINI_API_KEY_ENV} is not set"))
        })?;
        Self::new(SecretString::new(key), GEMINI_DEFAULT_MODEL)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Result<Self, GenerationError> {
        let base_url = base_url.into();
        Url::parse(&base_url).map_err(|err| {
            GenerationError::Configuration(format!("invalid Gemini base url '{base_url}': {err}"))
        })?;
        self.base_url = base_url;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn model_name<'a>(&'a self, request_model: Option<&'a str>) -> &'a str {
        let model = request_model
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(self.model.trim());
        model.strip_prefix("models/").unwrap_or(model)
    }

    fn generate_url(&self, request_model: Option<&str>) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model_name(request_model)
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationSettings,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    message: String,
}

fn is_blocked_finish_reason(reason: &str) -> bool {
    matches!(
        reason,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT"
    )
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn classify_send_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::new(ProviderErrorKind::Timeout, err.to_string())
    } else {
        ProviderError::network(err.to_string())
    }
}

/// Maps a non-success response onto a failure kind. Gemini reports a bad key
/// as `400 INVALID_ARGUMENT`, so that case is recognised from the message.
fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> ProviderError {
    let message = serde_json::from_str::<GoogleErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));

    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::new(
            ProviderErrorKind::RateLimited {
                retry_after: parse_retry_after(headers),
            },
            message,
        ),
        StatusCode::REQUEST_TIMEOUT => ProviderError::new(ProviderErrorKind::Timeout, message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::auth(message),
        StatusCode::BAD_REQUEST if message.contains("API key") => ProviderError::auth(message),
        status if status.is_server_error() => ProviderError::server(status.as_u16(), message),
        _ => ProviderError::invalid_request(message),
    }
}

fn into_completion(response: GenerateContentResponse) -> Result<Completion, ProviderError> {
    let usage = response.usage_metadata.map(|usage| TokenUsage {
        prompt_tokens: usage.prompt_token_count,
        completion_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    });

    let Some(candidate) = response.candidates.into_iter().next() else {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(ProviderError::new(
                ProviderErrorKind::Blocked,
                format!("prompt blocked: {reason}"),
            ));
        }
        return Err(ProviderError::new(
            ProviderErrorKind::Malformed,
            "no candidates in response",
        ));
    };

    let text = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(reason) = candidate
            .finish_reason
            .as_deref()
            .filter(|reason| is_blocked_finish_reason(reason))
        {
            return Err(ProviderError::new(
                ProviderErrorKind::Blocked,
                format!("generation blocked: {reason}"),
            ));
        }
    }

    Ok(Completion {
        text,
        finish_reason: candidate.finish_reason,
        usage,
    })
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationSettings {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };

        tracing::debug!(
            model = self.model_name(request.model.as_deref()),
            prompt_chars = request.prompt.len(),
            temperature = request.temperature,
            "calling gemini generateContent"
        );

        let response = self
            .http
            .post(self.generate_url(request.model.as_deref()))
            .query(&[("key", self.api_key.expose_secret().as_str())])
            .json(&body)
            .send()
            .await
            .map_err(classify_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            let error = classify_status(status, &headers, &body);
            tracing::warn!(
                status = status.as_u16(),
                kind = error.kind.label(),
                "gemini request failed"
            );
            return Err(error);
        }

        let response = response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|err| ProviderError::new(ProviderErrorKind::Malformed, err.to_string()))?;

        into_completion(response)
    }
}
