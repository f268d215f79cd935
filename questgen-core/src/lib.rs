//! Building blocks of the questgen generation pipeline: a retrying client over
//! an injected [`TextGenerator`], JSON extraction from model output, schema
//! validation with quality scoring, and a fingerprint-keyed cache.

mod cache;
mod config;
mod error;
mod extract;
mod fingerprint;
mod llm;
mod parsed;
mod request;
mod retry;
mod store;
mod validate;
mod value;

pub mod metrics;

pub use cache::{CacheEntry, GenerationCache, DEFAULT_CACHE_CAPACITY};
pub use config::GenerationConfig;
pub use error::{GenerationError, ProviderError, ProviderErrorKind, StoreError};
pub use extract::extract;
pub use fingerprint::fingerprint;
pub use llm::{Completion, CompletionRequest, TextGenerator, TokenUsage};
pub use metrics::{InMemoryMetrics, MetricsSink, NoopMetrics, TracingMetrics};
pub use parsed::ParsedResult;
pub use request::GenerationRequest;
pub use retry::{
    backoff_delay, CallControl, GenerationAttempt, GenerationClient, GenerationOutcome,
    ProviderErrorRecord, RetryState,
};
pub use store::{ContentStore, GenerationRecord, InMemoryContentStore, RecordStatus};
pub use validate::{
    FieldSpec, FieldType, QualityReport, QualityScorer, Schema, ScoringWeights, VocabularyPolicy,
};
pub use value::{Context, IntoValue, TryFromValue, Value};

pub use tokio_util::sync::CancellationToken;
