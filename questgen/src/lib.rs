//! AI content generation for quests, courses and badges.
//!
//! Re-exports the workspace crates; providers and storage backends sit behind
//! the `gemini` and `sqlite` features.

pub use questgen_core::*;
pub use questgen_pipeline::*;
pub use questgen_prompt::{PromptLibrary, PromptSpec, PromptTemplate};

#[cfg(feature = "gemini")]
pub use questgen_llm::{GeminiClient, GEMINI_API_KEY_ENV, GEMINI_BASE_URL, GEMINI_DEFAULT_MODEL};

#[cfg(feature = "sqlite")]
pub use questgen_store_sqlite::{SqliteContentStore, SqliteContentStoreBuilder, SqliteStoreError};

pub mod prelude {
    pub use questgen_core::{context, Context, GenerationConfig, GenerationError, TextGenerator};
    pub use questgen_pipeline::{
        BadgeConcept, ContentGenerator, ContentKind, CourseOutline, PipelineSettings,
        QuestOutline, Verdict,
    };
}
