//! HTTP providers implementing [`questgen_core::TextGenerator`].

mod gemini;

pub use gemini::{GeminiClient, GEMINI_API_KEY_ENV, GEMINI_BASE_URL, GEMINI_DEFAULT_MODEL};
