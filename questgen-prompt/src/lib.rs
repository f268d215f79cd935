//! Prompt assembly for content generation.
//!
//! A [`PromptLibrary`] maps template ids to a [`PromptSpec`]: ordered shared
//! fragments plus a `{{ placeholder }}` body rendered from the request
//! context.

mod library;
mod template;
#[cfg(feature = "yaml")]
mod yaml;

pub use library::{PromptLibrary, PromptSpec};
pub use template::PromptTemplate;
