//! The content generation pipeline: prompt building, retried generation,
//! extraction, scoring and the acceptance decision, with caching and record
//! keeping around them.
//!
//! ```no_run
//! # async fn run(generator: impl questgen_core::TextGenerator) -> Result<(), questgen_core::GenerationError> {
//! use questgen_core::{context, GenerationConfig};
//! use questgen_pipeline::{ContentGenerator, QuestOutline};
//!
//! let pipeline = ContentGenerator::builder(generator).build()?;
//! let quest: QuestOutline = pipeline
//!     .generate_item(
//!         context! { "topic" => "volcanoes", "age_range" => "8-12" },
//!         &GenerationConfig::default(),
//!     )
//!     .await?;
//! println!("{}", quest.title);
//! # Ok(())
//! # }
//! ```

mod catalog;
mod generator;
mod policy;
mod settings;

pub use catalog::{
    BadgeConcept, CatalogItem, ContentKind, CourseOutline, CourseQuest, Difficulty, Pillar,
    QuestOutline, QuestTask, DIFFICULTIES, PILLARS,
};
pub use generator::{ContentGenerator, ContentGeneratorBuilder, GenerationReport};
pub use policy::{AcceptancePolicy, RegenerationPolicy, Verdict};
pub use settings::{CacheSettings, PipelineSettings, SettingsError};
