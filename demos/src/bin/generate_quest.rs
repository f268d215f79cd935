//! Generates a quest outline with Gemini.
//!
//! ```text
//! GEMINI_API_KEY=... cargo run -p questgen-demos --bin generate_quest -- volcanoes 8-12
//! ```
//!
//! Set `QUESTGEN_SETTINGS` to a pipeline YAML file (see `demos/config/`) and
//! `QUESTGEN_DATABASE_URL` (e.g. `sqlite://questgen.db`) to keep records.

use std::sync::Arc;

use anyhow::Context as _;
use questgen_core::{context, GenerationError, TracingMetrics};
use questgen_llm::GeminiClient;
use questgen_pipeline::{
    CatalogItem, ContentGenerator, ContentKind, PipelineSettings, QuestOutline,
};
use questgen_store_sqlite::SqliteContentStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let topic = args.next().unwrap_or_else(|| "volcanoes".to_string());
    let age_range = args.next().unwrap_or_else(|| "8-12".to_string());

    let settings = match std::env::var("QUESTGEN_SETTINGS") {
        Ok(path) => PipelineSettings::from_yaml_path(&path)
            .with_context(|| format!("loading pipeline settings from {path}"))?,
        Err(_) => PipelineSettings::default(),
    };

    let client = GeminiClient::from_env()?;
    tracing::info!(model = client.model(), %topic, %age_range, "generating quest outline");

    let mut builder = ContentGenerator::builder(client)
        .settings(&settings)?
        .metrics(Arc::new(TracingMetrics));
    if let Ok(url) = std::env::var("QUESTGEN_DATABASE_URL") {
        let store = SqliteContentStore::builder(url).build().await?;
        builder = builder.store(Arc::new(store));
    }
    let pipeline = builder.build()?;

    let kind = ContentKind::QuestOutline;
    let report = match pipeline
        .generate_report(
            kind.template_id(),
            context! { "topic" => topic, "age_range" => age_range },
            &kind.schema(),
            &settings.generation,
        )
        .await
    {
        Ok(report) => report,
        Err(GenerationError::Validation {
            reason, partial, ..
        }) => {
            tracing::warn!(%reason, "quest outline rejected");
            if let Some(partial) = partial {
                println!("{}", serde_json::to_string_pretty(&partial.to_value())?);
            }
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        verdict = report.verdict.as_str(),
        score = report.result.quality_score,
        attempts = report.attempts.len(),
        regenerations = report.regenerations,
        latency_ms = u64::try_from(report.latency.as_millis()).unwrap_or(u64::MAX),
        "quest outline generated"
    );

    match QuestOutline::from_result(&report.result) {
        Ok(quest) => {
            println!("{} ({:?}, {} xp)", quest.title, quest.difficulty, quest.xp);
            for task in &quest.tasks {
                println!("  - {} [{:?}, {} xp]", task.title, task.pillar, task.xp_value);
            }
        }
        Err(_) => println!("{}", serde_json::to_string_pretty(&report.result.to_value())?),
    }

    Ok(())
}
