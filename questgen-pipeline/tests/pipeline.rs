use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use questgen_core::{
    context, metrics::names, Completion, CompletionRequest, ContentStore, GenerationCache,
    GenerationConfig, GenerationError, GenerationRecord, InMemoryContentStore, InMemoryMetrics,
    ProviderError, RecordStatus, StoreError, TextGenerator,
};
use questgen_pipeline::{
    ContentGenerator, ContentKind, Difficulty, QuestOutline, RegenerationPolicy, Verdict,
};

#[derive(Clone, Default)]
struct Scripted {
    replies: Arc<Mutex<VecDeque<Result<Completion, ProviderError>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl Scripted {
    fn replying<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scripted = Self::default();
        for text in texts {
            scripted.push(Ok(Completion::text(text)));
        }
        scripted
    }

    fn push(&self, reply: Result<Completion, ProviderError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TextGenerator for Scripted {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::invalid_request("script exhausted")))
    }
}

struct FailingStore;

#[async_trait::async_trait]
impl ContentStore for FailingStore {
    async fn upsert(&self, _record: GenerationRecord) -> Result<(), StoreError> {
        Err(StoreError::Internal("disk full".into()))
    }

    async fn get(&self, _key: &str) -> Result<Option<GenerationRecord>, StoreError> {
        Ok(None)
    }
}

const COMPLETE_QUEST: &str = r#"Here is your quest:
{"title": "Volcano Explorer",
 "description": "Discover how volcanoes form and why they erupt.",
 "difficulty": "beginner",
 "xp": 150,
 "tasks": [{"title": "Build a model", "description": "Make a baking-soda volcano.", "pillar": "stem", "xp_value": 50}]}
Enjoy!"#;

const SPARSE_QUEST: &str = r#"{"title": "Volcano Explorer", "tasks": []}"#;

const POOR_QUEST: &str = r#"{"title": "V"}"#;

fn config() -> GenerationConfig {
    GenerationConfig::default()
        .with_max_retries(2)
        .with_backoff(Duration::from_millis(100), Duration::from_secs(1))
        .with_timeout(Duration::from_secs(5))
        .with_jitter(false)
}

fn volcano_context() -> questgen_core::Context {
    context! { "topic" => "volcanoes", "age_range" => "8-12" }
}

#[tokio::test(start_paused = true)]
async fn volcano_scenario_flags_incomplete_quest() {
    let generator = Scripted::replying([SPARSE_QUEST]);
    let pipeline = ContentGenerator::builder(generator.clone()).build().unwrap();
    let schema = ContentKind::QuestOutline.schema();

    let result = pipeline
        .generate_content("quest_outline", volcano_context(), &schema, &config())
        .await
        .unwrap();

    assert!(!result.is_complete);
    assert!(result.quality_score > 0.0 && result.quality_score < 1.0);
    assert_eq!(result.get("title"), Some(&json!("Volcano Explorer")));

    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].prompt.is_empty());
    assert!(requests[0].prompt.contains("volcanoes"));
}

#[tokio::test(start_paused = true)]
async fn accepted_result_is_cached_and_persisted() {
    let generator = Scripted::replying([COMPLETE_QUEST]);
    let store = Arc::new(InMemoryContentStore::new());
    let metrics = Arc::new(InMemoryMetrics::new());
    let pipeline = ContentGenerator::builder(generator.clone())
        .cache(Arc::new(GenerationCache::new(16)), Duration::from_secs(60))
        .store(store.clone())
        .metrics(metrics.clone())
        .build()
        .unwrap();
    let schema = ContentKind::QuestOutline.schema();

    let first = pipeline
        .generate_report("quest_outline", volcano_context(), &schema, &config())
        .await
        .unwrap();
    let second = pipeline
        .generate_report("quest_outline", volcano_context(), &schema, &config())
        .await
        .unwrap();

    assert_eq!(first.verdict, Verdict::Accepted);
    assert!(first.result.is_complete);
    assert!(!first.from_cache);
    assert_eq!(first.attempts.len(), 1);
    assert!(second.from_cache);
    assert!(second.attempts.is_empty());
    assert_eq!(second.result, first.result);
    assert_eq!(second.fingerprint, first.fingerprint);
    assert_eq!(generator.requests().len(), 1);

    let record = store.get(&first.fingerprint).await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Accepted);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.fields, Some(first.result.to_value()));

    assert_eq!(metrics.counter_total(names::CACHE_HITS), 1);
    assert_eq!(metrics.counter_total(names::CACHE_MISSES), 1);
    assert_eq!(
        metrics.counter("generation.outcome{template=quest_outline,verdict=accepted}"),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn results_needing_review_are_not_cached() {
    let generator = Scripted::replying([SPARSE_QUEST, SPARSE_QUEST]);
    let store = Arc::new(InMemoryContentStore::new());
    let pipeline = ContentGenerator::builder(generator.clone())
        .cache(Arc::new(GenerationCache::new(16)), Duration::from_secs(60))
        .store(store.clone())
        .build()
        .unwrap();
    let schema = ContentKind::QuestOutline.schema();

    for _ in 0..2 {
        let report = pipeline
            .generate_report("quest_outline", volcano_context(), &schema, &config())
            .await
            .unwrap();
        assert_eq!(report.verdict, Verdict::NeedsReview);
        assert!(!report.from_cache);
        let record = store.get(&report.fingerprint).await.unwrap().unwrap();
        assert_eq!(record.status, RecordStatus::NeedsReview);
    }

    assert_eq!(generator.requests().len(), 2);
    assert!(pipeline.cache().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejected_result_is_regenerated_colder() {
    let generator = Scripted::replying([POOR_QUEST, COMPLETE_QUEST]);
    let metrics = Arc::new(InMemoryMetrics::new());
    let pipeline = ContentGenerator::builder(generator.clone())
        .regeneration(RegenerationPolicy {
            max_regenerations: 2,
            temperature_step: 0.2,
        })
        .metrics(metrics.clone())
        .build()
        .unwrap();

    let report = pipeline
        .generate_report(
            "quest_outline",
            volcano_context(),
            &ContentKind::QuestOutline.schema(),
            &config().with_temperature(0.7),
        )
        .await
        .unwrap();

    assert_eq!(report.verdict, Verdict::Accepted);
    assert_eq!(report.regenerations, 1);
    assert_eq!(report.attempts.len(), 2);

    let temperatures: Vec<f32> = generator.requests().iter().map(|r| r.temperature).collect();
    assert_eq!(temperatures.len(), 2);
    assert!((temperatures[0] - 0.7).abs() < 1e-6);
    assert!((temperatures[1] - 0.5).abs() < 1e-6);
    assert_eq!(metrics.counter_total(names::REGENERATIONS), 1);
    assert_eq!(metrics.observations(names::QUALITY_SCORE).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn unparseable_response_is_regenerated() {
    let generator = Scripted::replying(["I cannot help with {that", COMPLETE_QUEST]);
    let pipeline = ContentGenerator::builder(generator.clone()).build().unwrap();

    let report = pipeline
        .generate_report(
            "quest_outline",
            volcano_context(),
            &ContentKind::QuestOutline.schema(),
            &config(),
        )
        .await
        .unwrap();

    assert_eq!(report.regenerations, 1);
    assert_eq!(generator.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn rejection_after_budget_carries_partial_result() {
    let generator = Scripted::replying([POOR_QUEST, POOR_QUEST]);
    let store = Arc::new(InMemoryContentStore::new());
    let pipeline = ContentGenerator::builder(generator.clone())
        .regeneration(RegenerationPolicy {
            max_regenerations: 1,
            temperature_step: 0.2,
        })
        .store(store.clone())
        .build()
        .unwrap();

    let err = pipeline
        .generate_content(
            "quest_outline",
            volcano_context(),
            &ContentKind::QuestOutline.schema(),
            &config(),
        )
        .await
        .unwrap_err();

    match err {
        GenerationError::Validation {
            raw_response,
            partial,
            ..
        } => {
            assert_eq!(raw_response.as_deref(), Some(POOR_QUEST));
            let partial = partial.expect("scored partial result");
            assert!(!partial.is_complete);
            assert!(partial.quality_score < 0.4);
        }
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(generator.requests().len(), 2);
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn service_failure_is_recorded_and_returned() {
    let generator = Scripted::default();
    for _ in 0..3 {
        generator.push(Err(ProviderError::server(503, "overloaded")));
    }
    let store = Arc::new(InMemoryContentStore::new());
    let pipeline = ContentGenerator::builder(generator.clone())
        .store(store.clone())
        .build()
        .unwrap();
    let config = config();
    let fingerprint = questgen_core::fingerprint("quest_outline", &volcano_context());

    let err = pipeline
        .generate_content(
            "quest_outline",
            volcano_context(),
            &ContentKind::QuestOutline.schema(),
            &config,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Service { ref attempts, .. } if attempts.len() == 3));
    let record = store.get(&fingerprint).await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Failed);
    assert_eq!(record.attempts, 3);
    assert!(record.error.unwrap().contains("503"));
}

#[tokio::test(start_paused = true)]
async fn unknown_template_never_reaches_the_provider() {
    let generator = Scripted::replying([COMPLETE_QUEST]);
    let pipeline = ContentGenerator::builder(generator.clone()).build().unwrap();

    let err = pipeline
        .generate_content(
            "lesson_plan",
            volcano_context(),
            &ContentKind::QuestOutline.schema(),
            &config(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Configuration(_)));
    assert!(generator.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn typed_quest_outline_is_returned() {
    let pipeline = ContentGenerator::builder(Scripted::replying([COMPLETE_QUEST]))
        .build()
        .unwrap();

    let quest: QuestOutline = pipeline
        .generate_item(volcano_context(), &config())
        .await
        .unwrap();

    assert_eq!(quest.title, "Volcano Explorer");
    assert_eq!(quest.difficulty, Difficulty::Beginner);
    assert_eq!(quest.tasks.len(), 1);
    assert_eq!(quest.tasks[0].xp_value, 50);
}

#[tokio::test(start_paused = true)]
async fn typed_request_rejects_incomplete_content() {
    let pipeline = ContentGenerator::builder(Scripted::replying([SPARSE_QUEST]))
        .build()
        .unwrap();

    let err = pipeline
        .generate_item::<QuestOutline>(volcano_context(), &config())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Validation { .. }));
}

#[tokio::test(start_paused = true)]
async fn store_failure_on_success_is_a_persistence_error() {
    let generator = Scripted::replying([COMPLETE_QUEST, COMPLETE_QUEST]);
    let pipeline = ContentGenerator::builder(generator.clone())
        .cache(Arc::new(GenerationCache::new(16)), Duration::from_secs(60))
        .store(Arc::new(FailingStore))
        .build()
        .unwrap();
    let schema = ContentKind::QuestOutline.schema();

    let err = pipeline
        .generate_content("quest_outline", volcano_context(), &schema, &config())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Persistence(_)));
    assert!(pipeline.cache().unwrap().is_empty());

    // Nothing unpersisted is served on the next identical request.
    let err = pipeline
        .generate_content("quest_outline", volcano_context(), &schema, &config())
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Persistence(_)));
    assert_eq!(generator.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_share_only_the_cache() {
    let generator = Scripted::default();
    for _ in 0..4 {
        generator.push(Ok(Completion::text(COMPLETE_QUEST)));
    }
    let pipeline = Arc::new(
        ContentGenerator::builder(generator.clone())
            .cache(Arc::new(GenerationCache::new(16)), Duration::from_secs(60))
            .build()
            .unwrap(),
    );

    let topics = ["volcanoes", "tides", "bees", "comets"];
    let handles: Vec<_> = topics
        .into_iter()
        .map(|topic| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .generate_content(
                        "quest_outline",
                        context! { "topic" => topic, "age_range" => "8-12" },
                        &ContentKind::QuestOutline.schema(),
                        &config(),
                    )
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_complete);
    }
    assert_eq!(pipeline.cache().unwrap().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn deadline_spans_regeneration_rounds() {
    let generator = Scripted::default();
    generator.push(Ok(Completion::text(POOR_QUEST)));
    for _ in 0..10 {
        generator.push(Err(ProviderError::server(500, "boom")));
    }
    let pipeline = ContentGenerator::builder(generator.clone())
        .regeneration(RegenerationPolicy {
            max_regenerations: 3,
            temperature_step: 0.1,
        })
        .build()
        .unwrap();
    let config = config()
        .with_max_retries(10)
        .with_deadline(Duration::from_millis(250));

    let err = pipeline
        .generate_content(
            "quest_outline",
            volcano_context(),
            &ContentKind::QuestOutline.schema(),
            &config,
        )
        .await
        .unwrap_err();

    match err {
        GenerationError::Timeout { attempts, .. } => {
            // The first round's successful attempt is kept in the log.
            assert!(attempts[0].error.is_none());
            assert!(attempts.len() >= 2);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}
