use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use questgen_core::{
    extract, metrics::names, CallControl, ContentStore, Context, GenerationAttempt,
    GenerationCache, GenerationClient, GenerationConfig, GenerationError, GenerationRecord,
    GenerationRequest, MetricsSink, NoopMetrics, ParsedResult, QualityScorer, RecordStatus,
    Schema, TextGenerator,
};
use questgen_prompt::PromptLibrary;

use crate::{AcceptancePolicy, CatalogItem, PipelineSettings, RegenerationPolicy, Verdict};

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Everything known about one served generation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GenerationReport {
    pub result: ParsedResult,
    pub verdict: Verdict,
    pub fingerprint: String,
    /// Attempts across every round, empty for a cache hit.
    pub attempts: Vec<GenerationAttempt>,
    pub regenerations: u32,
    pub from_cache: bool,
    pub latency: Duration,
}

/// Prompt → retrying client → extractor → scorer, with an optional cache in
/// front and an optional content store behind.
pub struct ContentGenerator<G> {
    client: GenerationClient<G>,
    prompts: PromptLibrary,
    scorer: QualityScorer,
    acceptance: AcceptancePolicy,
    regeneration: RegenerationPolicy,
    cache: Option<Arc<GenerationCache>>,
    cache_ttl: Duration,
    store: Option<Arc<dyn ContentStore>>,
    metrics: Arc<dyn MetricsSink>,
}

pub struct ContentGeneratorBuilder<G> {
    generator: G,
    prompts: PromptLibrary,
    scorer: QualityScorer,
    acceptance: AcceptancePolicy,
    regeneration: RegenerationPolicy,
    cache: Option<Arc<GenerationCache>>,
    cache_ttl: Duration,
    store: Option<Arc<dyn ContentStore>>,
    metrics: Arc<dyn MetricsSink>,
}

impl<G: TextGenerator> ContentGenerator<G> {
    pub fn builder(generator: G) -> ContentGeneratorBuilder<G> {
        ContentGeneratorBuilder {
            generator,
            prompts: PromptLibrary::builtin(),
            scorer: QualityScorer::default(),
            acceptance: AcceptancePolicy::default(),
            regeneration: RegenerationPolicy::default(),
            cache: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            store: None,
            metrics: Arc::new(NoopMetrics),
        }
    }
}

impl<G: TextGenerator> ContentGeneratorBuilder<G> {
    pub fn prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn scorer(mut self, scorer: QualityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn acceptance(mut self, acceptance: AcceptancePolicy) -> Self {
        self.acceptance = acceptance;
        self
    }

    pub fn regeneration(mut self, regeneration: RegenerationPolicy) -> Self {
        self.regeneration = regeneration;
        self
    }

    pub fn cache(mut self, cache: Arc<GenerationCache>, ttl: Duration) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    pub fn store(mut self, store: Arc<dyn ContentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Applies policies, prompts and cache settings from `settings`. The
    /// generation config is passed per call and is not taken from here.
    pub fn settings(mut self, settings: &PipelineSettings) -> Result<Self, GenerationError> {
        settings.validate()?;
        self.prompts = settings.prompt_library()?;
        self.scorer = settings.scoring.clone();
        self.acceptance = settings.acceptance.clone();
        self.regeneration = settings.regeneration.clone();
        self.cache = settings
            .cache
            .enabled
            .then(|| Arc::new(GenerationCache::new(settings.cache.capacity)));
        self.cache_ttl = settings.cache.ttl;
        Ok(self)
    }

    pub fn build(self) -> Result<ContentGenerator<G>, GenerationError> {
        self.scorer.validate()?;
        self.acceptance.validate()?;
        self.regeneration.validate()?;
        if self.cache.is_some() && self.cache_ttl.is_zero() {
            return Err(GenerationError::Configuration(
                "cache ttl must be greater than zero".to_string(),
            ));
        }

        Ok(ContentGenerator {
            client: GenerationClient::new(self.generator).with_metrics(self.metrics.clone()),
            prompts: self.prompts,
            scorer: self.scorer,
            acceptance: self.acceptance,
            regeneration: self.regeneration,
            cache: self.cache,
            cache_ttl: self.cache_ttl,
            store: self.store,
            metrics: self.metrics,
        })
    }
}

impl<G: TextGenerator> ContentGenerator<G> {
    pub fn prompts(&self) -> &PromptLibrary {
        &self.prompts
    }

    pub fn cache(&self) -> Option<&GenerationCache> {
        self.cache.as_deref()
    }

    /// Generates, validates and scores content for `template_id`.
    ///
    /// Results the acceptance policy accepts or routes to review are returned;
    /// rejected ones become a validation error carrying the scored result.
    pub async fn generate_content(
        &self,
        template_id: &str,
        context: Context,
        schema: &Schema,
        config: &GenerationConfig,
    ) -> Result<ParsedResult, GenerationError> {
        self.generate_report(template_id, context, schema, config)
            .await
            .map(|report| report.result)
    }

    pub async fn generate_report(
        &self,
        template_id: &str,
        context: Context,
        schema: &Schema,
        config: &GenerationConfig,
    ) -> Result<GenerationReport, GenerationError> {
        let control = CallControl::from_config(config);
        self.generate_report_with(template_id, context, schema, config, &control)
            .await
    }

    /// Generates a catalog item and reads it back as its typed shape.
    pub async fn generate_item<T: CatalogItem>(
        &self,
        context: Context,
        config: &GenerationConfig,
    ) -> Result<T, GenerationError> {
        let kind = T::KIND;
        let report = self
            .generate_report(kind.template_id(), context, &kind.schema(), config)
            .await?;
        T::from_result(&report.result)
    }

    /// Like [`generate_report`](Self::generate_report), with a caller-owned
    /// deadline and cancellation token shared by every regeneration round.
    pub async fn generate_report_with(
        &self,
        template_id: &str,
        context: Context,
        schema: &Schema,
        config: &GenerationConfig,
        control: &CallControl,
    ) -> Result<GenerationReport, GenerationError> {
        let started = Instant::now();
        config.validate()?;

        let request = GenerationRequest::new(template_id, context, config);
        let fingerprint = request.fingerprint();
        let prompt = self.prompts.build(request.template_id(), request.context())?;
        let labels = [("template", request.template_id())];

        if let Some(result) = self.cached(&fingerprint, &labels) {
            tracing::debug!(
                template_id,
                fingerprint = %fingerprint,
                "serving generation from cache"
            );
            return Ok(GenerationReport {
                verdict: self.acceptance.classify(&result),
                result,
                fingerprint,
                attempts: Vec::new(),
                regenerations: 0,
                from_cache: true,
                latency: started.elapsed(),
            });
        }

        let mut attempts: Vec<GenerationAttempt> = Vec::new();
        let mut round = 0u32;

        loop {
            let temperature = self.regeneration.temperature(request.temperature(), round);
            let round_request = request.with_temperature(temperature);
            let round_config = GenerationConfig {
                temperature: round_request.temperature(),
                ..config.clone()
            };

            let outcome = match self.client.generate_with(&prompt, &round_config, control).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    let error = prepend_attempts(error, attempts);
                    let attempt_total = attempt_count(error.attempts());
                    self.record_failure(
                        &request,
                        &fingerprint,
                        RecordStatus::Failed,
                        None,
                        attempt_total,
                        &error,
                    )
                    .await;
                    self.count_outcome(request.template_id(), "failed");
                    return Err(error);
                }
            };
            attempts.extend(outcome.attempts);

            let rejection = match extract(&outcome.raw_response) {
                Ok(parsed) => {
                    let scored = self.scorer.score(parsed, schema);
                    self.metrics
                        .observe(names::QUALITY_SCORE, scored.quality_score, &labels);
                    let verdict = self.acceptance.classify(&scored);
                    tracing::debug!(
                        template_id,
                        round,
                        score = scored.quality_score,
                        complete = scored.is_complete,
                        verdict = verdict.as_str(),
                        "scored generated content"
                    );

                    if verdict != Verdict::Rejected {
                        let report = GenerationReport {
                            result: scored,
                            verdict,
                            fingerprint,
                            attempts,
                            regenerations: round,
                            from_cache: false,
                            latency: started.elapsed(),
                        };
                        return self.finish(report, &request).await;
                    }

                    GenerationError::Validation {
                        reason: format!(
                            "quality score {:.2} is below the review threshold {:.2}",
                            scored.quality_score, self.acceptance.review_threshold
                        ),
                        raw_response: Some(outcome.raw_response),
                        partial: Some(Box::new(scored)),
                    }
                }
                Err(error) => error,
            };

            if round < self.regeneration.max_regenerations {
                round += 1;
                self.metrics.increment(names::REGENERATIONS, 1, &labels);
                tracing::info!(
                    template_id,
                    round,
                    temperature = self.regeneration.temperature(request.temperature(), round),
                    reason = %rejection,
                    "regenerating content"
                );
                continue;
            }

            tracing::warn!(
                template_id,
                rounds = round + 1,
                reason = %rejection,
                "generated content rejected"
            );
            let partial = match &rejection {
                GenerationError::Validation { partial, .. } => partial.as_deref(),
                _ => None,
            };
            self.record_failure(
                &request,
                &fingerprint,
                RecordStatus::Rejected,
                partial,
                attempt_count(&attempts),
                &rejection,
            )
            .await;
            self.count_outcome(request.template_id(), Verdict::Rejected.as_str());
            return Err(rejection);
        }
    }

    fn cached(&self, fingerprint: &str, labels: &[(&'static str, &str)]) -> Option<ParsedResult> {
        let cache = self.cache.as_ref()?;
        match cache.get(fingerprint) {
            Some(result) => {
                self.metrics.increment(names::CACHE_HITS, 1, labels);
                Some(result)
            }
            None => {
                self.metrics.increment(names::CACHE_MISSES, 1, labels);
                None
            }
        }
    }

    async fn finish(
        &self,
        report: GenerationReport,
        request: &GenerationRequest,
    ) -> Result<GenerationReport, GenerationError> {
        if let Some(store) = &self.store {
            let mut record = GenerationRecord::new(
                report.fingerprint.clone(),
                request.template_id(),
                report.verdict.record_status(),
            );
            record.fields = Some(report.result.to_value());
            record.quality_score = Some(report.result.quality_score);
            record.attempts = attempt_count(&report.attempts);
            store.upsert(record).await?;
        }

        // Only cache what made it into the store.
        if report.verdict == Verdict::Accepted {
            if let Some(cache) = &self.cache {
                cache.put(report.fingerprint.clone(), report.result.clone(), self.cache_ttl);
            }
        }

        self.count_outcome(request.template_id(), report.verdict.as_str());
        Ok(report)
    }

    /// Persists a failed or rejected generation. The generation error is what
    /// the caller sees, so a store failure here is only logged.
    async fn record_failure(
        &self,
        request: &GenerationRequest,
        fingerprint: &str,
        status: RecordStatus,
        partial: Option<&ParsedResult>,
        attempts: u32,
        error: &GenerationError,
    ) {
        let Some(store) = &self.store else {
            return;
        };
        let mut record = GenerationRecord::new(fingerprint, request.template_id(), status);
        record.fields = partial.map(ParsedResult::to_value);
        record.quality_score = partial.map(|result| result.quality_score);
        record.attempts = attempts;
        record.error = Some(error.to_string());

        if let Err(store_error) = store.upsert(record).await {
            tracing::warn!(
                fingerprint,
                error = %store_error,
                "failed to persist generation record"
            );
        }
    }

    fn count_outcome(&self, template_id: &str, outcome: &str) {
        self.metrics.increment(
            names::OUTCOME,
            1,
            &[("template", template_id), ("verdict", outcome)],
        );
    }
}

fn attempt_count(attempts: &[GenerationAttempt]) -> u32 {
    u32::try_from(attempts.len()).unwrap_or(u32::MAX)
}

/// Folds attempts of earlier rounds into the log carried by `error`.
fn prepend_attempts(
    mut error: GenerationError,
    mut prior: Vec<GenerationAttempt>,
) -> GenerationError {
    if prior.is_empty() {
        return error;
    }
    match &mut error {
        GenerationError::Service { attempts, .. }
        | GenerationError::Timeout { attempts, .. }
        | GenerationError::Cancelled { attempts } => {
            prior.append(attempts);
            *attempts = prior;
        }
        _ => {}
    }
    error
}
