//! Ask pipeline: translate, embed, search, hydrate, prompt, generate, persist.
//!
//! Progress is published on a watch channel as an [`AskStatus`]. Only one ask
//! runs per pipeline; a submission while one is referencing or generating is
//! rejected with [`AskError::Busy`].

use crate::config::ServiceConfig;
use crate::locations::LocationTable;
use crate::models::{
    AskEvent, AskPhase, AskRecord, AskRequest, AskResult, AskStage, AskStatus, Coordinates,
    HydratedReview, Language, MatchedReference, ReferencedReview, SearchMatch,
};
use crate::prompt::{build_system_prompt, build_user_message, PromptContext};
use crate::traits::{EmbeddingService, Generator, ReviewStore, Translator, VectorSearch};
use crate::error::Result;
use crate::{AskError, ServiceError};
use chrono::Utc;
use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub pivot_language: String,
    pub stage_timeout: Duration,
    pub embedding_dimensions: Option<usize>,
    pub max_references: Option<usize>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for PipelineOptions {
    fn from(value: &ServiceConfig) -> Self {
        Self {
            pivot_language: value.pivot_language.clone(),
            stage_timeout: value.stage_timeout(),
            embedding_dimensions: value.embedding_dimensions,
            max_references: value.max_references,
        }
    }
}

/// Pure transition function for the ask state machine.
pub fn reduce(phase: AskPhase, event: AskEvent) -> Result<AskPhase> {
    use AskEvent::*;
    use AskPhase::*;

    match (phase, event) {
        (Idle | Done, Submit) => Ok(Referencing),
        (Referencing, ReferencesReady) => Ok(Generating),
        (Referencing | Generating, Completed | Failed) => Ok(Done),
        (Idle | Done, Reset) => Ok(Idle),
        (from, event) => Err(AskError::InvalidTransition { from, event }),
    }
}

fn apply(status: AskStatus, event: AskEvent) -> Result<AskStatus> {
    let phase = reduce(status.phase, event)?;
    let failed = match event {
        AskEvent::Failed => true,
        AskEvent::Submit | AskEvent::Reset => false,
        AskEvent::ReferencesReady | AskEvent::Completed => status.failed,
    };
    Ok(AskStatus { phase, failed })
}

pub struct AskPipeline<T, E, S, D, G>
where
    T: Translator,
    E: EmbeddingService,
    S: VectorSearch,
    D: ReviewStore,
    G: Generator,
{
    translator: T,
    embedder: E,
    search: S,
    store: D,
    generator: G,
    locations: LocationTable,
    options: PipelineOptions,
    status: watch::Sender<AskStatus>,
}

struct Answered {
    translated_question: String,
    embedding_vector: Vec<f32>,
    references: Vec<HydratedReview>,
    answer_text: String,
}

impl<T, E, S, D, G> AskPipeline<T, E, S, D, G>
where
    T: Translator + Send + Sync,
    E: EmbeddingService + Send + Sync,
    S: VectorSearch + Send + Sync,
    D: ReviewStore + Send + Sync,
    G: Generator + Send + Sync,
{
    pub fn new(
        translator: T,
        embedder: E,
        search: S,
        store: D,
        generator: G,
        locations: LocationTable,
        options: PipelineOptions,
    ) -> Self {
        let (status, _) = watch::channel(AskStatus::default());
        Self {
            translator,
            embedder,
            search,
            store,
            generator,
            locations,
            options,
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AskStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> AskStatus {
        *self.status.borrow()
    }

    /// Returns a finished pipeline to `Idle`.
    pub fn reset(&self) -> Result<()> {
        self.publish(AskEvent::Reset)
    }

    pub async fn run_ask(
        &self,
        request: &AskRequest,
        locale: &str,
        user_coordinates: Option<Coordinates>,
    ) -> Result<AskResult> {
        if request.question.trim().is_empty() {
            return Err(AskError::EmptyQuestion);
        }

        if let Err(error) = self.publish(AskEvent::Submit) {
            debug!(%error, "rejecting submission");
            return Err(AskError::Busy);
        }

        let language = Language::from_locale(locale);
        info!(user_id = %request.user_id, locale, "ask submitted");

        let answered = match self
            .answer(request, locale, language, user_coordinates)
            .await
        {
            Ok(answered) => answered,
            Err(error) => {
                warn!(%error, stage = ?error.stage(), "ask failed");
                self.publish_or_log(AskEvent::Failed);
                return Err(error);
            }
        };

        self.publish_or_log(AskEvent::Completed);

        let referenced_reviews: Vec<ReferencedReview> = answered
            .references
            .iter()
            .map(|hydrated| ReferencedReview {
                id: hydrated.review.id.clone(),
                score: hydrated.score,
            })
            .collect();

        let record = AskRecord {
            id: Uuid::new_v4().to_string(),
            user_id: request.user_id.clone(),
            question: request.question.clone(),
            response: answered.answer_text.clone(),
            referenced_reviews: referenced_reviews.clone(),
            created_at: Utc::now(),
        };

        let record_id = match self
            .call(AskStage::Persist, self.store.insert_ask_record(&record))
            .await
        {
            Ok(()) => {
                info!(record_id = %record.id, "ask record stored");
                Some(record.id)
            }
            Err(error) => {
                warn!(%error, record_id = %record.id, "ask record was not stored");
                None
            }
        };

        Ok(AskResult {
            translated_question: answered.translated_question,
            embedding_vector: answered.embedding_vector,
            matched_references: referenced_reviews
                .into_iter()
                .map(|reference| MatchedReference {
                    review_id: reference.id,
                    relevance_score: reference.score,
                })
                .collect(),
            answer_text: answered.answer_text,
            record_id,
        })
    }

    async fn answer(
        &self,
        request: &AskRequest,
        locale: &str,
        language: Language,
        user_coordinates: Option<Coordinates>,
    ) -> Result<Answered> {
        let source_lang = Some(locale.trim()).filter(|locale| !locale.is_empty());
        let translated_question = self
            .call(
                AskStage::Translate,
                self.translator.translate(
                    &request.question,
                    source_lang,
                    &self.options.pivot_language,
                ),
            )
            .await?;
        debug!(translated = %translated_question, "question translated");

        let embedding_vector = self
            .call(AskStage::Embed, self.embedder.embed(&translated_question))
            .await?;
        if embedding_vector.is_empty() {
            return Err(AskError::EmptyEmbedding);
        }
        if let Some(expected) = self.options.embedding_dimensions {
            if embedding_vector.len() != expected {
                return Err(AskError::EmbeddingDimension {
                    expected,
                    actual: embedding_vector.len(),
                });
            }
        }

        let mut matches = self
            .call(AskStage::Search, self.search.search(&embedding_vector))
            .await?;
        if let Some(limit) = self.options.max_references {
            matches.truncate(limit);
        }
        debug!(matches = matches.len(), "vector search finished");

        let references = self.hydrate(&matches).await;
        info!(
            requested = matches.len(),
            hydrated = references.len(),
            "references hydrated"
        );
        self.publish(AskEvent::ReferencesReady)?;

        let context = PromptContext {
            locations: &self.locations,
            reviews: &references,
            user_coordinates,
            language,
        };
        let system_prompt = build_system_prompt(&context);
        let message = build_user_message(&request.question);

        let answer_text = self
            .call(
                AskStage::Generate,
                self.generator.generate(&system_prompt, &message),
            )
            .await?;
        if answer_text.trim().is_empty() {
            return Err(AskError::Stage {
                stage: AskStage::Generate,
                source: ServiceError::InvalidResponse {
                    service: "generate".to_string(),
                    details: "empty answer".to_string(),
                },
            });
        }

        Ok(Answered {
            translated_question,
            embedding_vector,
            references,
            answer_text,
        })
    }

    /// Fetches every match concurrently. Matches whose review cannot be
    /// fetched are dropped; survivors keep the search order.
    async fn hydrate(&self, matches: &[SearchMatch]) -> Vec<HydratedReview> {
        join_all(matches.iter().map(|found| self.hydrate_one(found)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn hydrate_one(&self, found: &SearchMatch) -> Option<HydratedReview> {
        let review = match self
            .call(AskStage::Hydrate, self.store.fetch_review(&found.id))
            .await
        {
            Ok(review) => review,
            Err(error) => {
                warn!(review_id = %found.id, %error, "skipping reference");
                return None;
            }
        };

        let user = match self
            .call(AskStage::Hydrate, self.store.fetch_user(&review.user_id))
            .await
        {
            Ok(user) => Some(user),
            Err(error) => {
                debug!(user_id = %review.user_id, %error, "review author unavailable");
                None
            }
        };

        Some(HydratedReview {
            review,
            score: clamp_score(found.score),
            user,
        })
    }

    async fn call<F, R>(&self, stage: AskStage, request: F) -> Result<R>
    where
        F: Future<Output = Result<R, ServiceError>>,
    {
        match tokio::time::timeout(self.options.stage_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(AskError::Stage { stage, source }),
            Err(_) => Err(AskError::Timeout { stage }),
        }
    }

    fn publish(&self, event: AskEvent) -> Result<()> {
        let mut outcome = Ok(());
        self.status.send_if_modified(|status| match apply(*status, event) {
            Ok(next) => {
                let changed = next != *status;
                *status = next;
                changed
            }
            Err(error) => {
                outcome = Err(error);
                false
            }
        });

        if outcome.is_ok() {
            debug!(?event, phase = ?self.status.borrow().phase, "ask status changed");
        }
        outcome
    }

    fn publish_or_log(&self, event: AskEvent) {
        if let Err(error) = self.publish(event) {
            warn!(%error, "ask status out of sync");
        }
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, ReviewRecord, UserProfile};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct FakeCampusApi {
        fail_translate: bool,
        fail_embed: bool,
        fail_search: bool,
        fail_generate: bool,
        fail_insert: bool,
        translate_gate: Option<Arc<Notify>>,
        generate_gate: Option<Arc<Notify>>,
        translate_delay: Option<Duration>,
        embedding: Vec<f32>,
        matches: Vec<SearchMatch>,
        reviews: HashMap<String, ReviewRecord>,
        users: HashMap<String, UserProfile>,
        answer: String,
        translate_calls: Mutex<Vec<(String, Option<String>, String)>>,
        search_calls: Mutex<usize>,
        fetch_calls: Mutex<usize>,
        generate_calls: Mutex<Vec<(String, String)>>,
        inserted: Mutex<Vec<AskRecord>>,
    }

    fn failure(service: &str) -> ServiceError {
        ServiceError::Status {
            service: service.to_string(),
            status: 500,
        }
    }

    #[async_trait]
    impl Translator for FakeCampusApi {
        async fn translate(
            &self,
            text: &str,
            source_lang: Option<&str>,
            target_lang: &str,
        ) -> Result<String, ServiceError> {
            self.translate_calls.lock().unwrap().push((
                text.to_string(),
                source_lang.map(str::to_string),
                target_lang.to_string(),
            ));
            if let Some(gate) = &self.translate_gate {
                gate.notified().await;
            }
            if let Some(delay) = self.translate_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_translate {
                return Err(failure("translate"));
            }
            Ok(format!("translated: {text}"))
        }
    }

    #[async_trait]
    impl EmbeddingService for FakeCampusApi {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ServiceError> {
            if self.fail_embed {
                return Err(failure("embed"));
            }
            Ok(self.embedding.clone())
        }
    }

    #[async_trait]
    impl VectorSearch for FakeCampusApi {
        async fn search(&self, _vector: &[f32]) -> Result<Vec<SearchMatch>, ServiceError> {
            *self.search_calls.lock().unwrap() += 1;
            if self.fail_search {
                return Err(failure("search"));
            }
            Ok(self.matches.clone())
        }
    }

    #[async_trait]
    impl ReviewStore for FakeCampusApi {
        async fn fetch_review(&self, id: &str) -> Result<ReviewRecord, ServiceError> {
            *self.fetch_calls.lock().unwrap() += 1;
            self.reviews.get(id).cloned().ok_or_else(|| ServiceError::NotFound {
                table: "reviews".to_string(),
                id: id.to_string(),
            })
        }

        async fn fetch_user(&self, id: &str) -> Result<UserProfile, ServiceError> {
            self.users.get(id).cloned().ok_or_else(|| failure("users"))
        }

        async fn insert_ask_record(&self, record: &AskRecord) -> Result<(), ServiceError> {
            if self.fail_insert {
                return Err(failure("data"));
            }
            self.inserted.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[async_trait]
    impl Generator for FakeCampusApi {
        async fn generate(&self, system_prompt: &str, message: &str) -> Result<String, ServiceError> {
            self.generate_calls
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), message.to_string()));
            if let Some(gate) = &self.generate_gate {
                gate.notified().await;
            }
            if self.fail_generate {
                return Err(failure("generate"));
            }
            Ok(self.answer.clone())
        }
    }

    type FakePipeline = AskPipeline<
        Arc<FakeCampusApi>,
        Arc<FakeCampusApi>,
        Arc<FakeCampusApi>,
        Arc<FakeCampusApi>,
        Arc<FakeCampusApi>,
    >;

    fn pipeline(api: &Arc<FakeCampusApi>, options: PipelineOptions) -> FakePipeline {
        let locations = LocationTable::new(vec![Location {
            id: "lib".to_string(),
            name: "중앙도서관".to_string(),
            name_en: "Central Library".to_string(),
            coordinates: None,
        }]);

        AskPipeline::new(
            api.clone(),
            api.clone(),
            api.clone(),
            api.clone(),
            api.clone(),
            locations,
            options,
        )
    }

    fn review(id: &str) -> ReviewRecord {
        ReviewRecord {
            id: id.to_string(),
            user_id: "author-1".to_string(),
            title: "Good study spot".to_string(),
            content: "Plenty of outlets on the second floor.".to_string(),
            location_id: Some("lib".to_string()),
            created_at: Utc.with_ymd_and_hms(2024, 4, 1, 8, 30, 0).unwrap(),
        }
    }

    fn happy_api() -> FakeCampusApi {
        FakeCampusApi {
            embedding: vec![0.1, 0.2, 0.3],
            matches: vec![SearchMatch {
                id: "r1".to_string(),
                score: 0.9,
            }],
            reviews: HashMap::from([("r1".to_string(), review("r1"))]),
            users: HashMap::from([(
                "author-1".to_string(),
                UserProfile {
                    id: "author-1".to_string(),
                    name: "Jisoo".to_string(),
                },
            )]),
            answer: "answer text".to_string(),
            ..FakeCampusApi::default()
        }
    }

    fn request() -> AskRequest {
        AskRequest {
            question: "도서관에 콘센트 많아?".to_string(),
            user_id: "user-7".to_string(),
        }
    }

    #[test]
    fn reducer_follows_ask_lifecycle() {
        use AskEvent::*;
        use AskPhase::*;

        assert_eq!(reduce(Idle, Submit).unwrap(), Referencing);
        assert_eq!(reduce(Referencing, ReferencesReady).unwrap(), Generating);
        assert_eq!(reduce(Generating, Completed).unwrap(), Done);
        assert_eq!(reduce(Referencing, Failed).unwrap(), Done);
        assert_eq!(reduce(Done, Reset).unwrap(), Idle);
        assert_eq!(reduce(Done, Submit).unwrap(), Referencing);

        assert!(reduce(Referencing, Submit).is_err());
        assert!(reduce(Generating, Submit).is_err());
        assert!(reduce(Idle, ReferencesReady).is_err());
        assert!(reduce(Generating, Reset).is_err());
    }

    #[tokio::test]
    async fn happy_path_answers_and_persists_once() {
        let api = Arc::new(happy_api());
        let pipeline = pipeline(&api, PipelineOptions::default());

        let result = pipeline
            .run_ask(&request(), "ko-KR", None)
            .await
            .expect("ask succeeds");

        assert_eq!(result.answer_text, "answer text");
        assert_eq!(result.translated_question, "translated: 도서관에 콘센트 많아?");
        assert_eq!(result.embedding_vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(
            result.matched_references,
            vec![MatchedReference {
                review_id: "r1".to_string(),
                relevance_score: 0.9,
            }]
        );

        let translate_calls = api.translate_calls.lock().unwrap().clone();
        assert_eq!(
            translate_calls,
            vec![(
                "도서관에 콘센트 많아?".to_string(),
                Some("ko-KR".to_string()),
                "en".to_string()
            )]
        );

        let generate_calls = api.generate_calls.lock().unwrap().clone();
        assert_eq!(generate_calls.len(), 1);
        let (system_prompt, message) = &generate_calls[0];
        assert_eq!(message, "도서관에 콘센트 많아?");
        assert!(system_prompt.contains("Location: 중앙도서관"));
        assert!(system_prompt.contains("Author: Jisoo"));
        assert!(system_prompt.contains("Answer in Korean"));

        let inserted = api.inserted.lock().unwrap().clone();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].user_id, "user-7");
        assert_eq!(inserted[0].response, "answer text");
        assert_eq!(inserted[0].referenced_reviews.len(), 1);
        assert_eq!(inserted[0].referenced_reviews[0].id, "r1");
        assert_eq!(result.record_id.as_deref(), Some(inserted[0].id.as_str()));

        assert_eq!(
            pipeline.status(),
            AskStatus {
                phase: AskPhase::Done,
                failed: false
            }
        );
    }

    #[tokio::test]
    async fn missing_reference_still_generates() {
        let api = Arc::new(FakeCampusApi {
            matches: vec![SearchMatch {
                id: "missing".to_string(),
                score: 0.7,
            }],
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());

        let result = pipeline
            .run_ask(&request(), "en", None)
            .await
            .expect("degraded ask still succeeds");

        assert_eq!(result.answer_text, "answer text");
        assert!(result.matched_references.is_empty());

        let generate_calls = api.generate_calls.lock().unwrap().clone();
        assert_eq!(generate_calls.len(), 1);
        assert!(generate_calls[0].0.contains("No reviews matched"));

        let inserted = api.inserted.lock().unwrap().clone();
        assert_eq!(inserted.len(), 1);
        assert!(inserted[0].referenced_reviews.is_empty());
    }

    #[tokio::test]
    async fn partial_hydration_keeps_search_order() {
        let api = Arc::new(FakeCampusApi {
            matches: vec![
                SearchMatch {
                    id: "r2".to_string(),
                    score: 0.95,
                },
                SearchMatch {
                    id: "gone".to_string(),
                    score: 0.9,
                },
                SearchMatch {
                    id: "r1".to_string(),
                    score: 1.4,
                },
            ],
            reviews: HashMap::from([
                ("r1".to_string(), review("r1")),
                ("r2".to_string(), review("r2")),
            ]),
            users: HashMap::new(),
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());

        let result = pipeline.run_ask(&request(), "en", None).await.expect("ask succeeds");

        let ids: Vec<_> = result
            .matched_references
            .iter()
            .map(|reference| reference.review_id.as_str())
            .collect();
        assert_eq!(ids, vec!["r2", "r1"]);
        assert_eq!(result.matched_references[1].relevance_score, 1.0);

        let generate_calls = api.generate_calls.lock().unwrap().clone();
        assert!(generate_calls[0].0.contains("Author: Anonymous"));
    }

    #[tokio::test]
    async fn zero_search_results_is_not_an_error() {
        let api = Arc::new(FakeCampusApi {
            matches: Vec::new(),
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());

        let result = pipeline.run_ask(&request(), "en", None).await.expect("ask succeeds");
        assert!(result.matched_references.is_empty());
        assert_eq!(result.answer_text, "answer text");
    }

    #[tokio::test]
    async fn translate_failure_is_fatal_and_skips_persist() {
        let api = Arc::new(FakeCampusApi {
            fail_translate: true,
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());

        let error = pipeline
            .run_ask(&request(), "en", None)
            .await
            .expect_err("translate failure is fatal");

        assert_eq!(error.stage(), Some(AskStage::Translate));
        assert_eq!(*api.search_calls.lock().unwrap(), 0);
        assert!(api.generate_calls.lock().unwrap().is_empty());
        assert!(api.inserted.lock().unwrap().is_empty());
        assert_eq!(
            pipeline.status(),
            AskStatus {
                phase: AskPhase::Done,
                failed: true
            }
        );

        pipeline.reset().expect("reset from done");
        assert_eq!(pipeline.status(), AskStatus::default());
    }

    #[tokio::test]
    async fn persist_failure_keeps_answer() {
        let api = Arc::new(FakeCampusApi {
            fail_insert: true,
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());

        let result = pipeline.run_ask(&request(), "en", None).await.expect("answer survives");
        assert_eq!(result.answer_text, "answer text");
        assert!(result.record_id.is_none());
        assert!(!pipeline.status().failed);
    }

    #[tokio::test]
    async fn empty_embedding_is_fatal() {
        let api = Arc::new(FakeCampusApi {
            embedding: Vec::new(),
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());

        let error = pipeline.run_ask(&request(), "en", None).await.expect_err("empty vector");
        assert!(matches!(error, AskError::EmptyEmbedding));
        assert_eq!(*api.search_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_fatal() {
        let api = Arc::new(happy_api());
        let options = PipelineOptions {
            embedding_dimensions: Some(768),
            ..PipelineOptions::default()
        };
        let pipeline = pipeline(&api, options);

        let error = pipeline.run_ask(&request(), "en", None).await.expect_err("wrong dims");
        assert!(matches!(
            error,
            AskError::EmbeddingDimension {
                expected: 768,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn max_references_truncates_matches() {
        let api = Arc::new(FakeCampusApi {
            matches: vec![
                SearchMatch {
                    id: "r1".to_string(),
                    score: 0.9,
                },
                SearchMatch {
                    id: "r2".to_string(),
                    score: 0.8,
                },
            ],
            reviews: HashMap::from([
                ("r1".to_string(), review("r1")),
                ("r2".to_string(), review("r2")),
            ]),
            ..happy_api()
        });
        let options = PipelineOptions {
            max_references: Some(1),
            ..PipelineOptions::default()
        };
        let pipeline = pipeline(&api, options);

        let result = pipeline.run_ask(&request(), "en", None).await.expect("ask succeeds");
        assert_eq!(result.matched_references.len(), 1);
        assert_eq!(result.matched_references[0].review_id, "r1");
    }

    #[tokio::test]
    async fn slow_stage_times_out() {
        let api = Arc::new(FakeCampusApi {
            translate_delay: Some(Duration::from_secs(10)),
            ..happy_api()
        });
        let options = PipelineOptions {
            stage_timeout: Duration::from_millis(20),
            ..PipelineOptions::default()
        };
        let pipeline = pipeline(&api, options);

        let error = pipeline.run_ask(&request(), "en", None).await.expect_err("timeout");
        assert!(matches!(
            error,
            AskError::Timeout {
                stage: AskStage::Translate
            }
        ));
        assert!(pipeline.status().failed);
    }

    #[tokio::test]
    async fn empty_question_is_rejected_before_submit() {
        let api = Arc::new(happy_api());
        let pipeline = pipeline(&api, PipelineOptions::default());

        let request = AskRequest {
            question: "   ".to_string(),
            user_id: "user-7".to_string(),
        };
        let error = pipeline.run_ask(&request, "en", None).await.expect_err("empty");
        assert!(matches!(error, AskError::EmptyQuestion));
        assert_eq!(pipeline.status(), AskStatus::default());
        assert!(api.translate_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_submission_while_in_flight_is_rejected() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeCampusApi {
            translate_gate: Some(gate.clone()),
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());
        let mut status = pipeline.subscribe();
        let request = request();

        let first = pipeline.run_ask(&request, "en", None);
        let second = async {
            status
                .wait_for(|status| status.phase == AskPhase::Referencing)
                .await
                .expect("status channel open");
            let rejected = pipeline.run_ask(&request, "en", None).await;
            gate.notify_one();
            rejected
        };

        let (first, second) = tokio::join!(first, second);
        assert!(first.is_ok());
        assert!(matches!(second, Err(AskError::Busy)));
        assert_eq!(api.translate_calls.lock().unwrap().len(), 1);
        assert_eq!(api.inserted.lock().unwrap().len(), 1);

        let again = pipeline.run_ask(&request, "en", None);
        gate.notify_one();
        assert!(again.await.is_ok());
    }

    fn assert_failed_without_record(pipeline: &FakePipeline, api: &FakeCampusApi) {
        assert!(api.inserted.lock().unwrap().is_empty());
        assert_eq!(
            pipeline.status(),
            AskStatus {
                phase: AskPhase::Done,
                failed: true
            }
        );
    }

    #[tokio::test]
    async fn embed_failure_is_fatal() {
        let api = Arc::new(FakeCampusApi {
            fail_embed: true,
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());

        let error = pipeline
            .run_ask(&request(), "en", None)
            .await
            .expect_err("embed fails");
        assert_eq!(error.stage(), Some(AskStage::Embed));
        assert_eq!(*api.search_calls.lock().unwrap(), 0);
        assert!(api.generate_calls.lock().unwrap().is_empty());
        assert_failed_without_record(&pipeline, &api);
    }

    #[tokio::test]
    async fn search_failure_is_fatal() {
        let api = Arc::new(FakeCampusApi {
            fail_search: true,
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());

        let error = pipeline
            .run_ask(&request(), "en", None)
            .await
            .expect_err("search fails");
        assert_eq!(error.stage(), Some(AskStage::Search));
        assert_eq!(*api.fetch_calls.lock().unwrap(), 0);
        assert!(api.generate_calls.lock().unwrap().is_empty());
        assert_failed_without_record(&pipeline, &api);
    }

    #[tokio::test]
    async fn generate_failure_is_fatal() {
        let api = Arc::new(FakeCampusApi {
            fail_generate: true,
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());

        let error = pipeline
            .run_ask(&request(), "en", None)
            .await
            .expect_err("generate fails");
        assert_eq!(error.stage(), Some(AskStage::Generate));
        assert_eq!(api.generate_calls.lock().unwrap().len(), 1);
        assert_failed_without_record(&pipeline, &api);
    }

    #[tokio::test]
    async fn blank_answer_is_a_generate_failure() {
        let api = Arc::new(FakeCampusApi {
            answer: "  \n".to_string(),
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());

        let error = pipeline
            .run_ask(&request(), "en", None)
            .await
            .expect_err("blank answer");
        assert!(matches!(
            error,
            AskError::Stage {
                stage: AskStage::Generate,
                source: ServiceError::InvalidResponse { .. }
            }
        ));
        assert_failed_without_record(&pipeline, &api);
    }

    #[tokio::test]
    async fn submission_while_generating_is_rejected() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeCampusApi {
            generate_gate: Some(gate.clone()),
            ..happy_api()
        });
        let pipeline = pipeline(&api, PipelineOptions::default());
        let mut status = pipeline.subscribe();
        let request = request();

        let first = pipeline.run_ask(&request, "en", None);
        let second = async {
            status
                .wait_for(|status| status.phase == AskPhase::Generating)
                .await
                .expect("status channel open");
            assert_eq!(pipeline.status().phase, AskPhase::Generating);
            assert_eq!(*api.fetch_calls.lock().unwrap(), 1);
            let rejected = pipeline.run_ask(&request, "en", None).await;
            gate.notify_one();
            rejected
        };

        let (first, second) = tokio::join!(first, second);
        assert!(first.is_ok());
        assert!(matches!(second, Err(AskError::Busy)));
        assert_eq!(api.translate_calls.lock().unwrap().len(), 1);
        assert_eq!(api.generate_calls.lock().unwrap().len(), 1);
        assert_eq!(api.inserted.lock().unwrap().len(), 1);
        assert_eq!(pipeline.status().phase, AskPhase::Done);
    }
}
