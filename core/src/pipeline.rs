//! Chat turn orchestration.
//!
//! `CONSENT_CHECK -> FORBIDDEN_CHECK -> INTENT_CLASSIFY -> MISSING_DATA_CHECK ->
//! RETRIEVE_CONTEXT -> BUILD_PROMPT -> GENERATE -> POST_CHECK -> EMIT_EVENT`.
//!
//! Any stage before GENERATE may end the turn. Every path emits exactly one
//! [`PipelineEvent`]. Only consent denial is returned as an error; the other
//! refusals are ordinary replies.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::{GENERATION_PARAMS, GenerationParams, PipelineConfig};
use crate::consent::{ConsentScope, missing_scopes, scopes_required};
use crate::error::{
    ChatTurnError, GenerationError, LookupError, PersistenceError, RetrievalError,
};
use crate::events::{
    EventSink, FORBIDDEN_INTENT, PipelineEvent, PipelineOutcome, SafetyFlags,
};
use crate::health::RawHealthState;
use crate::intent::{Intent, IntentResult, classify};
use crate::prompt::{PromptContext, build_prompt, summarize_facts};
use crate::safety::{
    FORBIDDEN_REPLY, check_missing_data, fallback_reply, is_forbidden_question,
    response_mentions_unknown_terms,
};
use crate::signals::{EvaluationResult, evaluate};

// ── Collaborators ───────────────────────────────────────────

/// Text generation service. May return an empty string.
pub trait Generator: Send + Sync {
    fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        params: GenerationParams,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

/// Reference snippet retrieval. May return an empty list.
pub trait Retriever: Send + Sync {
    fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> impl Future<Output = Result<Vec<String>, RetrievalError>> + Send;
}

/// Read-only view of a user's consent grants.
pub trait ConsentLookup: Send + Sync {
    fn granted_scopes(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<BTreeMap<ConsentScope, bool>, LookupError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryQuery<'a> {
    pub user_id: Uuid,
    pub chat_id: Uuid,
    /// Memory snippets containing any of these are returned first.
    pub keywords: &'a [String],
    pub summary_limit: usize,
    pub memory_limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMemory {
    pub summaries: Vec<String>,
    pub memory_snippets: Vec<String>,
}

/// Read-only view of prior chat summaries and user memory.
pub trait ChatMemoryLookup: Send + Sync {
    fn chat_memory(
        &self,
        query: MemoryQuery<'_>,
    ) -> impl Future<Output = Result<ChatMemory, LookupError>> + Send;
}

/// What gets written back after a chat-bound turn. Never carries raw values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurnRecord {
    pub user_id: Uuid,
    pub chat_id: Uuid,
    pub question: String,
    pub reply: String,
    pub summary: Option<String>,
    pub topic_memory: Option<String>,
}

/// Fire-and-forget write-back. Implementations should not block the caller.
pub trait ChatPersistence: Send + Sync {
    fn persist_turn(&self, record: ChatTurnRecord) -> Result<(), PersistenceError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

impl ChatPersistence for NoopPersistence {
    fn persist_turn(&self, _record: ChatTurnRecord) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Retriever for deployments without a reference index.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetrieval;

impl Retriever for NoRetrieval {
    async fn retrieve(&self, _query: &str, _top_k: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(Vec::new())
    }
}

// ── Request / reply ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatContext {
    pub chat_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurnRequest {
    pub user_id: Uuid,
    pub question: String,
    pub raw: RawHealthState,
    /// Set for chat-bound turns; enables chat history and memory.
    pub chat: Option<ChatContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ChatTurnReply {
    pub reply: String,
    pub request_id: Uuid,
    pub outcome: PipelineOutcome,
}

// ── Pipeline ────────────────────────────────────────────────

pub struct ChatPipeline<G, R, C, M, E> {
    generator: G,
    retriever: R,
    consent: C,
    memory: M,
    events: E,
    persistence: Arc<dyn ChatPersistence>,
    config: PipelineConfig,
}

impl<G, R, C, M, E> ChatPipeline<G, R, C, M, E>
where
    G: Generator,
    R: Retriever,
    C: ConsentLookup,
    M: ChatMemoryLookup,
    E: EventSink,
{
    pub fn new(generator: G, retriever: R, consent: C, memory: M, events: E) -> Self {
        Self {
            generator,
            retriever,
            consent,
            memory,
            events,
            persistence: Arc::new(NoopPersistence),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn ChatPersistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run_chat_turn(
        &self,
        request: ChatTurnRequest,
    ) -> Result<ChatTurnReply, ChatTurnError> {
        let started = Instant::now();
        let request_id = Uuid::now_v7();
        let question = request.question.trim();
        let raw = &request.raw;
        let chat_bound = request.chat.is_some();
        let new_event = |outcome| {
            PipelineEvent::new(request_id, question, raw, outcome, self.config.store_raw_question)
        };

        // CONSENT_CHECK
        let required = scopes_required(raw, chat_bound, chat_bound);
        if !required.is_empty() {
            let granted = match self.consent.granted_scopes(request.user_id).await {
                Ok(granted) => granted,
                Err(e) => {
                    tracing::warn!(error = %e, %request_id, "consent lookup failed; treating as nothing granted");
                    BTreeMap::new()
                }
            };
            let missing = missing_scopes(&required, &granted);
            if !missing.is_empty() {
                tracing::debug!(%request_id, missing = ?missing, "consent denied");
                self.emit(
                    new_event(PipelineOutcome::ConsentDenied)
                        .with_missing_scopes(missing.iter().map(|s| s.as_str().to_string()).collect())
                        .with_latency(started.elapsed()),
                )
                .await;
                return Err(ChatTurnError::ConsentRequired {
                    missing_scopes: missing,
                });
            }
        }

        let facts = evaluate(raw);

        // FORBIDDEN_CHECK
        if is_forbidden_question(question) {
            tracing::debug!(%request_id, "forbidden question");
            self.emit(
                new_event(PipelineOutcome::Forbidden)
                    .with_intent(FORBIDDEN_INTENT, 1.0)
                    .with_safety(SafetyFlags::new(PipelineOutcome::Forbidden).refusing(true, true))
                    .with_latency(started.elapsed()),
            )
            .await;
            let reply = FORBIDDEN_REPLY.to_string();
            self.persist(&request, question, &reply, None, None);
            return Ok(ChatTurnReply {
                reply,
                request_id,
                outcome: PipelineOutcome::Forbidden,
            });
        }

        // INTENT_CLASSIFY
        let intent = classify(question, raw);

        // MISSING_DATA_CHECK
        let missing_data = check_missing_data(question, &facts);
        if missing_data.missing {
            tracing::debug!(%request_id, intent = %intent.intent, "missing supporting data");
            self.emit(
                new_event(PipelineOutcome::MissingData)
                    .with_intent(intent.intent.as_str(), intent.confidence)
                    .with_missing_fields(intent.missing_fields.clone())
                    .with_safety(SafetyFlags::new(PipelineOutcome::MissingData))
                    .with_latency(started.elapsed()),
            )
            .await;
            self.persist(&request, question, &missing_data.message, None, None);
            return Ok(ChatTurnReply {
                reply: missing_data.message,
                request_id,
                outcome: PipelineOutcome::MissingData,
            });
        }

        // RETRIEVE_CONTEXT
        let query = format!("{question} {}", summarize_facts(&facts));
        let references = match self
            .retriever
            .retrieve(&query, self.config.retrieval_top_k)
            .await
        {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(error = %e, %request_id, "retrieval failed; continuing without references");
                Vec::new()
            }
        };
        let memory = match request.chat {
            Some(chat) => self.lookup_memory(request.user_id, chat.chat_id, &intent, request_id).await,
            None => ChatMemory::default(),
        };

        // BUILD_PROMPT
        let clarifier = intent.clarifying_question();
        let (system_prompt, user_prompt) = build_prompt(
            question,
            PromptContext {
                facts: &facts,
                intent: &intent,
                retrieved_docs: &references,
                chat_summaries: &memory.summaries,
                memory_snippets: &memory.memory_snippets,
                clarifier: clarifier.as_deref(),
            },
        );

        // GENERATE
        let generated = match self
            .generator
            .generate(&system_prompt, &user_prompt, GENERATION_PARAMS)
            .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, %request_id, "generation failed; using fallback reply");
                String::new()
            }
        };

        // POST_CHECK
        let (reply, outcome) =
            if generated.is_empty() || response_mentions_unknown_terms(&generated, &facts) {
                (fallback_reply(), PipelineOutcome::Fallback)
            } else {
                (generated, PipelineOutcome::Answered)
            };

        // EMIT_EVENT
        self.emit(
            new_event(outcome)
                .with_intent(intent.intent.as_str(), intent.confidence)
                .with_missing_fields(intent.missing_fields.clone())
                .with_safety(SafetyFlags::new(outcome).refusing(
                    intent.intent == Intent::SafetyMedication,
                    intent.intent == Intent::DiagnosisRequest,
                ))
                .with_latency(started.elapsed()),
        )
        .await;

        self.persist(
            &request,
            question,
            &reply,
            Some(chat_summary(&intent, &facts)),
            topic_memory(&intent),
        );

        Ok(ChatTurnReply {
            reply,
            request_id,
            outcome,
        })
    }

    async fn lookup_memory(
        &self,
        user_id: Uuid,
        chat_id: Uuid,
        intent: &IntentResult,
        request_id: Uuid,
    ) -> ChatMemory {
        let query = MemoryQuery {
            user_id,
            chat_id,
            keywords: &intent.matched_keywords,
            summary_limit: self.config.chat_summary_limit,
            memory_limit: self.config.memory_snippet_limit,
        };
        match self.memory.chat_memory(query).await {
            Ok(mut memory) => {
                memory.summaries.truncate(self.config.chat_summary_limit);
                memory.memory_snippets.truncate(self.config.memory_snippet_limit);
                memory
            }
            Err(e) => {
                tracing::warn!(error = %e, %request_id, "chat memory lookup failed; continuing without it");
                ChatMemory::default()
            }
        }
    }

    async fn emit(&self, event: PipelineEvent) {
        let _ = self.events.emit(&event).await;
    }

    fn persist(
        &self,
        request: &ChatTurnRequest,
        question: &str,
        reply: &str,
        summary: Option<String>,
        topic_memory: Option<String>,
    ) {
        let Some(chat) = request.chat else {
            return;
        };
        let _ = self.persistence.persist_turn(ChatTurnRecord {
            user_id: request.user_id,
            chat_id: chat.chat_id,
            question: question.to_string(),
            reply: reply.to_string(),
            summary,
            topic_memory,
        });
    }
}

/// One-line chat summary naming the intent and signals discussed, never values.
pub fn chat_summary(intent: &IntentResult, facts: &EvaluationResult) -> String {
    let topic = intent.intent.as_str().to_lowercase().replace('_', " ");
    if facts.signals.is_empty() {
        format!("User asked a {topic} question without sharing readings.")
    } else {
        let names: Vec<&str> = facts.signals.iter().map(|s| s.name.as_str()).collect();
        format!("User asked a {topic} question about {}.", names.join(", "))
    }
}

/// Topic memory from the matched keywords; `None` when nothing matched.
pub fn topic_memory(intent: &IntentResult) -> Option<String> {
    if intent.matched_keywords.is_empty() {
        return None;
    }
    Some(format!(
        "Interested in: {}",
        intent.matched_keywords.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EventSinkError;
    use crate::safety::{DISCLAIMER_TEXT, INSUFFICIENT_INFORMATION};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeGenerator {
        reply: Option<String>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl FakeGenerator {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self::default()
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Generator for FakeGenerator {
        async fn generate(
            &self,
            system_prompt: &str,
            user_prompt: &str,
            params: GenerationParams,
        ) -> Result<String, GenerationError> {
            assert_eq!(params, GENERATION_PARAMS);
            self.calls
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_prompt.to_string()));
            self.reply
                .clone()
                .ok_or_else(|| GenerationError::Transport("connection refused".into()))
        }
    }

    #[derive(Default)]
    struct FakeRetriever {
        docs: Vec<String>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Retriever for FakeRetriever {
        async fn retrieve(&self, _query: &str, top_k: usize) -> Result<Vec<String>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(RetrievalError::Transport("timeout".into()));
            }
            Ok(self.docs.iter().take(top_k).cloned().collect())
        }
    }

    #[derive(Default)]
    struct FakeConsent {
        granted: Vec<ConsentScope>,
        fail: bool,
    }

    impl FakeConsent {
        fn all() -> Self {
            Self {
                granted: ConsentScope::ALL.to_vec(),
                fail: false,
            }
        }
    }

    impl ConsentLookup for FakeConsent {
        async fn granted_scopes(
            &self,
            _user_id: Uuid,
        ) -> Result<BTreeMap<ConsentScope, bool>, LookupError> {
            if self.fail {
                return Err(LookupError::Store("db down".into()));
            }
            Ok(self.granted.iter().map(|s| (*s, true)).collect())
        }
    }

    #[derive(Default)]
    struct FakeMemory {
        memory: ChatMemory,
        calls: AtomicUsize,
    }

    impl ChatMemoryLookup for FakeMemory {
        async fn chat_memory(&self, _query: MemoryQuery<'_>) -> Result<ChatMemory, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.memory.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<PipelineEvent>>,
    }

    impl EventSink for RecordingSink {
        async fn emit(&self, event: &PipelineEvent) -> Result<(), EventSinkError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        async fn emit(&self, _event: &PipelineEvent) -> Result<(), EventSinkError> {
            Err(EventSinkError::Io(std::io::Error::other("disk full")))
        }
    }

    #[derive(Default)]
    struct RecordingPersistence {
        records: Mutex<Vec<ChatTurnRecord>>,
    }

    impl ChatPersistence for RecordingPersistence {
        fn persist_turn(&self, record: ChatTurnRecord) -> Result<(), PersistenceError> {
            self.records.lock().unwrap().push(record);
            Err(PersistenceError::Store("write-back always fails here".into()))
        }
    }

    struct Harness {
        pipeline: ChatPipeline<FakeGenerator, FakeRetriever, FakeConsent, FakeMemory, Arc<RecordingSink>>,
        sink: Arc<RecordingSink>,
        persistence: Arc<RecordingPersistence>,
    }

    fn harness(generator: FakeGenerator, retriever: FakeRetriever, consent: FakeConsent) -> Harness {
        harness_with_memory(generator, retriever, consent, FakeMemory::default())
    }

    fn harness_with_memory(
        generator: FakeGenerator,
        retriever: FakeRetriever,
        consent: FakeConsent,
        memory: FakeMemory,
    ) -> Harness {
        let sink = Arc::new(RecordingSink::default());
        let persistence = Arc::new(RecordingPersistence::default());
        let pipeline = ChatPipeline::new(generator, retriever, consent, memory, sink.clone())
            .with_persistence(persistence.clone());
        Harness {
            pipeline,
            sink,
            persistence,
        }
    }

    fn request(question: &str, raw: serde_json::Value) -> ChatTurnRequest {
        ChatTurnRequest {
            user_id: Uuid::now_v7(),
            question: question.to_string(),
            raw: RawHealthState::from_value(raw),
            chat: None,
        }
    }

    fn chat_request(question: &str, raw: serde_json::Value) -> ChatTurnRequest {
        ChatTurnRequest {
            chat: Some(ChatContext {
                chat_id: Uuid::now_v7(),
            }),
            ..request(question, raw)
        }
    }

    impl Harness {
        fn events(&self) -> Vec<PipelineEvent> {
            self.sink.events.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn answered_turn_calls_generate_once_and_emits_one_event() {
        let h = harness(
            FakeGenerator::replying("  Your LDL is borderline high.  "),
            FakeRetriever {
                docs: vec!["LDL reference".into(), "second".into(), "third".into()],
                ..FakeRetriever::default()
            },
            FakeConsent::all(),
        );

        let reply = h
            .pipeline
            .run_chat_turn(request("What does my LDL mean?", json!({"ldl": 145})))
            .await
            .unwrap();

        assert_eq!(reply.reply, "Your LDL is borderline high.");
        assert_eq!(reply.outcome, PipelineOutcome::Answered);
        assert_eq!(h.pipeline.generator.call_count(), 1);
        assert_eq!(h.pipeline.retriever.calls.load(Ordering::SeqCst), 1);

        let (_, user_prompt) = h.pipeline.generator.calls.lock().unwrap()[0].clone();
        assert!(user_prompt.contains("LDL reference\n\nsecond"));
        assert!(!user_prompt.contains("third"));

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].intent, "LAB_EXPLANATION");
        assert_eq!(events[0].request_id, reply.request_id);
        assert_eq!(events[0].safety.outcome, PipelineOutcome::Answered);
        assert!(events[0].fields_present.contains_key("ldl"));
        assert_eq!(events[0].question, None);
    }

    #[tokio::test]
    async fn forbidden_question_never_reaches_generate() {
        let h = harness(FakeGenerator::replying("unused"), FakeRetriever::default(), FakeConsent::all());

        let reply = h
            .pipeline
            .run_chat_turn(request("Should I stop my medication?", json!({})))
            .await
            .unwrap();

        assert_eq!(reply.reply, FORBIDDEN_REPLY);
        assert_eq!(reply.outcome, PipelineOutcome::Forbidden);
        assert_eq!(h.pipeline.generator.call_count(), 0);
        assert_eq!(h.pipeline.retriever.calls.load(Ordering::SeqCst), 0);

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].intent, FORBIDDEN_INTENT);
        assert_eq!(events[0].intent_confidence, 1.0);
        assert!(events[0].safety.medication_refusal);
        assert!(events[0].safety.diagnosis_refusal);
    }

    #[tokio::test]
    async fn missing_data_question_never_reaches_generate() {
        let h = harness(FakeGenerator::replying("unused"), FakeRetriever::default(), FakeConsent::all());

        let reply = h
            .pipeline
            .run_chat_turn(request("How did I sleep?", json!({"ldl": 120})))
            .await
            .unwrap();

        assert_eq!(reply.outcome, PipelineOutcome::MissingData);
        assert!(reply.reply.contains("sleep data"));
        assert_eq!(h.pipeline.generator.call_count(), 0);
        assert_eq!(h.pipeline.retriever.calls.load(Ordering::SeqCst), 0);

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].intent, "SLEEP_RECAP");
        assert_eq!(events[0].missing_fields, vec!["Sleep Duration"]);
        assert!(!events[0].safety.medication_refusal);
    }

    #[tokio::test]
    async fn consent_denial_stops_before_retrieve_and_generate() {
        let h = harness(
            FakeGenerator::replying("unused"),
            FakeRetriever::default(),
            FakeConsent {
                granted: vec![ConsentScope::GlucoseData],
                fail: false,
            },
        );

        let err = h
            .pipeline
            .run_chat_turn(chat_request("Is my glucose ok?", json!({"fasting_glucose": 118})))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ChatTurnError::ConsentRequired {
                missing_scopes: vec![
                    ConsentScope::ChatHistory,
                    ConsentScope::MemoryPersonalization
                ],
            }
        );
        assert_eq!(h.pipeline.generator.call_count(), 0);
        assert_eq!(h.pipeline.retriever.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.pipeline.memory.calls.load(Ordering::SeqCst), 0);
        assert!(h.persistence.records.lock().unwrap().is_empty());

        let events = h.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].safety.outcome, PipelineOutcome::ConsentDenied);
        assert_eq!(events[0].intent, "UNCLASSIFIED");
        assert_eq!(
            events[0].missing_scopes,
            vec!["chat_history", "memory_personalization"]
        );
    }

    #[tokio::test]
    async fn failing_consent_lookup_fails_closed() {
        let h = harness(
            FakeGenerator::replying("unused"),
            FakeRetriever::default(),
            FakeConsent {
                granted: Vec::new(),
                fail: true,
            },
        );
        let err = h
            .pipeline
            .run_chat_turn(request("How did I sleep?", json!({"sleep_hours": 7})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ChatTurnError::ConsentRequired {
                missing_scopes: vec![ConsentScope::SleepData]
            }
        );
        assert_eq!(h.pipeline.generator.call_count(), 0);
    }

    #[tokio::test]
    async fn unscoped_turn_skips_consent_lookup() {
        let h = harness(
            FakeGenerator::replying("Looking at your recent readings, LDL is optimal."),
            FakeRetriever::default(),
            FakeConsent {
                granted: Vec::new(),
                fail: true,
            },
        );
        let reply = h
            .pipeline
            .run_chat_turn(request("Explain my LDL", json!({"ldl": 90})))
            .await
            .unwrap();
        assert_eq!(reply.outcome, PipelineOutcome::Answered);
    }

    #[tokio::test]
    async fn empty_or_failed_generation_falls_back() {
        for generator in [FakeGenerator::replying("   "), FakeGenerator::failing()] {
            let h = harness(generator, FakeRetriever::default(), FakeConsent::all());
            let reply = h
                .pipeline
                .run_chat_turn(request("Hello", json!({})))
                .await
                .unwrap();
            assert_eq!(reply.reply, format!("{INSUFFICIENT_INFORMATION}\n\n{DISCLAIMER_TEXT}"));
            assert_eq!(reply.outcome, PipelineOutcome::Fallback);
            assert_eq!(h.events().len(), 1);
        }
    }

    #[tokio::test]
    async fn unsafe_generation_is_replaced() {
        let h = harness(
            FakeGenerator::replying("You might be at risk of a stroke."),
            FakeRetriever::default(),
            FakeConsent::all(),
        );
        let reply = h
            .pipeline
            .run_chat_turn(request("Any risk with my LDL?", json!({"ldl": 170})))
            .await
            .unwrap();
        assert_eq!(reply.reply, fallback_reply());
        assert_eq!(h.events()[0].safety.outcome, PipelineOutcome::Fallback);
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_to_no_references() {
        let h = harness(
            FakeGenerator::replying("From what I can see here, your HDL is acceptable."),
            FakeRetriever {
                fail: true,
                ..FakeRetriever::default()
            },
            FakeConsent::all(),
        );
        let reply = h
            .pipeline
            .run_chat_turn(request("What about my HDL?", json!({"ldl": 110, "hdl": 45})))
            .await
            .unwrap();
        assert_eq!(reply.outcome, PipelineOutcome::Answered);
        let (_, user_prompt) = h.pipeline.generator.calls.lock().unwrap()[0].clone();
        assert!(user_prompt.contains("NO_REFERENCES_FOUND"));
    }

    #[tokio::test]
    async fn chat_turn_uses_memory_and_swallows_persistence_failure() {
        let memory = FakeMemory {
            memory: ChatMemory {
                summaries: vec!["s1".into(), "s2".into(), "s3".into()],
                memory_snippets: vec!["Interested in: sleep".into()],
            },
            ..FakeMemory::default()
        };
        let h = harness_with_memory(
            FakeGenerator::replying("Based on the data you shared, you slept 6.5 hours."),
            FakeRetriever::default(),
            FakeConsent::all(),
            memory,
        );

        let reply = h
            .pipeline
            .run_chat_turn(chat_request("How did I sleep?", json!({"sleep_hours": 6.5})))
            .await
            .unwrap();
        assert_eq!(reply.outcome, PipelineOutcome::Answered);

        let (_, user_prompt) = h.pipeline.generator.calls.lock().unwrap()[0].clone();
        assert!(user_prompt.contains("CHAT SUMMARIES (this chat only, brief):\ns1\ns2\n"));
        assert!(!user_prompt.contains("s3"));
        assert!(user_prompt.contains("Interested in: sleep"));

        let records = h.persistence.records.lock().unwrap().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reply, reply.reply);
        let summary = records[0].summary.as_deref().unwrap();
        assert!(summary.contains("Sleep Duration"));
        assert!(!summary.contains("6.5"));
        assert_eq!(records[0].topic_memory.as_deref(), Some("Interested in: sleep"));
    }

    #[tokio::test]
    async fn sink_failure_does_not_change_reply() {
        let pipeline = ChatPipeline::new(
            FakeGenerator::replying("Your BMI is in the normal range."),
            FakeRetriever::default(),
            FakeConsent::all(),
            FakeMemory::default(),
            Arc::new(FailingSink),
        );
        let reply = pipeline
            .run_chat_turn(request("Tell me about my BMI", json!({"bmi": 22})))
            .await
            .unwrap();
        assert_eq!(reply.reply, "Your BMI is in the normal range.");
    }

    #[tokio::test]
    async fn raw_question_stored_only_when_enabled() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = ChatPipeline::new(
            FakeGenerator::replying("Hi there."),
            FakeRetriever::default(),
            FakeConsent::all(),
            FakeMemory::default(),
            sink.clone(),
        )
        .with_config(PipelineConfig {
            store_raw_question: true,
            ..PipelineConfig::default()
        });
        pipeline
            .run_chat_turn(request("  Hello twin  ", json!({})))
            .await
            .unwrap();
        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].question.as_deref(), Some("Hello twin"));
        assert_eq!(events[0].question_char_count, 10);
    }
}
