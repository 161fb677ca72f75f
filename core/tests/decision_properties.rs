use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::json;
use twin_core::consent::{ConsentScope, missing_scopes, scopes_required};
use twin_core::error::{ChatTurnError, EventSinkError, GenerationError, LookupError};
use twin_core::events::{EventSink, JsonlEventSink, PipelineEvent, PipelineOutcome};
use twin_core::health::RawHealthState;
use twin_core::intent::{Intent, classify};
use twin_core::pipeline::{
    ChatMemory, ChatMemoryLookup, ChatPipeline, ChatTurnRequest, ConsentLookup, Generator,
    MemoryQuery, NoRetrieval,
};
use twin_core::prompt::{PromptContext, build_prompt};
use twin_core::safety::{check_missing_data, is_forbidden_question};
use twin_core::signals::{Severity, evaluate};
use twin_core::trend::{SparklineDirection, TrendDirection, compute_sparkline, compute_trend};
use uuid::Uuid;

fn raw(value: serde_json::Value) -> RawHealthState {
    RawHealthState::from_value(value)
}

#[test]
fn glucose_118_is_prediabetes() {
    let facts = evaluate(&raw(json!({"fasting_glucose": 118})));
    assert_eq!(facts.signals.len(), 1);
    let signal = &facts.signals[0];
    assert_eq!(signal.status, "prediabetes_range");
    assert_eq!(signal.severity, Severity::Moderate);
    assert!(facts.risks.contains("insulin_resistance"));
}

#[test]
fn glucose_boundary_is_exact() {
    let at = evaluate(&raw(json!({"fasting_glucose": 125})));
    let above = evaluate(&raw(json!({"fasting_glucose": 126})));
    assert_eq!(at.signals[0].status, "prediabetes_range");
    assert_eq!(above.signals[0].status, "diabetes_range");
}

#[test]
fn empty_input_has_no_signals() {
    let facts = evaluate(&RawHealthState::new());
    assert!(facts.signals.is_empty());
    assert!(facts.recommendations.is_empty());
    assert!(facts.doctor_flags.is_empty());
}

#[test]
fn trend_and_sparkline_examples() {
    let trend = compute_trend(&[170.0, 160.0, 150.0], 145.0, true).unwrap();
    assert_eq!(trend.direction, TrendDirection::Improving);
    assert!((10..=100).contains(&trend.confidence));
    assert!(trend.explanation.contains("170 -> 160 -> 150 -> 145"));

    assert!(compute_trend(&[], 118.0, true).is_none());

    let spark = compute_sparkline(&[200.0, 190.0], 180.0);
    assert_eq!(spark.values, vec![200.0, 190.0, 180.0]);
    assert_eq!(spark.direction, SparklineDirection::Down);
}

#[test]
fn signal_without_history_serializes_without_trend_key() {
    let facts = evaluate(&raw(json!({"fasting_glucose": 118})));
    let value = serde_json::to_value(&facts.signals[0]).unwrap();
    assert!(value.get("trend").is_none());
    assert!(value.get("sparkline").is_none());
}

#[test]
fn medication_question_is_forbidden_and_classified() {
    let question = "Should I stop my medication?";
    assert!(is_forbidden_question(question));
    let intent = classify(question, &RawHealthState::new());
    assert_eq!(intent.intent, Intent::SafetyMedication);
    assert!(intent.confidence >= 0.7);
}

#[test]
fn sleep_question_requires_sleep_signal() {
    let without = evaluate(&raw(json!({"ldl": 100})));
    let with = evaluate(&raw(json!({"sleep_hours": 7.5})));
    assert!(check_missing_data("How did I sleep?", &without).missing);
    let ok = check_missing_data("How did I sleep?", &with);
    assert!(!ok.missing);
    assert!(ok.message.is_empty());
}

#[test]
fn consent_scopes_for_chat_bound_glucose() {
    let required = scopes_required(&raw(json!({"fasting_glucose": 118})), true, true);
    for scope in [
        ConsentScope::GlucoseData,
        ConsentScope::ChatHistory,
        ConsentScope::MemoryPersonalization,
    ] {
        assert!(required.contains(&scope));
    }
    assert_eq!(missing_scopes(&required, &BTreeMap::new()).len(), 3);
}

#[test]
fn deterministic_stages_are_idempotent() {
    let input = raw(json!({
        "fasting_glucose": 118,
        "bp_systolic": 128,
        "bp_diastolic": 84,
        "history": {"fasting_glucose": [132, 125], "bp_systolic": [140, 135]}
    }));
    let question = "Is my blood pressure improving?";

    let render = || {
        let facts = evaluate(&input);
        let intent = classify(question, &input);
        let prompt = build_prompt(
            question,
            PromptContext {
                facts: &facts,
                intent: &intent,
                retrieved_docs: &[],
                chat_summaries: &[],
                memory_snippets: &[],
                clarifier: None,
            },
        );
        (
            serde_json::to_string(&facts).unwrap(),
            serde_json::to_string(&intent).unwrap(),
            prompt,
        )
    };

    assert_eq!(render(), render());
}

struct CountingGenerator(Arc<Mutex<usize>>);

impl Generator for CountingGenerator {
    async fn generate(
        &self,
        _system_prompt: &str,
        _user_prompt: &str,
        _params: twin_core::config::GenerationParams,
    ) -> Result<String, GenerationError> {
        *self.0.lock().unwrap() += 1;
        Ok("From what I can see here, things look steady.".to_string())
    }
}

struct Grants(Vec<ConsentScope>);

impl ConsentLookup for Grants {
    async fn granted_scopes(&self, _user_id: Uuid) -> Result<BTreeMap<ConsentScope, bool>, LookupError> {
        Ok(self.0.iter().map(|s| (*s, true)).collect())
    }
}

struct NoMemory;

impl ChatMemoryLookup for NoMemory {
    async fn chat_memory(&self, _query: MemoryQuery<'_>) -> Result<ChatMemory, LookupError> {
        Ok(ChatMemory::default())
    }
}

#[derive(Default)]
struct Collect(Mutex<Vec<PipelineOutcome>>);

impl EventSink for Collect {
    async fn emit(&self, event: &PipelineEvent) -> Result<(), EventSinkError> {
        self.0.lock().unwrap().push(event.safety.outcome);
        Ok(())
    }
}

#[tokio::test]
async fn every_path_emits_exactly_one_event() {
    let sink = Arc::new(Collect::default());
    let generated = Arc::new(Mutex::new(0));
    let pipeline = ChatPipeline::new(
        CountingGenerator(generated.clone()),
        NoRetrieval,
        Grants(vec![ConsentScope::SleepData]),
        NoMemory,
        sink.clone(),
    );

    let turns = [
        ("Should I stop my medication?", json!({})),
        ("How did I sleep?", json!({})),
        ("How is my glucose?", json!({"fasting_glucose": 101})),
        ("How did I sleep?", json!({"sleep_hours": 6})),
    ];
    let mut denied = 0;
    for (question, input) in turns {
        let result = pipeline
            .run_chat_turn(ChatTurnRequest {
                user_id: Uuid::now_v7(),
                question: question.to_string(),
                raw: raw(input),
                chat: None,
            })
            .await;
        if let Err(ChatTurnError::ConsentRequired { .. }) = result {
            denied += 1;
        }
    }

    assert_eq!(denied, 1);
    assert_eq!(
        *sink.0.lock().unwrap(),
        vec![
            PipelineOutcome::Forbidden,
            PipelineOutcome::MissingData,
            PipelineOutcome::ConsentDenied,
            PipelineOutcome::Answered,
        ]
    );
    assert_eq!(*generated.lock().unwrap(), 1);
}

#[tokio::test]
async fn jsonl_sink_receives_pipeline_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("events.jsonl");
    let pipeline = ChatPipeline::new(
        CountingGenerator(Arc::default()),
        NoRetrieval,
        Grants(Vec::new()),
        NoMemory,
        Arc::new(JsonlEventSink::new(&path)),
    );

    pipeline
        .run_chat_turn(ChatTurnRequest {
            user_id: Uuid::now_v7(),
            question: "Tell me about my LDL".to_string(),
            raw: raw(json!({"ldl": 120})),
            chat: None,
        })
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    let event: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
    assert_eq!(event["intent"], json!("LAB_EXPLANATION"));
    assert_eq!(event["safety"]["outcome"], json!("answered"));
    assert_eq!(event["fields_present"], json!({"ldl": true}));
}
