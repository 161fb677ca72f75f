//! Audit events emitted once per chat turn.
//!
//! Events are write-once records. The pipeline never reads them back and never
//! lets a sink failure reach the caller.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::EventSinkError;
use crate::health::RawHealthState;

/// Intent label recorded for forbidden questions, which are never classified.
pub const FORBIDDEN_INTENT: &str = "FORBIDDEN";
/// Intent label recorded when consent is denied before classification.
pub const UNCLASSIFIED_INTENT: &str = "UNCLASSIFIED";

/// How a chat turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineOutcome {
    Answered,
    /// Generation was empty, failed, or tripped the post-check.
    Fallback,
    Forbidden,
    MissingData,
    ConsentDenied,
}

impl PipelineOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::Fallback => "fallback",
            Self::Forbidden => "forbidden",
            Self::MissingData => "missing_data",
            Self::ConsentDenied => "consent_denied",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SafetyFlags {
    pub medication_refusal: bool,
    pub diagnosis_refusal: bool,
    pub outcome: PipelineOutcome,
}

impl SafetyFlags {
    pub const fn new(outcome: PipelineOutcome) -> Self {
        Self {
            medication_refusal: false,
            diagnosis_refusal: false,
            outcome,
        }
    }

    pub const fn refusing(mut self, medication: bool, diagnosis: bool) -> Self {
        self.medication_refusal = medication;
        self.diagnosis_refusal = diagnosis;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PipelineEvent {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub intent: String,
    /// Rounded to two decimals.
    pub intent_confidence: f64,
    pub question_char_count: usize,
    /// Present raw keys only. Values are never recorded.
    pub fields_present: BTreeMap<String, bool>,
    pub missing_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing_scopes: Vec<String>,
    pub safety: SafetyFlags,
    /// Rounded to two decimals.
    pub latency_ms: f64,
    /// Literal question text, only when raw question storage is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
}

impl PipelineEvent {
    pub fn new(
        request_id: Uuid,
        question: &str,
        raw: &RawHealthState,
        outcome: PipelineOutcome,
        store_raw_question: bool,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id,
            intent: UNCLASSIFIED_INTENT.to_string(),
            intent_confidence: 0.0,
            question_char_count: question.chars().count(),
            fields_present: raw.keys().map(|k| (k.to_string(), true)).collect(),
            missing_fields: Vec::new(),
            missing_scopes: Vec::new(),
            safety: SafetyFlags::new(outcome),
            latency_ms: 0.0,
            question: store_raw_question.then(|| question.to_string()),
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>, confidence: f64) -> Self {
        self.intent = intent.into();
        self.intent_confidence = round2(confidence);
        self
    }

    pub fn with_missing_fields(mut self, missing: Vec<String>) -> Self {
        self.missing_fields = missing;
        self
    }

    pub fn with_missing_scopes(mut self, missing: Vec<String>) -> Self {
        self.missing_scopes = missing;
        self
    }

    pub fn with_safety(mut self, safety: SafetyFlags) -> Self {
        self.safety = safety;
        self
    }

    pub fn with_latency(mut self, elapsed: Duration) -> Self {
        self.latency_ms = round2(elapsed.as_secs_f64() * 1000.0);
        self
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Destination for audit events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent) -> impl Future<Output = Result<(), EventSinkError>> + Send;
}

impl<T: EventSink> EventSink for Arc<T> {
    fn emit(&self, event: &PipelineEvent) -> impl Future<Output = Result<(), EventSinkError>> + Send {
        (**self).emit(event)
    }
}

/// Appends one JSON object per line, creating parent directories on demand.
#[derive(Debug)]
pub struct JsonlEventSink {
    path: PathBuf,
    // Serializes appends so concurrent turns never interleave partial lines.
    write_lock: Mutex<()>,
}

impl JsonlEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlEventSink {
    async fn emit(&self, event: &PipelineEvent) -> Result<(), EventSinkError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Emits events as structured `tracing` records under the `twin_audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    async fn emit(&self, event: &PipelineEvent) -> Result<(), EventSinkError> {
        let payload = serde_json::to_string(event)?;
        tracing::info!(
            target: "twin_audit",
            request_id = %event.request_id,
            intent = %event.intent,
            outcome = event.safety.outcome.as_str(),
            latency_ms = event.latency_ms,
            event = %payload,
            "pipeline event"
        );
        Ok(())
    }
}

/// Sink chosen at startup from configuration.
#[derive(Debug)]
pub enum AuditSink {
    Jsonl(JsonlEventSink),
    Tracing(TracingEventSink),
}

impl EventSink for AuditSink {
    async fn emit(&self, event: &PipelineEvent) -> Result<(), EventSinkError> {
        match self {
            Self::Jsonl(sink) => sink.emit(event).await,
            Self::Tracing(sink) => sink.emit(event).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw() -> RawHealthState {
        RawHealthState::from_value(json!({"sleep_hours": 6.5, "ldl": 140}))
    }

    #[test]
    fn event_records_keys_not_values() {
        let event = PipelineEvent::new(Uuid::now_v7(), "How did I sleep?", &raw(), PipelineOutcome::Answered, false)
            .with_intent("SLEEP_RECAP", 0.754)
            .with_latency(Duration::from_micros(12_346));

        assert_eq!(event.intent_confidence, 0.75);
        assert_eq!(event.latency_ms, 12.35);
        assert_eq!(event.question_char_count, 16);
        assert_eq!(event.question, None);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["fields_present"], json!({"ldl": true, "sleep_hours": true}));
        assert_eq!(value["safety"]["outcome"], json!("answered"));
        assert!(value.get("question").is_none());
        assert!(value.get("missing_scopes").is_none());
    }

    #[test]
    fn raw_question_only_when_opted_in() {
        let event = PipelineEvent::new(Uuid::now_v7(), "hello", &raw(), PipelineOutcome::Fallback, true);
        assert_eq!(event.question.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn jsonl_sink_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.jsonl");
        let sink = JsonlEventSink::new(&path);

        for outcome in [PipelineOutcome::Forbidden, PipelineOutcome::MissingData] {
            let event = PipelineEvent::new(Uuid::now_v7(), "q", &raw(), outcome, false);
            sink.emit(&event).await.unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: PipelineEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.safety.outcome, PipelineOutcome::MissingData);
    }

    #[tokio::test]
    async fn jsonl_sink_reports_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending.
        let sink = JsonlEventSink::new(dir.path());
        let event = PipelineEvent::new(Uuid::now_v7(), "q", &raw(), PipelineOutcome::Answered, false);
        assert!(matches!(sink.emit(&event).await, Err(EventSinkError::Io(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_emits_write_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(AuditSink::Jsonl(JsonlEventSink::new(dir.path().join("events.jsonl"))));

        let writers: Vec<_> = (0..8)
            .map(|_| {
                let sink = sink.clone();
                tokio::spawn(async move {
                    let event = PipelineEvent::new(Uuid::now_v7(), "q", &raw(), PipelineOutcome::Answered, false);
                    sink.emit(&event).await
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap().unwrap();
        }

        let AuditSink::Jsonl(jsonl) = sink.as_ref() else {
            unreachable!()
        };
        let contents = std::fs::read_to_string(jsonl.path()).unwrap();
        assert_eq!(contents.lines().count(), 8);
        for line in contents.lines() {
            let event: PipelineEvent = serde_json::from_str(line).unwrap();
            assert_eq!(event.safety.outcome, PipelineOutcome::Answered);
        }
    }
}
