use serde::Serialize;
use utoipa::ToSchema;

use crate::consent::ConsentScope;

/// Structured error response body for every non-2xx API reply.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "consent_required")
    pub error: String,
    /// Human-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
    /// Scopes the user must grant before the request can proceed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_scopes: Option<Vec<ConsentScope>>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const INTERNAL_ERROR: &str = "internal_error";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const CONSENT_REQUIRED: &str = "consent_required";
    pub const RATE_LIMITED: &str = "rate_limited";
}

/// The only failure a chat turn surfaces to its caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatTurnError {
    #[error("consent required for: {}", join_scopes(.missing_scopes))]
    ConsentRequired { missing_scopes: Vec<ConsentScope> },
}

fn join_scopes(scopes: &[ConsentScope]) -> String {
    scopes
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("generation service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed generation response: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("retrieval request failed: {0}")]
    Transport(String),
    #[error("malformed retrieval response: {0}")]
    Malformed(String),
}

/// Failure reading an externally owned store (consent grants, chat memory).
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("lookup failed: {0}")]
    Store(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("persistence failed: {0}")]
    Store(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EventSinkError {
    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("event write failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_error_lists_scopes() {
        let err = ChatTurnError::ConsentRequired {
            missing_scopes: vec![ConsentScope::GlucoseData, ConsentScope::ChatHistory],
        };
        assert_eq!(
            err.to_string(),
            "consent required for: glucose_data, chat_history"
        );
    }

    #[test]
    fn api_error_omits_empty_optionals() {
        let body = ApiError {
            error: codes::CONSENT_REQUIRED.to_string(),
            message: "Please grant consent to continue.".to_string(),
            field: None,
            received: None,
            request_id: "req".to_string(),
            docs_hint: None,
            required_scopes: Some(vec![ConsentScope::SleepData]),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["required_scopes"], serde_json::json!(["sleep_data"]));
        assert!(value.get("field").is_none());
    }
}
