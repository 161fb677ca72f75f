use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use twin_core::health::RawHealthState;
use twin_core::pipeline::{ChatContext, ChatTurnReply, ChatTurnRequest};
use twin_core::summary::{Summary, SummaryRequest, summarize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

pub const MAX_QUESTION_CHARS: usize = 2000;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TwinChatRequest {
    /// The user's free-text question.
    pub question: String,
    /// Raw health readings, optionally with a nested `history` object.
    #[serde(default)]
    pub raw: RawHealthState,
}

pub fn chat_router() -> Router<AppState> {
    Router::new().route("/v1/twin/chat", post(twin_chat))
}

pub fn summary_router() -> Router<AppState> {
    Router::new().route("/v1/twin/summary", post(twin_summary))
}

pub(crate) fn validate_question(question: &str) -> Result<String, AppError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation {
            message: "question must not be empty".to_string(),
            field: Some("question".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    if trimmed.chars().count() > MAX_QUESTION_CHARS {
        return Err(AppError::Validation {
            message: format!("question must be at most {MAX_QUESTION_CHARS} characters"),
            field: Some("question".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    Ok(trimmed.to_string())
}

pub(crate) async fn run_turn(
    state: &AppState,
    user_id: Uuid,
    request: TwinChatRequest,
    chat: Option<ChatContext>,
) -> Result<ChatTurnReply, AppError> {
    let question = validate_question(&request.question)?;
    let reply = state
        .pipeline
        .run_chat_turn(ChatTurnRequest {
            user_id,
            question,
            raw: request.raw,
            chat,
        })
        .await?;

    tracing::info!(
        user_id = %user_id,
        request_id = %reply.request_id,
        outcome = ?reply.outcome,
        chat_bound = chat.is_some(),
        "twin turn completed"
    );
    Ok(reply)
}

/// POST /v1/twin/chat: one stateless chat turn
#[utoipa::path(
    post,
    path = "/v1/twin/chat",
    request_body = TwinChatRequest,
    responses(
        (status = 200, description = "Reply, fallback or refusal", body = ChatTurnReply),
        (status = 400, description = "Invalid request body", body = twin_core::error::ApiError),
        (status = 401, description = "Missing caller identity", body = twin_core::error::ApiError),
        (status = 403, description = "Consent required", body = twin_core::error::ApiError),
    ),
    security(("user_id_header" = [])),
    tag = "twin"
)]
pub async fn twin_chat(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    AppJson(request): AppJson<TwinChatRequest>,
) -> Result<Json<ChatTurnReply>, AppError> {
    run_turn(&state, user.user_id, request, None).await.map(Json)
}

/// POST /v1/twin/summary: deterministic evaluation of grouped readings
#[utoipa::path(
    post,
    path = "/v1/twin/summary",
    request_body = SummaryRequest,
    responses(
        (status = 200, description = "Evaluated signals with disclaimer", body = Summary),
        (status = 400, description = "Invalid request body", body = twin_core::error::ApiError),
    ),
    tag = "twin"
)]
pub async fn twin_summary(AppJson(request): AppJson<SummaryRequest>) -> Json<Summary> {
    Json(summarize(request))
}
