use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use twin_core::pipeline::{ChatContext, ChatTurnReply};
use uuid::Uuid;

use super::twin::{TwinChatRequest, run_turn};
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;

#[derive(Debug, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct ChatItem {
    pub id: Uuid,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, sqlx::FromRow, utoipa::ToSchema)]
pub struct ChatMessageItem {
    pub id: Uuid,
    /// `user` or `twin`
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, utoipa::ToSchema)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct PageParams {
    /// Maximum rows to return (default 50, max 200)
    pub limit: Option<i64>,
}

impl PageParams {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/chats", get(list_chats).post(create_chat))
        .route("/v1/chats/{chat_id}/messages", get(list_messages))
}

pub fn message_router() -> Router<AppState> {
    Router::new().route(
        "/v1/chats/{chat_id}/messages",
        axum::routing::post(post_message),
    )
}

async fn ensure_owned(state: &AppState, user_id: Uuid, chat_id: Uuid) -> Result<(), AppError> {
    let owned: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chats WHERE id = $1 AND user_id = $2)")
            .bind(chat_id)
            .bind(user_id)
            .fetch_one(&state.db)
            .await?;
    if owned {
        Ok(())
    } else {
        Err(AppError::NotFound {
            resource: format!("Chat {chat_id}"),
        })
    }
}

/// GET /v1/chats: the caller's chats, most recently active first
#[utoipa::path(
    get,
    path = "/v1/chats",
    params(PageParams),
    responses(
        (status = 200, description = "Chats", body = Vec<ChatItem>),
        (status = 401, description = "Missing caller identity", body = twin_core::error::ApiError),
    ),
    security(("user_id_header" = [])),
    tag = "chats"
)]
pub async fn list_chats(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<ChatItem>>, AppError> {
    let chats = sqlx::query_as::<_, ChatItem>(
        "SELECT id, title, created_at, updated_at FROM chats \
         WHERE user_id = $1 ORDER BY updated_at DESC LIMIT $2",
    )
    .bind(user.user_id)
    .bind(page.limit())
    .fetch_all(&state.db)
    .await?;
    Ok(Json(chats))
}

/// POST /v1/chats: open a new chat
#[utoipa::path(
    post,
    path = "/v1/chats",
    request_body = CreateChatRequest,
    responses(
        (status = 201, description = "Chat created", body = ChatItem),
        (status = 401, description = "Missing caller identity", body = twin_core::error::ApiError),
    ),
    security(("user_id_header" = [])),
    tag = "chats"
)]
pub async fn create_chat(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateChatRequest>,
) -> Result<(axum::http::StatusCode, Json<ChatItem>), AppError> {
    let title = request
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let chat = sqlx::query_as::<_, ChatItem>(
        "INSERT INTO chats (id, user_id, title) VALUES ($1, $2, $3) \
         RETURNING id, title, created_at, updated_at",
    )
    .bind(Uuid::now_v7())
    .bind(user.user_id)
    .bind(title)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(user_id = %user.user_id, chat_id = %chat.id, "chat created");
    Ok((axum::http::StatusCode::CREATED, Json(chat)))
}

/// GET /v1/chats/{chat_id}/messages: newest messages last
#[utoipa::path(
    get,
    path = "/v1/chats/{chat_id}/messages",
    params(("chat_id" = Uuid, Path, description = "Chat ID"), PageParams),
    responses(
        (status = 200, description = "Messages in chronological order", body = Vec<ChatMessageItem>),
        (status = 404, description = "Chat not found", body = twin_core::error::ApiError),
    ),
    security(("user_id_header" = [])),
    tag = "chats"
)]
pub async fn list_messages(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(page): Query<PageParams>,
) -> Result<Json<Vec<ChatMessageItem>>, AppError> {
    ensure_owned(&state, user.user_id, chat_id).await?;

    let mut messages = sqlx::query_as::<_, ChatMessageItem>(
        "SELECT id, role, content, created_at FROM chat_messages \
         WHERE chat_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
    )
    .bind(chat_id)
    .bind(page.limit())
    .fetch_all(&state.db)
    .await?;
    messages.reverse();
    Ok(Json(messages))
}

/// POST /v1/chats/{chat_id}/messages: chat-bound turn with history and memory
#[utoipa::path(
    post,
    path = "/v1/chats/{chat_id}/messages",
    params(("chat_id" = Uuid, Path, description = "Chat ID")),
    request_body = TwinChatRequest,
    responses(
        (status = 200, description = "Reply, fallback or refusal", body = ChatTurnReply),
        (status = 403, description = "Consent required", body = twin_core::error::ApiError),
        (status = 404, description = "Chat not found", body = twin_core::error::ApiError),
    ),
    security(("user_id_header" = [])),
    tag = "chats"
)]
pub async fn post_message(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    AppJson(request): AppJson<TwinChatRequest>,
) -> Result<Json<ChatTurnReply>, AppError> {
    ensure_owned(&state, user.user_id, chat_id).await?;
    run_turn(&state, user.user_id, request, Some(ChatContext { chat_id }))
        .await
        .map(Json)
}
