//! Postgres-backed collaborators: consent and chat-memory lookups (read-only)
//! and fire-and-forget chat persistence.

use std::collections::BTreeMap;

use sqlx::PgPool;
use twin_core::consent::ConsentScope;
use twin_core::error::{LookupError, PersistenceError};
use twin_core::pipeline::{
    ChatMemory, ChatMemoryLookup, ChatPersistence, ChatTurnRecord, ConsentLookup, MemoryQuery,
};
use uuid::Uuid;

pub const SUMMARY_RETENTION: i64 = 5;
pub const MEMORY_RETENTION: i64 = 20;
pub const TOPIC_MEMORY_KIND: &str = "topic";
const TITLE_MAX_CHARS: usize = 60;

fn store_error(err: sqlx::Error) -> LookupError {
    LookupError::Store(err.to_string())
}

/// Reads `user_consents`. Unknown scope names are skipped.
#[derive(Clone)]
pub struct PgConsentLookup {
    pool: PgPool,
}

impl PgConsentLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub async fn load_consents(
    pool: &PgPool,
    user_id: Uuid,
) -> Result<BTreeMap<ConsentScope, bool>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (String, bool)>(
        "SELECT scope, granted FROM user_consents WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(scope, granted)| ConsentScope::parse(&scope).map(|s| (s, granted)))
        .collect())
}

impl ConsentLookup for PgConsentLookup {
    async fn granted_scopes(
        &self,
        user_id: Uuid,
    ) -> Result<BTreeMap<ConsentScope, bool>, LookupError> {
        load_consents(&self.pool, user_id).await.map_err(store_error)
    }
}

#[derive(Clone)]
pub struct PgChatMemory {
    pool: PgPool,
}

impl PgChatMemory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Keyword-matching snippets first, then the rest, each group newest first.
fn rank_memory(rows: Vec<String>, keywords: &[String], limit: usize) -> Vec<String> {
    let lowered: Vec<String> = keywords.iter().map(|k| k.to_lowercase()).collect();
    let (mut matching, rest): (Vec<String>, Vec<String>) = rows.into_iter().partition(|content| {
        let content = content.to_lowercase();
        lowered.iter().any(|k| content.contains(k.as_str()))
    });
    matching.extend(rest);
    matching.truncate(limit);
    matching
}

impl ChatMemoryLookup for PgChatMemory {
    async fn chat_memory(&self, query: MemoryQuery<'_>) -> Result<ChatMemory, LookupError> {
        let summaries = sqlx::query_scalar::<_, String>(
            "SELECT s.summary FROM chat_summaries s \
             JOIN chats c ON c.id = s.chat_id \
             WHERE s.chat_id = $1 AND c.user_id = $2 \
             ORDER BY s.created_at DESC LIMIT $3",
        )
        .bind(query.chat_id)
        .bind(query.user_id)
        .bind(query.summary_limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        let memory_rows = sqlx::query_scalar::<_, String>(
            "SELECT content FROM user_memory WHERE user_id = $1 \
             ORDER BY updated_at DESC LIMIT $2",
        )
        .bind(query.user_id)
        .bind(MEMORY_RETENTION)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(ChatMemory {
            summaries,
            memory_snippets: rank_memory(memory_rows, query.keywords, query.memory_limit),
        })
    }
}

/// Spawns the write-back so the reply is never held up by the store.
#[derive(Clone)]
pub struct PgChatPersistence {
    pool: PgPool,
}

impl PgChatPersistence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ChatPersistence for PgChatPersistence {
    fn persist_turn(&self, record: ChatTurnRecord) -> Result<(), PersistenceError> {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let chat_id = record.chat_id;
            if let Err(e) = write_turn(&pool, record).await {
                tracing::warn!(error = %e, %chat_id, "Failed to persist chat turn");
            }
        });
        Ok(())
    }
}

fn chat_title(question: &str) -> String {
    let trimmed = question.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}...", cut.trim_end())
}

async fn write_turn(pool: &PgPool, record: ChatTurnRecord) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE chats SET updated_at = now(), title = COALESCE(title, $3) \
         WHERE id = $1 AND user_id = $2",
    )
    .bind(record.chat_id)
    .bind(record.user_id)
    .bind(chat_title(&record.question))
    .execute(&mut *tx)
    .await?;

    for (role, content) in [("user", &record.question), ("twin", &record.reply)] {
        sqlx::query(
            "INSERT INTO chat_messages (id, chat_id, user_id, role, content) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::now_v7())
        .bind(record.chat_id)
        .bind(record.user_id)
        .bind(role)
        .bind(content)
        .execute(&mut *tx)
        .await?;
    }

    if let Some(summary) = &record.summary {
        sqlx::query("INSERT INTO chat_summaries (id, chat_id, summary) VALUES ($1, $2, $3)")
            .bind(Uuid::now_v7())
            .bind(record.chat_id)
            .bind(summary)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM chat_summaries WHERE chat_id = $1 AND id NOT IN ( \
               SELECT id FROM chat_summaries WHERE chat_id = $1 \
               ORDER BY created_at DESC LIMIT $2)",
        )
        .bind(record.chat_id)
        .bind(SUMMARY_RETENTION)
        .execute(&mut *tx)
        .await?;
    }

    if let Some(memory) = &record.topic_memory {
        let refreshed = sqlx::query(
            "UPDATE user_memory SET updated_at = now() \
             WHERE user_id = $1 AND kind = $2 AND content = $3",
        )
        .bind(record.user_id)
        .bind(TOPIC_MEMORY_KIND)
        .bind(memory)
        .execute(&mut *tx)
        .await?;

        if refreshed.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO user_memory (id, user_id, kind, content) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::now_v7())
            .bind(record.user_id)
            .bind(TOPIC_MEMORY_KIND)
            .bind(memory)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "DELETE FROM user_memory WHERE user_id = $1 AND kind = $2 AND id NOT IN ( \
               SELECT id FROM user_memory WHERE user_id = $1 AND kind = $2 \
               ORDER BY updated_at DESC LIMIT $3)",
        )
        .bind(record.user_id)
        .bind(TOPIC_MEMORY_KIND)
        .bind(MEMORY_RETENTION)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}
