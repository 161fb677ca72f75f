use std::sync::Arc;

use sqlx::PgPool;
use twin_core::events::AuditSink;
use twin_core::pipeline::ChatPipeline;

use crate::generation::OllamaGenerator;
use crate::retrieval::HttpRetriever;
use crate::store::{PgChatMemory, PgConsentLookup};

pub type TwinPipeline =
    ChatPipeline<OllamaGenerator, HttpRetriever, PgConsentLookup, PgChatMemory, AuditSink>;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub pipeline: Arc<TwinPipeline>,
    pub retrieval_enabled: bool,
}
