use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twin_core::config::PipelineConfig;
use twin_core::events::{AuditSink, JsonlEventSink, TracingEventSink};
use twin_core::pipeline::ChatPipeline;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod auth;
mod error;
mod extract;
mod generation;
mod middleware;
mod retrieval;
mod routes;
mod state;
mod store;

const DEFAULT_EVENT_LOG_PATH: &str = "logs/events.jsonl";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Health Twin API",
        version = "0.1.0",
        description = "Grounded, consent-gated chat over a user's own health readings. Answers explain signals; they never diagnose or advise on medication."
    ),
    paths(
        routes::health::health_check,
        routes::twin::twin_chat,
        routes::twin::twin_summary,
        routes::chats::list_chats,
        routes::chats::create_chat,
        routes::chats::list_messages,
        routes::chats::post_message,
        routes::consent::get_consents,
        routes::consent::set_consents,
    ),
    components(schemas(
        HealthResponse,
        twin_core::error::ApiError,
        twin_core::consent::ConsentScope,
        twin_core::events::PipelineOutcome,
        twin_core::pipeline::ChatTurnReply,
        twin_core::summary::SummaryRequest,
        twin_core::summary::Summary,
        twin_core::signals::EvaluationResult,
        twin_core::signals::Signal,
        twin_core::signals::Explanation,
        twin_core::signals::Severity,
        twin_core::trend::Trend,
        twin_core::trend::TrendDirection,
        twin_core::trend::Sparkline,
        twin_core::trend::SparklineDirection,
        routes::twin::TwinChatRequest,
        routes::chats::ChatItem,
        routes::chats::ChatMessageItem,
        routes::chats::CreateChatRequest,
        routes::consent::ConsentStatus,
        routes::consent::ConsentResponse,
        routes::consent::ConsentChangeRequest,
    )),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "user_id_header",
            utoipa::openapi::security::SecurityScheme::ApiKey(
                utoipa::openapi::security::ApiKey::Header(
                    utoipa::openapi::security::ApiKeyValue::new(auth::USER_ID_HEADER),
                ),
            ),
        );
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub retrieval_enabled: bool,
}

fn event_sink() -> AuditSink {
    match std::env::var("TWIN_EVENT_LOG_PATH") {
        Ok(path) if path.eq_ignore_ascii_case("tracing") => AuditSink::Tracing(TracingEventSink),
        Ok(path) if !path.trim().is_empty() => AuditSink::Jsonl(JsonlEventSink::new(path)),
        _ => AuditSink::Jsonl(JsonlEventSink::new(DEFAULT_EVENT_LOG_PATH)),
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "twin_api=debug,twin_core=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("../migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let http = reqwest::Client::new();
    let generator = generation::OllamaGenerator::from_env(http.clone());
    let retriever = retrieval::HttpRetriever::from_env(http);
    let retrieval_enabled = retriever.is_enabled();
    let config = PipelineConfig::from_env();

    tracing::info!(
        model = generator.model(),
        retrieval_enabled,
        store_raw_question = config.store_raw_question,
        "pipeline configured"
    );

    let pipeline = ChatPipeline::new(
        generator,
        retriever,
        store::PgConsentLookup::new(pool.clone()),
        store::PgChatMemory::new(pool.clone()),
        event_sink(),
    )
    .with_persistence(Arc::new(store::PgChatPersistence::new(pool.clone())))
    .with_config(config);

    let app_state = state::AppState {
        db: pool,
        pipeline: Arc::new(pipeline),
        retrieval_enabled,
    };

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::twin::chat_router().layer(middleware::rate_limit::chat_layer()))
        .merge(routes::chats::message_router().layer(middleware::rate_limit::chat_layer()))
        .merge(routes::twin::summary_router().layer(middleware::rate_limit::read_layer()))
        .merge(routes::chats::router().layer(middleware::rate_limit::read_layer()))
        .merge(routes::consent::router().layer(middleware::rate_limit::read_layer()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Twin API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}
