use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

use crate::auth::USER_ID_HEADER;

const DEFAULT_ORIGINS: &str = "http://localhost:3000";

fn parse_origins(raw: &str) -> Vec<HeaderValue> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect()
}

/// CORS from `TWIN_CORS_ORIGINS` (comma-separated, default `http://localhost:3000`).
/// The gateway identity header is allowed so browser frontends behind it can call through.
pub fn build_cors_layer() -> CorsLayer {
    let origins = std::env::var("TWIN_CORS_ORIGINS").unwrap_or_else(|_| DEFAULT_ORIGINS.to_string());

    CorsLayer::new()
        .allow_origin(parse_origins(&origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}
