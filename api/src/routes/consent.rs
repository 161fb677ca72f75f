use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use twin_core::consent::ConsentScope;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;
use crate::store::load_consents;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ConsentStatus {
    pub scope: ConsentScope,
    pub granted: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ConsentResponse {
    /// Every scope in the catalogue; scopes never decided read as not granted.
    pub consents: Vec<ConsentStatus>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ConsentChangeRequest {
    pub scopes: Vec<String>,
    #[serde(default = "default_granted")]
    pub granted: bool,
}

fn default_granted() -> bool {
    true
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/consent", get(get_consents))
        .route("/v1/consent/grant-bulk", post(set_consents))
}

fn parse_scopes(raw: &[String]) -> Result<Vec<ConsentScope>, AppError> {
    if raw.is_empty() {
        return Err(AppError::Validation {
            message: "scopes must not be empty".to_string(),
            field: Some("scopes".to_string()),
            received: None,
            docs_hint: None,
        });
    }
    let mut scopes = Vec::with_capacity(raw.len());
    for name in raw {
        let scope = ConsentScope::parse(name).ok_or_else(|| AppError::Validation {
            message: format!("unknown consent scope '{name}'"),
            field: Some("scopes".to_string()),
            received: Some(serde_json::Value::String(name.clone())),
            docs_hint: Some(format!(
                "Known scopes: {}",
                ConsentScope::ALL.map(|s| s.as_str()).join(", ")
            )),
        })?;
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    Ok(scopes)
}

async fn consent_response(state: &AppState, user_id: Uuid) -> Result<ConsentResponse, AppError> {
    let granted = load_consents(&state.db, user_id).await?;
    Ok(ConsentResponse {
        consents: ConsentScope::ALL
            .into_iter()
            .map(|scope| ConsentStatus {
                scope,
                granted: granted.get(&scope).copied().unwrap_or(false),
            })
            .collect(),
    })
}

/// GET /v1/consent: current decision for every scope
#[utoipa::path(
    get,
    path = "/v1/consent",
    responses(
        (status = 200, description = "Consent state", body = ConsentResponse),
        (status = 401, description = "Missing caller identity", body = twin_core::error::ApiError),
    ),
    security(("user_id_header" = [])),
    tag = "consent"
)]
pub async fn get_consents(
    user: AuthenticatedUser,
    State(state): State<AppState>,
) -> Result<Json<ConsentResponse>, AppError> {
    consent_response(&state, user.user_id).await.map(Json)
}

/// POST /v1/consent/grant-bulk: grant (or with `granted: false`, revoke) several scopes
#[utoipa::path(
    post,
    path = "/v1/consent/grant-bulk",
    request_body = ConsentChangeRequest,
    responses(
        (status = 200, description = "Updated consent state", body = ConsentResponse),
        (status = 400, description = "Unknown scope", body = twin_core::error::ApiError),
    ),
    security(("user_id_header" = [])),
    tag = "consent"
)]
pub async fn set_consents(
    user: AuthenticatedUser,
    State(state): State<AppState>,
    AppJson(request): AppJson<ConsentChangeRequest>,
) -> Result<Json<ConsentResponse>, AppError> {
    let scopes = parse_scopes(&request.scopes)?;

    let mut tx = state.db.begin().await?;
    for scope in &scopes {
        sqlx::query(
            "INSERT INTO user_consents (user_id, scope, granted, granted_at, revoked_at, source) \
             VALUES ($1, $2, $3, CASE WHEN $3 THEN now() END, CASE WHEN $3 THEN NULL ELSE now() END, 'api') \
             ON CONFLICT (user_id, scope) DO UPDATE SET \
               granted = EXCLUDED.granted, \
               granted_at = COALESCE(EXCLUDED.granted_at, user_consents.granted_at), \
               revoked_at = EXCLUDED.revoked_at",
        )
        .bind(user.user_id)
        .bind(scope.as_str())
        .bind(request.granted)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!(
        user_id = %user.user_id,
        scopes = ?scopes,
        granted = request.granted,
        "consent updated"
    );

    consent_response(&state, user.user_id).await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_are_parsed_and_deduplicated() {
        let raw = vec![
            "sleep_data".to_string(),
            "chat_history".to_string(),
            "sleep_data".to_string(),
        ];
        assert_eq!(
            parse_scopes(&raw).unwrap(),
            vec![ConsentScope::SleepData, ConsentScope::ChatHistory]
        );
    }

    #[test]
    fn unknown_scope_is_a_validation_error() {
        match parse_scopes(&["dna_data".to_string()]) {
            Err(AppError::Validation { received, .. }) => {
                assert_eq!(received, Some(serde_json::json!("dna_data")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn empty_request_is_rejected() {
        assert!(parse_scopes(&[]).is_err());
    }

    #[test]
    fn granted_defaults_to_true() {
        let request: ConsentChangeRequest =
            serde_json::from_str(r#"{"scopes": ["glucose_data"]}"#).unwrap();
        assert!(request.granted);
    }
}
