use clap::{Args, Subcommand};
use serde_json::json;
use uuid::Uuid;

use crate::util::{api_request, exit_error, read_raw_state};

#[derive(Args)]
pub struct HealthDataArgs {
    /// Health readings as inline JSON
    #[arg(long)]
    pub data: Option<String>,
    /// Read health readings from a JSON file ("-" for stdin)
    #[arg(long)]
    pub file: Option<String>,
}

#[derive(Args)]
pub struct ChatArgs {
    /// The question to ask
    pub question: String,
    #[command(flatten)]
    pub input: HealthDataArgs,
    /// Send the turn into an existing chat (enables history and memory)
    #[arg(long)]
    pub chat_id: Option<Uuid>,
}

#[derive(Subcommand)]
pub enum ConsentCommands {
    /// Show the decision for every consent scope
    Show,
    /// Grant scopes
    Grant {
        #[arg(required = true)]
        scopes: Vec<String>,
    },
    /// Revoke scopes
    Revoke {
        #[arg(required = true)]
        scopes: Vec<String>,
    },
}

fn require_user(user_id: Option<&str>) -> &str {
    user_id.unwrap_or_else(|| {
        exit_error(
            "user_id is required for this command",
            Some("Set --user-id or TWIN_USER_ID env var"),
        )
    })
}

pub async fn chat(api_url: &str, user_id: Option<&str>, args: ChatArgs) -> i32 {
    let user_id = require_user(user_id);
    let raw = read_raw_state(args.input.data.as_deref(), args.input.file.as_deref());
    let path = match args.chat_id {
        Some(chat_id) => format!("/v1/chats/{chat_id}/messages"),
        None => "/v1/twin/chat".to_string(),
    };
    api_request(
        api_url,
        reqwest::Method::POST,
        &path,
        Some(user_id),
        Some(json!({"question": args.question, "raw": raw})),
    )
    .await
}

/// Server-side evaluation summary; `twin evaluate` is the offline equivalent.
pub async fn summary(api_url: &str, input: HealthDataArgs) -> i32 {
    let raw = read_raw_state(input.data.as_deref(), input.file.as_deref());
    api_request(
        api_url,
        reqwest::Method::POST,
        "/v1/twin/summary",
        None,
        Some(json!(raw)),
    )
    .await
}

pub async fn new_chat(api_url: &str, user_id: Option<&str>, title: Option<String>) -> i32 {
    let user_id = require_user(user_id);
    api_request(
        api_url,
        reqwest::Method::POST,
        "/v1/chats",
        Some(user_id),
        Some(json!({"title": title})),
    )
    .await
}

pub async fn consent(api_url: &str, user_id: Option<&str>, command: ConsentCommands) -> i32 {
    let user_id = require_user(user_id);
    let (scopes, granted) = match command {
        ConsentCommands::Show => {
            return api_request(
                api_url,
                reqwest::Method::GET,
                "/v1/consent",
                Some(user_id),
                None,
            )
            .await;
        }
        ConsentCommands::Grant { scopes } => (scopes, true),
        ConsentCommands::Revoke { scopes } => (scopes, false),
    };
    api_request(
        api_url,
        reqwest::Method::POST,
        "/v1/consent/grant-bulk",
        Some(user_id),
        Some(json!({"scopes": scopes, "granted": granted})),
    )
    .await
}
