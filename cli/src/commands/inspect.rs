//! Offline runs of the deterministic stages. Nothing here talks to the API,
//! the generation service, or any store.

use clap::Subcommand;
use serde_json::json;
use twin_core::consent::scopes_required;
use twin_core::intent::classify;
use twin_core::prompt::{PromptContext, build_prompt};
use twin_core::safety::{check_missing_data, is_forbidden_question};
use twin_core::signals::evaluate;

use super::chat::HealthDataArgs;
use crate::util::{print_output, read_raw_state};

#[derive(Subcommand)]
pub enum InspectCommands {
    /// Evaluate readings into signals, risks, recommendations and doctor flags
    Evaluate {
        #[command(flatten)]
        input: HealthDataArgs,
    },
    /// Classify a question into an intent
    Classify {
        question: String,
        #[command(flatten)]
        input: HealthDataArgs,
    },
    /// Run the safety gate: forbidden-question and missing-data checks
    Screen {
        question: String,
        #[command(flatten)]
        input: HealthDataArgs,
    },
    /// List the consent scopes a request would need
    Scopes {
        #[command(flatten)]
        input: HealthDataArgs,
        /// Treat the request as chat-bound (adds chat_history and memory_personalization)
        #[arg(long)]
        chat: bool,
    },
    /// Render the system and user prompts without calling the generator
    Prompt {
        question: String,
        #[command(flatten)]
        input: HealthDataArgs,
        /// Reference snippet to include (repeatable)
        #[arg(long = "doc")]
        docs: Vec<String>,
        /// Print only the user prompt
        #[arg(long)]
        user_only: bool,
    },
}

pub fn run(command: InspectCommands) -> i32 {
    match command {
        InspectCommands::Evaluate { input } => {
            let raw = read_raw_state(input.data.as_deref(), input.file.as_deref());
            print_output(&evaluate(&raw))
        }
        InspectCommands::Classify { question, input } => {
            let raw = read_raw_state(input.data.as_deref(), input.file.as_deref());
            let intent = classify(&question, &raw);
            let clarifier = intent.clarifying_question();
            print_output(&json!({
                "intent": intent,
                "clarifying_question": clarifier,
            }))
        }
        InspectCommands::Screen { question, input } => {
            let raw = read_raw_state(input.data.as_deref(), input.file.as_deref());
            let missing = check_missing_data(&question, &evaluate(&raw));
            print_output(&json!({
                "forbidden": is_forbidden_question(&question),
                "missing_data": missing.missing,
                "message": missing.message,
            }))
        }
        InspectCommands::Scopes { input, chat } => {
            let raw = read_raw_state(input.data.as_deref(), input.file.as_deref());
            print_output(&scopes_required(&raw, chat, chat))
        }
        InspectCommands::Prompt {
            question,
            input,
            docs,
            user_only,
        } => {
            let raw = read_raw_state(input.data.as_deref(), input.file.as_deref());
            let facts = evaluate(&raw);
            let intent = classify(&question, &raw);
            let clarifier = intent.clarifying_question();
            let (system, user) = build_prompt(
                &question,
                PromptContext {
                    facts: &facts,
                    intent: &intent,
                    retrieved_docs: &docs,
                    chat_summaries: &[],
                    memory_snippets: &[],
                    clarifier: clarifier.as_deref(),
                },
            );
            if user_only {
                println!("{user}");
            } else {
                println!("=== system ===\n{system}\n\n=== user ===\n{user}");
            }
            0
        }
    }
}
