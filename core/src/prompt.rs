//! Prompt assembly for the generation service.
//!
//! Pure string templating. Identical inputs produce byte-identical prompts.

use std::fmt::Write as _;
use std::sync::LazyLock;

use crate::intent::{Intent, IntentResult};
use crate::safety::{DISCLAIMER_TEXT, INSUFFICIENT_INFORMATION};
use crate::signals::EvaluationResult;

pub const NO_REFERENCES: &str = "NO_REFERENCES_FOUND";
pub const NO_SIGNALS: &str = "No signals available.";
const NONE: &str = "None";

/// Fixed system instruction. Ends with the disclaimer the model must repeat.
pub static SYSTEM_PROMPT: LazyLock<String> = LazyLock::new(|| {
    format!(
        "You are a health explanation assistant.

NON-NEGOTIABLE RULES:
- Use ONLY the provided FACTS. Do not add new medical facts.
- Do NOT diagnose conditions.
- Do NOT recommend starting/stopping/changing medications.
- Do NOT invent numbers, thresholds, or risks not present in FACTS.
- If the user's question cannot be answered using FACTS, say:
  \"{INSUFFICIENT_INFORMATION}\"

Tone:
- Speak in a natural, calm, human tone, like a supportive health companion.
- Avoid robotic phrases like \"based on the provided facts\" or \"according to the facts.\"
- Prefer: \"Based on the data you shared,\" \"From what I can see here,\" \"Looking at your recent readings.\"
- Be concise, warm, and conversational. Use contractions where natural.
- Highlight key numbers once, then explain.

Always end with this disclaimer (verbatim):
{DISCLAIMER_TEXT}"
    )
});

/// Intent-specific answer shape.
pub const fn response_template(intent: Intent) -> &'static str {
    match intent {
        Intent::SleepRecap => {
            "1) Brief sleep recap.\n\
             2) Why it matters.\n\
             3) One gentle next step if listed in recommendations.\n\
             4) One short follow-up question if needed."
        }
        Intent::LabExplanation => {
            "Explain the lab value, what range it is in, and why it matters. Keep it short."
        }
        Intent::RiskExplanation => {
            "Summarize the current risks already listed. Be calm and non-alarming."
        }
        Intent::ActionPlan => {
            "List 1-2 recommendations already provided. Do not invent new advice."
        }
        Intent::TrendCheck => {
            "Describe trend direction if present; otherwise say trend is not available."
        }
        Intent::SafetyMedication => {
            "Refuse to give medication guidance and suggest speaking with a clinician."
        }
        Intent::DiagnosisRequest => {
            "Explain ranges and say this is not a diagnosis; advise clinician consultation."
        }
        Intent::GeneralChat => "Give a concise, friendly explanation based only on the facts.",
    }
}

/// One line per signal, followed by recommendations and doctor flags when present.
pub fn summarize_facts(facts: &EvaluationResult) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(facts.signals.len() + 2);
    for signal in &facts.signals {
        let mut line = format!(
            "- {}: {} ({}, {})",
            signal.name,
            signal.display_value(),
            signal.status,
            signal.severity.as_str()
        );
        let _ = write!(line, " | why: {}", signal.explanation.why_it_matters);
        if let Some(trend) = &signal.trend {
            let _ = write!(
                line,
                " | trend: {} (conf {})",
                trend.direction.as_str(),
                trend.confidence
            );
        }
        lines.push(line);
    }
    if !facts.recommendations.is_empty() {
        lines.push(format!(
            "Recommendations: {}",
            join_set(facts.recommendations.iter())
        ));
    }
    if !facts.doctor_flags.is_empty() {
        lines.push(format!(
            "Doctor flags: {}",
            join_set(facts.doctor_flags.iter())
        ));
    }
    lines.join("\n")
}

fn join_set<'a>(items: impl Iterator<Item = &'a String>) -> String {
    items.map(String::as_str).collect::<Vec<_>>().join("; ")
}

fn or_none(lines: &[String], separator: &str, sentinel: &str) -> String {
    if lines.is_empty() {
        sentinel.to_string()
    } else {
        lines.join(separator)
    }
}

/// Inputs to [`build_prompt`] besides the question.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub facts: &'a EvaluationResult,
    pub intent: &'a IntentResult,
    pub retrieved_docs: &'a [String],
    pub chat_summaries: &'a [String],
    pub memory_snippets: &'a [String],
    pub clarifier: Option<&'a str>,
}

/// Build `(system_prompt, user_prompt)`.
pub fn build_prompt(question: &str, ctx: PromptContext<'_>) -> (String, String) {
    let facts = summarize_facts(ctx.facts);
    let facts = if facts.is_empty() {
        NO_SIGNALS.to_string()
    } else {
        facts
    };
    let clarifier = ctx.clarifier.filter(|c| !c.is_empty()).unwrap_or(NONE);

    let user_prompt = format!(
        "USER QUESTION:
{question}

INTENT:
{intent} (confidence {confidence})

FACTS (authoritative):
{facts}

CHAT SUMMARIES (this chat only, brief):
{summaries}

USER MEMORY (user-scoped, brief; no raw values):
{memory}

MEDICAL REFERENCES (do not contradict FACTS):
{references}

RESPONSE TEMPLATE:
{template}

CLARIFYING (ask only if needed):
{clarifier}",
        question = question.trim(),
        intent = ctx.intent.intent,
        confidence = ctx.intent.confidence,
        summaries = or_none(ctx.chat_summaries, "\n", NONE),
        memory = or_none(ctx.memory_snippets, "\n", NONE),
        references = or_none(ctx.retrieved_docs, "\n\n", NO_REFERENCES),
        template = response_template(ctx.intent.intent),
    );

    (SYSTEM_PROMPT.clone(), user_prompt)
}
