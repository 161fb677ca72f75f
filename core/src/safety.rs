//! Safety gates around generation.
//!
//! Three independent checks with no shared state: a hard pre-generation stop
//! for forbidden topics, a soft pre-generation stop when the question refers
//! to data that was not supplied, and a post-generation red-flag scan.

use std::sync::LazyLock;

use regex::Regex;

use crate::signals::EvaluationResult;

pub const DISCLAIMER_TEXT: &str = "This app provides educational health insights and trends. \
It does not diagnose or replace medical advice. \
Always consult a qualified healthcare professional.";

pub const INSUFFICIENT_INFORMATION: &str = "I don’t have enough information to answer that safely.";

pub const FORBIDDEN_REPLY: &str = "I can’t help with diagnosis or medication decisions. \
Please consult a qualified healthcare professional.";

/// Vocabulary that is never allowed in a generated reply, matched as substrings.
pub const RED_FLAG_TERMS: [&str; 5] = ["cancer", "stroke", "medication", "dose", "emergency"];

/// Reply used whenever generation is empty, fails, or trips the post-check.
pub fn fallback_reply() -> String {
    format!("{INSUFFICIENT_INFORMATION}\n\n{DISCLAIMER_TEXT}")
}

static FORBIDDEN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(stop|start|change|increase|decrease)\b.*\b(med|medicine|medication|dose|insulin)\b",
        r"(?i)\b(what medication|what drug|what dose)\b",
        r"(?i)\b(do i have|am i)\b.*\b(diabetes|cancer|stroke|heart attack)\b",
        r"(?i)\bdiagnos(e|is)\b",
        r"(?i)\bemergency\b|\burgent\b|\bcall 911\b",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("valid forbidden-topic regex"))
    .collect()
});

struct MissingDataRule {
    topic: Regex,
    required_signal: &'static str,
    message: &'static str,
}

/// Ordered; the first rule whose topic matches and whose signal is absent wins.
static MISSING_DATA_RULES: LazyLock<Vec<MissingDataRule>> = LazyLock::new(|| {
    [
        (
            r"(?i)\bsleep\b",
            "Sleep Duration",
            "I don’t have sleep data for the timeframe you asked about, so I can’t answer that accurately.",
        ),
        (
            r"(?i)\bglucose\b|\bsugar\b",
            "Fasting Glucose",
            "I don’t have glucose data to answer that safely. If you share your fasting glucose value, I can explain it.",
        ),
        (
            r"(?i)\bbp\b|\bblood pressure\b",
            "Blood Pressure",
            "I don’t have blood pressure values (systolic/diastolic) to answer that safely.",
        ),
        (
            r"(?i)\bldl\b|\bhdl\b|\btriglycerides\b|\bcholesterol\b",
            "LDL",
            "I don’t have lipid values to answer that safely. If you share LDL/HDL/triglycerides, I can explain them.",
        ),
    ]
    .into_iter()
    .map(|(pattern, required_signal, message)| MissingDataRule {
        topic: Regex::new(pattern).expect("valid missing-data regex"),
        required_signal,
        message,
    })
    .collect()
});

/// True when the question touches a hard-blocked topic. Blank questions are allowed.
pub fn is_forbidden_question(question: &str) -> bool {
    let q = question.trim();
    if q.is_empty() {
        return false;
    }
    FORBIDDEN_PATTERNS.iter().any(|p| p.is_match(q))
}

/// Outcome of [`check_missing_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingData {
    pub missing: bool,
    pub message: String,
}

impl MissingData {
    fn none() -> Self {
        Self {
            missing: false,
            message: String::new(),
        }
    }
}

/// Soft stop: the question asks about a topic but the matching signal is absent.
pub fn check_missing_data(question: &str, facts: &EvaluationResult) -> MissingData {
    let q = question.trim();
    MISSING_DATA_RULES
        .iter()
        .find(|rule| rule.topic.is_match(q) && !facts.has_signal(rule.required_signal))
        .map(|rule| MissingData {
            missing: true,
            message: rule.message.to_string(),
        })
        .unwrap_or_else(MissingData::none)
}

/// Post-generation stop: any red-flag term anywhere in the reply, case-insensitive.
///
/// `facts` is accepted for call-site symmetry with the other gates; signal names
/// never whitelist a red-flag term.
pub fn response_mentions_unknown_terms(reply: &str, _facts: &EvaluationResult) -> bool {
    let lowered = reply.to_lowercase();
    RED_FLAG_TERMS.iter().any(|term| lowered.contains(term))
}
