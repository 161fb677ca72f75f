//! Keyword intent classification.
//!
//! Intents are checked in a fixed priority order and the first one with at
//! least one keyword hit wins, so "how did I sleep after my medication" is a
//! sleep recap, not a medication question. Do not reorder the table.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::health::RawHealthState;

pub const MULTI_HIT_CONFIDENCE: f64 = 0.9;
pub const SINGLE_HIT_CONFIDENCE: f64 = 0.75;
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    SleepRecap,
    LabExplanation,
    RiskExplanation,
    ActionPlan,
    TrendCheck,
    SafetyMedication,
    DiagnosisRequest,
    GeneralChat,
}

impl Intent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SleepRecap => "SLEEP_RECAP",
            Self::LabExplanation => "LAB_EXPLANATION",
            Self::RiskExplanation => "RISK_EXPLANATION",
            Self::ActionPlan => "ACTION_PLAN",
            Self::TrendCheck => "TREND_CHECK",
            Self::SafetyMedication => "SAFETY_MEDICATION",
            Self::DiagnosisRequest => "DIAGNOSIS_REQUEST",
            Self::GeneralChat => "GENERAL_CHAT",
        }
    }

    /// Fields the intent needs to answer well, as (display name, raw key).
    pub const fn required_fields(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::SleepRecap => &[("Sleep Duration", "sleep_hours")],
            _ => &[],
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority-ordered keyword table. Keywords match as lower-case substrings.
const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (Intent::SleepRecap, &["sleep", "asleep", "rest"]),
    (
        Intent::LabExplanation,
        &["ldl", "hdl", "cholesterol", "triglyceride", "glucose", "lab", "test"],
    ),
    (Intent::RiskExplanation, &["danger", "risky", "risk", "concern"]),
    (
        Intent::ActionPlan,
        &["what should i do", "next step", "improve", "fix", "better"],
    ),
    (
        Intent::TrendCheck,
        &["trend", "improving", "worse", "getting better", "progress"],
    ),
    (
        Intent::SafetyMedication,
        &["med", "medication", "dose", "insulin", "pill", "tablet", "stop", "start"],
    ),
    (
        Intent::DiagnosisRequest,
        &["do i have", "am i", "diagnose", "diagnosis"],
    ),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IntentResult {
    pub intent: Intent,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub matched_keywords: Vec<String>,
    pub required_fields: Vec<String>,
    pub missing_fields: Vec<String>,
}

impl IntentResult {
    /// Follow-up question for the first missing field, if any.
    pub fn clarifying_question(&self) -> Option<String> {
        self.missing_fields.first().map(|field| {
            format!(
                "Could you share your {} so I can be more specific?",
                field.to_lowercase()
            )
        })
    }
}

pub fn classify(question: &str, raw: &RawHealthState) -> IntentResult {
    let q = question.to_lowercase();

    let (intent, matched_keywords, confidence) = INTENT_KEYWORDS
        .iter()
        .find_map(|(intent, keywords)| {
            let hits: Vec<String> = keywords
                .iter()
                .filter(|kw| q.contains(**kw))
                .map(|kw| kw.to_string())
                .collect();
            if hits.is_empty() {
                return None;
            }
            let confidence = if hits.len() >= 2 {
                MULTI_HIT_CONFIDENCE
            } else {
                SINGLE_HIT_CONFIDENCE
            };
            Some((*intent, hits, confidence))
        })
        .unwrap_or((Intent::GeneralChat, Vec::new(), FALLBACK_CONFIDENCE));

    let required = intent.required_fields();
    let missing_fields = required
        .iter()
        .filter(|(_, key)| !raw.contains_key_ignore_case(key))
        .map(|(name, _)| name.to_string())
        .collect();

    IntentResult {
        intent,
        confidence,
        matched_keywords,
        required_fields: required.iter().map(|(name, _)| name.to_string()).collect(),
        missing_fields,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn empty() -> RawHealthState {
        RawHealthState::new()
    }

    #[test]
    fn medication_question_is_safety_medication() {
        let res = classify("Should I stop my medication?", &empty());
        assert_eq!(res.intent, Intent::SafetyMedication);
        assert!(res.confidence >= 0.7);
        assert_eq!(res.confidence, MULTI_HIT_CONFIDENCE);
        assert!(res.matched_keywords.contains(&"stop".to_string()));
    }

    #[test]
    fn sleep_wins_over_later_intents() {
        let res = classify("How did I sleep after my medication?", &empty());
        assert_eq!(res.intent, Intent::SleepRecap);
    }

    #[test]
    fn sleep_recap_reports_missing_sleep_hours() {
        let res = classify("How did I sleep?", &empty());
        assert_eq!(res.intent, Intent::SleepRecap);
        assert_eq!(res.confidence, SINGLE_HIT_CONFIDENCE);
        assert_eq!(res.required_fields, vec!["Sleep Duration"]);
        assert_eq!(res.missing_fields, vec!["Sleep Duration"]);
        assert_eq!(
            res.clarifying_question().as_deref(),
            Some("Could you share your sleep duration so I can be more specific?")
        );

        let raw = RawHealthState::from_value(json!({"sleep_hours": 7}));
        let res = classify("How did I sleep?", &raw);
        assert!(res.missing_fields.is_empty());
        assert_eq!(res.clarifying_question(), None);
    }

    #[test]
    fn required_field_lookup_ignores_key_case() {
        let raw = RawHealthState::from_value(json!({"SLEEP_HOURS": 6.5}));
        let res = classify("How did I sleep?", &raw);
        assert!(res.missing_fields.is_empty());
    }

    #[test]
    fn lab_question() {
        let res = classify("Why is my glucose high?", &empty());
        assert_eq!(res.intent, Intent::LabExplanation);
    }

    #[test]
    fn unmatched_question_is_general_chat() {
        let res = classify("Hello there", &empty());
        assert_eq!(res.intent, Intent::GeneralChat);
        assert_eq!(res.confidence, FALLBACK_CONFIDENCE);
        assert!(res.matched_keywords.is_empty());
        assert!(res.required_fields.is_empty());
    }

    #[test]
    fn intent_serializes_in_upper_snake_case() {
        assert_eq!(
            serde_json::to_value(Intent::SafetyMedication).unwrap(),
            json!("SAFETY_MEDICATION")
        );
        assert_eq!(Intent::TrendCheck.to_string(), "TREND_CHECK");
    }
}
