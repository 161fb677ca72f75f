//! Consent scope resolution.
//!
//! The resolver is stateless: it derives which scopes a request needs from the
//! raw keys it carries, and compares them against a caller-supplied grant map.
//! Anything not explicitly granted counts as missing.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::health::RawHealthState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConsentScope {
    ProfileBasic,
    ChatHistory,
    MemoryPersonalization,
    SleepData,
    ActivityData,
    StepsActivityData,
    HeartRateData,
    BloodPressureData,
    GlucoseData,
    WearablesConnect,
    WearablesSync,
    FutureWearables,
}

impl ConsentScope {
    pub const ALL: [ConsentScope; 12] = [
        Self::ProfileBasic,
        Self::ChatHistory,
        Self::MemoryPersonalization,
        Self::SleepData,
        Self::ActivityData,
        Self::StepsActivityData,
        Self::HeartRateData,
        Self::BloodPressureData,
        Self::GlucoseData,
        Self::WearablesConnect,
        Self::WearablesSync,
        Self::FutureWearables,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProfileBasic => "profile_basic",
            Self::ChatHistory => "chat_history",
            Self::MemoryPersonalization => "memory_personalization",
            Self::SleepData => "sleep_data",
            Self::ActivityData => "activity_data",
            Self::StepsActivityData => "steps_activity_data",
            Self::HeartRateData => "heart_rate_data",
            Self::BloodPressureData => "blood_pressure_data",
            Self::GlucoseData => "glucose_data",
            Self::WearablesConnect => "wearables_connect",
            Self::WearablesSync => "wearables_sync",
            Self::FutureWearables => "future_wearables",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|scope| scope.as_str() == value)
    }
}

impl std::fmt::Display for ConsentScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw field → scopes it requires. Fields not listed require no scope.
pub const FIELD_SCOPES: &[(&str, &[ConsentScope])] = &[
    ("sleep_hours", &[ConsentScope::SleepData]),
    ("activity_minutes", &[ConsentScope::ActivityData]),
    ("steps", &[ConsentScope::StepsActivityData]),
    (
        "activity_steps",
        &[ConsentScope::StepsActivityData, ConsentScope::ActivityData],
    ),
    (
        "bp_systolic",
        &[ConsentScope::BloodPressureData, ConsentScope::HeartRateData],
    ),
    (
        "bp_diastolic",
        &[ConsentScope::BloodPressureData, ConsentScope::HeartRateData],
    ),
    ("heart_rate", &[ConsentScope::HeartRateData]),
    ("resting_heart_rate", &[ConsentScope::HeartRateData]),
    ("heart_rate_avg", &[ConsentScope::HeartRateData]),
    ("fasting_glucose", &[ConsentScope::GlucoseData]),
];

pub fn scopes_for_field(field: &str) -> &'static [ConsentScope] {
    FIELD_SCOPES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, scopes)| *scopes)
        .unwrap_or(&[])
}

pub fn scopes_required(
    raw: &RawHealthState,
    uses_chat_history: bool,
    uses_memory: bool,
) -> BTreeSet<ConsentScope> {
    let mut required: BTreeSet<ConsentScope> = raw
        .keys()
        .flat_map(|key| scopes_for_field(key).iter().copied())
        .collect();
    if uses_chat_history {
        required.insert(ConsentScope::ChatHistory);
    }
    if uses_memory {
        required.insert(ConsentScope::MemoryPersonalization);
    }
    required
}

/// Required scopes not granted. Unknown or absent entries count as not granted.
pub fn missing_scopes(
    required: &BTreeSet<ConsentScope>,
    granted: &BTreeMap<ConsentScope, bool>,
) -> Vec<ConsentScope> {
    required
        .iter()
        .copied()
        .filter(|scope| !granted.get(scope).copied().unwrap_or(false))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn glucose_in_chat_requires_chat_and_memory_scopes() {
        let raw = RawHealthState::from_value(json!({"fasting_glucose": 118}));
        let required = scopes_required(&raw, true, true);
        assert!(required.contains(&ConsentScope::GlucoseData));
        assert!(required.contains(&ConsentScope::ChatHistory));
        assert!(required.contains(&ConsentScope::MemoryPersonalization));
        assert_eq!(required.len(), 3);
    }

    #[test]
    fn blood_pressure_implies_heart_rate() {
        let raw = RawHealthState::from_value(json!({"bp_diastolic": 85}));
        let required = scopes_required(&raw, false, false);
        assert_eq!(
            required.into_iter().collect::<Vec<_>>(),
            vec![ConsentScope::HeartRateData, ConsentScope::BloodPressureData]
        );
    }

    #[test]
    fn unscoped_fields_need_nothing() {
        let raw = RawHealthState::from_value(json!({"ldl": 130, "bmi": 24, "history": {}}));
        assert!(scopes_required(&raw, false, false).is_empty());
    }

    #[test]
    fn missing_fails_closed() {
        let raw = RawHealthState::from_value(json!({"sleep_hours": 6, "steps": 9000}));
        let required = scopes_required(&raw, true, false);

        let mut granted = BTreeMap::new();
        granted.insert(ConsentScope::SleepData, true);
        granted.insert(ConsentScope::StepsActivityData, false);

        assert_eq!(
            missing_scopes(&required, &granted),
            vec![ConsentScope::ChatHistory, ConsentScope::StepsActivityData]
        );

        granted.insert(ConsentScope::StepsActivityData, true);
        granted.insert(ConsentScope::ChatHistory, true);
        assert!(missing_scopes(&required, &granted).is_empty());
    }

    #[test]
    fn every_field_table_entry_maps_to_catalogue_scopes() {
        for (field, scopes) in FIELD_SCOPES {
            assert!(!scopes.is_empty(), "{field} lists no scope");
            for scope in *scopes {
                assert_eq!(ConsentScope::parse(scope.as_str()), Some(*scope));
            }
        }
    }

    #[test]
    fn scope_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_value(ConsentScope::MemoryPersonalization).unwrap(),
            json!("memory_personalization")
        );
        assert_eq!(ConsentScope::parse("nope"), None);
    }
}
