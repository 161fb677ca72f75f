//! Deterministic signal evaluation.
//!
//! Each supported field is classified against a fixed, ordered band table. A
//! value lands in the first band whose upper limit admits it, which keeps the
//! bands exhaustive and non-overlapping. Fields that are absent from the raw
//! state never produce a signal.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::health::{RawHealthState, format_number};
use crate::trend::{Sparkline, Trend, compute_sparkline, compute_trend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Moderate,
    High,
    Critical,
    /// Informational reading that is neither good nor bad on its own.
    Context,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
            Self::Context => "context",
        }
    }
}

/// Fixed grounding text attached to every signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Explanation {
    pub rule: String,
    pub threshold: String,
    pub why_it_matters: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Signal {
    pub name: String,
    #[schema(value_type = Object)]
    pub value: Value,
    pub status: String,
    pub severity: Severity,
    pub explanation: Explanation,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<Trend>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparkline: Option<Sparkline>,
}

impl Signal {
    /// Compact rendering of the value for prompts (`130/85` for blood pressure).
    pub fn display_value(&self) -> String {
        match &self.value {
            Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
            Value::String(s) => s.clone(),
            Value::Object(map) => match (
                map.get("systolic").and_then(Value::as_f64),
                map.get("diastolic").and_then(Value::as_f64),
            ) {
                (Some(sys), Some(dia)) => format!("{}/{}", format_number(sys), format_number(dia)),
                _ => self.value.to_string(),
            },
            other => other.to_string(),
        }
    }
}

/// Output of [`evaluate`]. Sets are deduplicated and serialize in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EvaluationResult {
    pub signals: Vec<Signal>,
    pub risks: BTreeSet<String>,
    pub recommendations: BTreeSet<String>,
    pub doctor_flags: BTreeSet<String>,
}

impl EvaluationResult {
    pub fn has_signal(&self, name: &str) -> bool {
        self.signals.iter().any(|s| s.name == name)
    }

    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == name)
    }
}

// ── Band tables ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Upper {
    /// value < limit
    Below(f64),
    /// value <= limit
    AtMost(f64),
    Unbounded,
}

impl Upper {
    fn admits(self, value: f64) -> bool {
        match self {
            Upper::Below(limit) => value < limit,
            Upper::AtMost(limit) => value <= limit,
            Upper::Unbounded => true,
        }
    }
}

#[derive(Debug)]
struct Band {
    upper: Upper,
    status: &'static str,
    severity: Severity,
    rule: &'static str,
    threshold: &'static str,
    details: &'static str,
    risks: &'static [&'static str],
    recommendations: &'static [&'static str],
    doctor_flags: &'static [&'static str],
}

const fn band(
    upper: Upper,
    status: &'static str,
    severity: Severity,
    rule: &'static str,
    threshold: &'static str,
) -> Band {
    Band {
        upper,
        status,
        severity,
        rule,
        threshold,
        details: "",
        risks: &[],
        recommendations: &[],
        doctor_flags: &[],
    }
}

impl Band {
    const fn details(mut self, details: &'static str) -> Self {
        self.details = details;
        self
    }

    const fn risks(mut self, risks: &'static [&'static str]) -> Self {
        self.risks = risks;
        self
    }

    const fn recommend(mut self, recommendations: &'static [&'static str]) -> Self {
        self.recommendations = recommendations;
        self
    }

    const fn flag(mut self, doctor_flags: &'static [&'static str]) -> Self {
        self.doctor_flags = doctor_flags;
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum Orientation {
    LowerIsBetter,
    HigherIsBetter,
}

#[derive(Debug)]
struct FieldRule {
    field: &'static str,
    signal: &'static str,
    why_it_matters: &'static str,
    trend: Option<Orientation>,
    bands: &'static [Band],
}

use Orientation::{HigherIsBetter, LowerIsBetter};
use Severity::{Context, Critical, High, Low, Moderate};
use Upper::{AtMost, Below, Unbounded};

const CARDIO: &[&str] = &["cardiovascular_risk"];

static FASTING_GLUCOSE: FieldRule = FieldRule {
    field: "fasting_glucose",
    signal: "Fasting Glucose",
    why_it_matters: "Fasting glucose reflects how well the body regulates blood sugar overnight; persistently raised values signal reduced insulin sensitivity.",
    trend: Some(LowerIsBetter),
    bands: &[
        band(Below(100.0), "normal", Low, "Normal fasting glucose", "Below 100 mg/dL"),
        band(AtMost(125.0), "prediabetes_range", Moderate, "Prediabetes range fasting glucose", "100-125 mg/dL")
            .risks(&["insulin_resistance"])
            .recommend(&["Light physical activity after meals", "Reduce refined sugar intake"]),
        band(Unbounded, "diabetes_range", High, "Diabetes range fasting glucose", "Above 125 mg/dL")
            .risks(&["type_2_diabetes_risk"])
            .recommend(&["Schedule medical review for glucose"])
            .flag(&["Consult a doctor for diabetes evaluation"]),
    ],
};

const BLOOD_PRESSURE_WHY: &str = "Blood pressure measures the load on artery walls; sustained high readings strain the heart, kidneys and blood vessels.";

/// Shared band list for blood pressure, ordered from best to worst.
static BLOOD_PRESSURE_BANDS: [Band; 5] = [
    band(Unbounded, "normal", Low, "Normal blood pressure", "Below 120/80 mmHg")
        .details("Below 120/80"),
    band(Unbounded, "elevated", Low, "Elevated blood pressure", "Systolic 120-129 and diastolic below 80 mmHg")
        .details("120-129 systolic, diastolic <80")
        .recommend(&["Monitor blood pressure and reduce sodium"]),
    band(Unbounded, "stage_1_hypertension", Moderate, "Stage 1 hypertension range", "Systolic 130-139 or diastolic 80-89 mmHg")
        .details("130-139 systolic or 80-89 diastolic")
        .risks(CARDIO)
        .recommend(&["Lifestyle changes for blood pressure (salt, activity, weight)"]),
    band(Unbounded, "stage_2_hypertension", High, "Stage 2 hypertension range", "Systolic 140-180 or diastolic 90-120 mmHg")
        .details("140-180 systolic or 90-120 diastolic")
        .risks(CARDIO)
        .recommend(&["Consistent home BP monitoring"])
        .flag(&["Discuss blood pressure management with a clinician"]),
    band(Unbounded, "hypertensive_crisis", Critical, "Hypertensive crisis range", "Systolic above 180 or diastolic above 120 mmHg")
        .details(">180 systolic or >120 diastolic")
        .risks(CARDIO)
        .flag(&["Seek urgent care for severe blood pressure reading"]),
];

/// Systolic thresholds mapped onto indices of [`BLOOD_PRESSURE_BANDS`].
const SYSTOLIC_LEVELS: &[(Upper, usize)] = &[
    (Below(120.0), 0),
    (AtMost(129.0), 1),
    (AtMost(139.0), 2),
    (AtMost(180.0), 3),
    (Unbounded, 4),
];

/// Diastolic has no "elevated" band of its own.
const DIASTOLIC_LEVELS: &[(Upper, usize)] = &[
    (Below(80.0), 0),
    (AtMost(89.0), 2),
    (AtMost(120.0), 3),
    (Unbounded, 4),
];

static TOTAL_CHOLESTEROL: FieldRule = FieldRule {
    field: "total_cholesterol",
    signal: "Total Cholesterol",
    why_it_matters: "Total cholesterol summarises circulating blood fats; higher levels are associated with plaque build-up in arteries.",
    trend: Some(LowerIsBetter),
    bands: &[
        band(Below(200.0), "desirable", Low, "Desirable total cholesterol", "Below 200 mg/dL"),
        band(AtMost(239.0), "borderline_high", Moderate, "Borderline high total cholesterol", "200-239 mg/dL")
            .risks(CARDIO)
            .recommend(&["Increase soluble fiber and reduce saturated fat"]),
        band(Unbounded, "high", High, "High total cholesterol", "240 mg/dL and above")
            .risks(CARDIO)
            .recommend(&["Review lipid profile with a clinician"]),
    ],
};

static LDL: FieldRule = FieldRule {
    field: "ldl",
    signal: "LDL",
    why_it_matters: "LDL carries cholesterol into artery walls; lower LDL is linked to lower long-term cardiovascular risk.",
    trend: Some(LowerIsBetter),
    bands: &[
        band(Below(100.0), "optimal", Low, "Optimal LDL", "Below 100 mg/dL"),
        band(AtMost(129.0), "near_optimal", Low, "Near optimal LDL", "100-129 mg/dL"),
        band(AtMost(159.0), "borderline_high", Moderate, "Borderline high LDL", "130-159 mg/dL")
            .risks(CARDIO)
            .recommend(&["Dietary adjustments to lower LDL"]),
        band(AtMost(189.0), "high", High, "High LDL", "160-189 mg/dL")
            .risks(CARDIO)
            .flag(&["Consider medical review for high LDL"]),
        band(Unbounded, "very_high", High, "Very high LDL", "190 mg/dL and above")
            .risks(CARDIO)
            .flag(&["High LDL requires medical follow-up"]),
    ],
};

static HDL: FieldRule = FieldRule {
    field: "hdl",
    signal: "HDL",
    why_it_matters: "HDL helps clear cholesterol from the bloodstream; higher HDL is generally protective.",
    trend: Some(HigherIsBetter),
    bands: &[
        band(Below(40.0), "low", Moderate, "Low HDL", "Below 40 mg/dL")
            .details("Low protective HDL")
            .risks(CARDIO)
            .recommend(&["Increase physical activity to raise HDL"]),
        band(Below(60.0), "acceptable", Low, "Acceptable HDL", "40-59 mg/dL"),
        band(Unbounded, "protective", Low, "Protective HDL", "60 mg/dL and above"),
    ],
};

static TRIGLYCERIDES: FieldRule = FieldRule {
    field: "triglycerides",
    signal: "Triglycerides",
    why_it_matters: "Triglycerides store excess energy from food; high levels add to cardiovascular and pancreatic risk.",
    trend: Some(LowerIsBetter),
    bands: &[
        band(Below(150.0), "normal", Low, "Normal triglycerides", "Below 150 mg/dL"),
        band(AtMost(199.0), "borderline_high", Moderate, "Borderline high triglycerides", "150-199 mg/dL")
            .recommend(&["Reduce refined carbs and alcohol"]),
        band(AtMost(499.0), "high", High, "High triglycerides", "200-499 mg/dL")
            .risks(CARDIO)
            .flag(&["High triglycerides: discuss with clinician"]),
        band(Unbounded, "very_high", Critical, "Very high triglycerides", "500 mg/dL and above")
            .risks(CARDIO)
            .flag(&["Very high triglycerides: seek medical review"]),
    ],
};

static SLEEP_DURATION: FieldRule = FieldRule {
    field: "sleep_hours",
    signal: "Sleep Duration",
    why_it_matters: "Sleep duration affects recovery, mood, appetite regulation and blood sugar control.",
    trend: Some(HigherIsBetter),
    bands: &[
        band(Below(5.0), "severe_sleep_debt", High, "Severe sleep debt", "Below 5 hours")
            .risks(&["sleep_deprivation_risk"])
            .recommend(&["Prioritize sleep extension and consistent schedule"]),
        band(Below(7.0), "insufficient_sleep", Moderate, "Insufficient sleep", "5 to under 7 hours")
            .recommend(&["Aim for 7-9 hours with consistent bedtime"]),
        band(AtMost(9.0), "optimal", Low, "Optimal sleep duration", "7-9 hours"),
        band(Unbounded, "long_sleep", Context, "Long sleep duration", "More than 9 hours")
            .recommend(&["Review long sleep if accompanied by fatigue"]),
    ],
};

static ACTIVITY: FieldRule = FieldRule {
    field: "activity_minutes",
    signal: "Activity",
    why_it_matters: "Daily movement supports heart health, insulin sensitivity, weight and mood.",
    trend: Some(HigherIsBetter),
    bands: &[
        band(Below(20.0), "sedentary", Moderate, "Sedentary day", "Below 20 active minutes")
            .recommend(&["Light walks after meals"]),
        band(Below(40.0), "light", Moderate, "Lightly active day", "20 to under 40 active minutes")
            .recommend(&["Build toward 40-60 minutes most days"]),
        band(AtMost(60.0), "moderate", Low, "Moderately active day", "40-60 active minutes"),
        band(Unbounded, "active", Low, "Active day", "More than 60 active minutes"),
    ],
};

static BMI: FieldRule = FieldRule {
    field: "bmi",
    signal: "BMI",
    why_it_matters: "BMI is a rough weight-for-height screen; it is linked to cardiometabolic risk at the population level.",
    trend: Some(LowerIsBetter),
    bands: &[
        band(Below(18.5), "underweight", Context, "Underweight BMI", "Below 18.5")
            .recommend(&["Discuss nutrition to reach healthy weight"]),
        band(Below(25.0), "normal", Low, "Normal BMI", "18.5 to under 25"),
        band(Below(30.0), "overweight", Moderate, "Overweight BMI", "25 to under 30")
            .recommend(&["Focus on gradual weight loss and activity"]),
        band(Unbounded, "obesity", High, "Obesity range BMI", "30 and above")
            .risks(&["cardiometabolic_risk"])
            .recommend(&["Structured weight plan with clinician input"]),
    ],
};

static VITAMIN_D: FieldRule = FieldRule {
    field: "vitamin_d",
    signal: "Vitamin D",
    why_it_matters: "Vitamin D supports bone health, muscle function and immune regulation.",
    trend: Some(HigherIsBetter),
    bands: &[
        band(Below(20.0), "deficient", Moderate, "Vitamin D deficiency", "Below 20 ng/mL")
            .recommend(&["Discuss supplementation with clinician"]),
        band(Below(30.0), "insufficient", Moderate, "Vitamin D insufficiency", "20 to under 30 ng/mL")
            .recommend(&["Increase safe sunlight or dietary vitamin D"]),
        band(Unbounded, "adequate", Low, "Adequate vitamin D", "30 ng/mL and above"),
    ],
};

static VITAMIN_B12: FieldRule = FieldRule {
    field: "vitamin_b12",
    signal: "Vitamin B12",
    why_it_matters: "Vitamin B12 is needed for nerve function and red blood cell production.",
    trend: Some(HigherIsBetter),
    bands: &[
        band(Below(200.0), "deficient", Moderate, "Vitamin B12 deficiency", "Below 200 pg/mL")
            .recommend(&["Assess B12 intake or absorption with clinician"]),
        band(Below(300.0), "borderline_low", Moderate, "Borderline low vitamin B12", "200 to under 300 pg/mL")
            .recommend(&["Increase B12 sources and recheck"]),
        band(Unbounded, "adequate", Low, "Adequate vitamin B12", "300 pg/mL and above"),
    ],
};

static FERRITIN: FieldRule = FieldRule {
    field: "ferritin",
    signal: "Ferritin",
    why_it_matters: "Ferritin reflects stored iron; low stores can cause fatigue while very high values need context.",
    trend: None,
    bands: &[
        band(Below(30.0), "low", Moderate, "Low ferritin", "Below 30 ng/mL")
            .risks(&["iron_deficiency_risk"])
            .recommend(&["Check iron intake and discuss with clinician"]),
        band(AtMost(400.0), "normal", Low, "Normal ferritin", "30-400 ng/mL"),
        band(Unbounded, "high", Moderate, "High ferritin", "Above 400 ng/mL")
            .flag(&["High ferritin: consider clinical evaluation"]),
    ],
};

static CYCLE_LENGTH: FieldRule = FieldRule {
    field: "cycle_length_days",
    signal: "Menstrual Cycle",
    why_it_matters: "Cycle length is a marker of hormonal balance; persistent changes are worth tracking.",
    trend: None,
    bands: &[
        band(Below(21.0), "very_short_cycle", Moderate, "Very short menstrual cycle", "Below 21 days")
            .recommend(&["Track cycles; consider clinician review"]),
        band(AtMost(35.0), "regular_cycle_range", Low, "Regular cycle length", "21-35 days"),
        band(Unbounded, "long_cycle", Moderate, "Long menstrual cycle", "More than 35 days")
            .recommend(&["Irregular or long cycles: monitor and consult if persistent"]),
    ],
};

/// Only two or more missed periods produce a signal.
static PERIODS_MISSED: Band = band(
    Unbounded,
    "missed_cycles",
    Moderate,
    "Multiple missed periods",
    "2 or more missed periods",
)
.flag(&["Multiple missed cycles: consider medical evaluation"]);
const PERIODS_MISSED_WHY: &str =
    "Missed periods can reflect stress, weight change or hormonal conditions worth checking.";
const PERIODS_MISSED_MIN: f64 = 2.0;

static CYCLE_IRREGULAR: Band = band(
    Unbounded,
    "irregular_cycles",
    Moderate,
    "Irregular cycles reported",
    "Cycle irregularity flag set",
)
.recommend(&["Track cycles and discuss patterns with clinician"]);
const CYCLE_IRREGULAR_WHY: &str =
    "Irregular cycles make timing less predictable and can point to hormonal changes.";

static STRESS: FieldRule = FieldRule {
    field: "stress_level",
    signal: "Stress",
    why_it_matters: "Ongoing stress affects sleep, blood pressure, appetite and mood.",
    trend: Some(LowerIsBetter),
    bands: &[
        band(Below(5.0), "manageable_stress", Low, "Manageable stress", "Below 5 on a 0-10 scale"),
        band(AtMost(7.0), "moderate_stress", Moderate, "Moderate stress", "5-7 on a 0-10 scale"),
        band(Unbounded, "high_stress", Moderate, "High stress", "Above 7 on a 0-10 scale")
            .recommend(&["Short daily stress-reduction practice"]),
    ],
};

static MOOD_VARIABILITY: FieldRule = FieldRule {
    field: "mood_variability",
    signal: "Mood Variability",
    why_it_matters: "Large mood swings can affect daily functioning and are worth noticing over time.",
    trend: Some(LowerIsBetter),
    bands: &[
        band(Below(4.0), "stable", Low, "Stable mood", "Below 4 on a 0-10 scale"),
        band(AtMost(7.0), "some_variability", Context, "Some mood variability", "4-7 on a 0-10 scale"),
        band(Unbounded, "high_variability", Moderate, "High mood variability", "Above 7 on a 0-10 scale")
            .recommend(&["Keep a brief mood log and seek support if worsening"]),
    ],
};

#[derive(Debug, Clone, Copy)]
enum RuleStep {
    Banded(&'static FieldRule),
    BloodPressure,
    PeriodsMissed,
    CycleIrregular,
}

/// Evaluation order; signals are emitted in this order.
static EVALUATION_ORDER: &[RuleStep] = &[
    RuleStep::Banded(&FASTING_GLUCOSE),
    RuleStep::BloodPressure,
    RuleStep::Banded(&TOTAL_CHOLESTEROL),
    RuleStep::Banded(&LDL),
    RuleStep::Banded(&HDL),
    RuleStep::Banded(&TRIGLYCERIDES),
    RuleStep::Banded(&SLEEP_DURATION),
    RuleStep::Banded(&ACTIVITY),
    RuleStep::Banded(&BMI),
    RuleStep::Banded(&VITAMIN_D),
    RuleStep::Banded(&VITAMIN_B12),
    RuleStep::Banded(&FERRITIN),
    RuleStep::Banded(&CYCLE_LENGTH),
    RuleStep::PeriodsMissed,
    RuleStep::CycleIrregular,
    RuleStep::Banded(&STRESS),
    RuleStep::Banded(&MOOD_VARIABILITY),
];

pub const BLOOD_PRESSURE_SIGNAL: &str = "Blood Pressure";
const BLOOD_PRESSURE_TREND_FIELD: &str = "bp_systolic";

/// Classify every supported field present in `raw`.
pub fn evaluate(raw: &RawHealthState) -> EvaluationResult {
    let mut result = EvaluationResult::default();

    for step in EVALUATION_ORDER {
        match *step {
            RuleStep::Banded(rule) => {
                let Some(value) = raw.number(rule.field) else {
                    continue;
                };
                let Some(matched) = rule.bands.iter().find(|b| b.upper.admits(value)) else {
                    continue;
                };
                let mut signal =
                    build_signal(rule.signal, value_of(raw, rule.field), matched, rule.why_it_matters);
                if let Some(orientation) = rule.trend {
                    attach_trend(&mut signal, raw, rule.field, value, orientation);
                }
                push(&mut result, signal, matched);
            }
            RuleStep::BloodPressure => {
                let (Some(systolic), Some(diastolic)) =
                    (raw.number("bp_systolic"), raw.number("bp_diastolic"))
                else {
                    continue;
                };
                let matched = &BLOOD_PRESSURE_BANDS[blood_pressure_level(systolic, diastolic)];
                let value = json!({
                    "systolic": value_of(raw, "bp_systolic"),
                    "diastolic": value_of(raw, "bp_diastolic"),
                });
                let mut signal =
                    build_signal(BLOOD_PRESSURE_SIGNAL, value, matched, BLOOD_PRESSURE_WHY);
                attach_trend(
                    &mut signal,
                    raw,
                    BLOOD_PRESSURE_TREND_FIELD,
                    systolic,
                    LowerIsBetter,
                );
                push(&mut result, signal, matched);
            }
            RuleStep::PeriodsMissed => {
                let Some(missed) = raw.number("periods_missed") else {
                    continue;
                };
                if missed < PERIODS_MISSED_MIN {
                    continue;
                }
                let signal = build_signal(
                    "Periods Missed",
                    value_of(raw, "periods_missed"),
                    &PERIODS_MISSED,
                    PERIODS_MISSED_WHY,
                );
                push(&mut result, signal, &PERIODS_MISSED);
            }
            RuleStep::CycleIrregular => {
                if !raw.flag("cycle_irregular") {
                    continue;
                }
                let signal = build_signal(
                    "Cycle Regularity",
                    json!("irregular"),
                    &CYCLE_IRREGULAR,
                    CYCLE_IRREGULAR_WHY,
                );
                push(&mut result, signal, &CYCLE_IRREGULAR);
            }
        }
    }

    result
}

/// Index into [`BLOOD_PRESSURE_BANDS`]; the worse of the two readings wins.
fn blood_pressure_level(systolic: f64, diastolic: f64) -> usize {
    let level = |levels: &[(Upper, usize)], value: f64| {
        levels
            .iter()
            .find(|(upper, _)| upper.admits(value))
            .map(|(_, idx)| *idx)
            .unwrap_or(BLOOD_PRESSURE_BANDS.len() - 1)
    };
    level(SYSTOLIC_LEVELS, systolic).max(level(DIASTOLIC_LEVELS, diastolic))
}

/// The caller's original JSON number, so integers stay integers on the wire.
fn value_of(raw: &RawHealthState, field: &str) -> Value {
    raw.get(field).cloned().unwrap_or(Value::Null)
}

fn build_signal(name: &str, value: Value, band: &Band, why_it_matters: &str) -> Signal {
    Signal {
        name: name.to_string(),
        value,
        status: band.status.to_string(),
        severity: band.severity,
        explanation: Explanation {
            rule: band.rule.to_string(),
            threshold: band.threshold.to_string(),
            why_it_matters: why_it_matters.to_string(),
        },
        details: band.details.to_string(),
        trend: None,
        sparkline: None,
    }
}

fn attach_trend(
    signal: &mut Signal,
    raw: &RawHealthState,
    field: &str,
    current: f64,
    orientation: Orientation,
) {
    let history = raw.history(field);
    if history.is_empty() {
        return;
    }
    let better_when_lower = matches!(orientation, LowerIsBetter);
    signal.trend = compute_trend(&history, current, better_when_lower);
    signal.sparkline = Some(compute_sparkline(&history, current));
}

fn push(result: &mut EvaluationResult, signal: Signal, band: &Band) {
    result.signals.push(signal);
    result.risks.extend(band.risks.iter().map(|s| s.to_string()));
    result
        .recommendations
        .extend(band.recommendations.iter().map(|s| s.to_string()));
    result
        .doctor_flags
        .extend(band.doctor_flags.iter().map(|s| s.to_string()));
}
