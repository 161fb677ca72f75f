use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::health::RawHealthState;
use crate::safety::DISCLAIMER_TEXT;
use crate::signals::{EvaluationResult, evaluate};

/// Grouped health inputs. Flat top-level fields are accepted too.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SummaryRequest {
    #[serde(default)]
    pub labs: RawHealthState,
    #[serde(default)]
    pub activity: RawHealthState,
    #[serde(default)]
    pub sleep: RawHealthState,
    #[serde(default)]
    pub periods: RawHealthState,
    #[serde(default)]
    pub other: RawHealthState,
    #[serde(flatten)]
    pub flat: RawHealthState,
}

impl SummaryRequest {
    /// Later sections override earlier ones; flat fields override all sections.
    pub fn combined(self) -> RawHealthState {
        let mut combined = RawHealthState::new();
        for section in [self.labs, self.activity, self.sleep, self.periods, self.other, self.flat] {
            combined.merge(section);
        }
        combined
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Summary {
    pub summary: EvaluationResult,
    pub disclaimer: String,
}

pub fn summarize(request: SummaryRequest) -> Summary {
    Summary {
        summary: evaluate(&request.combined()),
        disclaimer: DISCLAIMER_TEXT.to_string(),
    }
}
