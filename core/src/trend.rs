//! Recency-weighted trend direction and confidence for a single signal.
//!
//! A trend is computed over `history + [current]`. Each consecutive delta is
//! weighted linearly by recency, so a recent improvement outweighs an older
//! deterioration of the same size. The confidence score blends three bounded
//! components: how many points there are, how consistently the non-trivial
//! deltas agree with the weighted direction, and how large the weighted change
//! is relative to the tolerance.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::health::format_number;

/// Changes smaller than this (in the signal's native unit) count as noise.
pub const TREND_TOLERANCE: f64 = 1.0;
/// Points awarded for series length, saturating at [`FULL_CONFIDENCE_POINTS`].
pub const POINTS_WEIGHT: f64 = 40.0;
/// Points awarded for sign agreement of non-trivial deltas.
pub const CONSISTENCY_WEIGHT: f64 = 40.0;
/// Points awarded for magnitude of the weighted change.
pub const MAGNITUDE_WEIGHT: f64 = 20.0;
pub const FULL_CONFIDENCE_POINTS: usize = 5;
/// Weighted change at which the magnitude component saturates, in tolerances.
pub const MAGNITUDE_SATURATION: f64 = 3.0;
/// Consistency ratio used when no delta exceeds the tolerance.
pub const NEUTRAL_CONSISTENCY: f64 = 0.5;
pub const MIN_CONFIDENCE: u8 = 10;
pub const MAX_CONFIDENCE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Worsening,
    Stable,
}

impl TrendDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Worsening => "worsening",
            Self::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Trend {
    pub direction: TrendDirection,
    /// Integer in `[10, 100]`.
    pub confidence: u8,
    /// Contains the literal series and the rounded weighted change; consumed verbatim downstream.
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SparklineDirection {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Sparkline {
    /// History followed by the current value, oldest first.
    pub values: Vec<f64>,
    /// Decided by first vs. last value only.
    pub direction: SparklineDirection,
}

/// Compute a trend, or `None` when there is no history to compare against.
pub fn compute_trend(history: &[f64], current: f64, better_when_lower: bool) -> Option<Trend> {
    if history.is_empty() {
        return None;
    }

    let series: Vec<f64> = history
        .iter()
        .copied()
        .chain(std::iter::once(current))
        .collect();
    let n = series.len();
    let deltas: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    // The k-th delta (0-based) weighs (k + 1) / (n - 1); the latest delta weighs 1.
    let span = (n - 1) as f64;
    let weighted_change: f64 = deltas
        .iter()
        .enumerate()
        .map(|(k, delta)| delta * (k as f64 + 1.0) / span)
        .sum();

    let direction = if weighted_change.abs() < TREND_TOLERANCE {
        TrendDirection::Stable
    } else if (weighted_change < 0.0) == better_when_lower {
        TrendDirection::Improving
    } else {
        TrendDirection::Worsening
    };

    let confidence = trend_confidence(n, &deltas, weighted_change);

    let explanation = format!(
        "Recent readings weighted more. Series: {} (weighted change {:.1}, {} is better) -> {}.",
        series
            .iter()
            .map(|v| format_number(*v))
            .collect::<Vec<_>>()
            .join(" -> "),
        weighted_change,
        if better_when_lower { "lower" } else { "higher" },
        direction.as_str(),
    );

    Some(Trend {
        direction,
        confidence,
        explanation,
    })
}

fn trend_confidence(points: usize, deltas: &[f64], weighted_change: f64) -> u8 {
    let coverage =
        points.min(FULL_CONFIDENCE_POINTS) as f64 / FULL_CONFIDENCE_POINTS as f64 * POINTS_WEIGHT;

    let significant: Vec<f64> = deltas
        .iter()
        .copied()
        .filter(|d| d.abs() > TREND_TOLERANCE)
        .collect();
    let agreement = if significant.is_empty() || weighted_change == 0.0 {
        NEUTRAL_CONSISTENCY
    } else {
        let agreeing = significant
            .iter()
            .filter(|d| d.signum() == weighted_change.signum())
            .count();
        agreeing as f64 / significant.len() as f64
    };
    let consistency = agreement * CONSISTENCY_WEIGHT;

    let magnitude = (weighted_change.abs() / (MAGNITUDE_SATURATION * TREND_TOLERANCE)).min(1.0)
        * MAGNITUDE_WEIGHT;

    let total = (coverage + consistency + magnitude).round();
    total.clamp(MIN_CONFIDENCE as f64, MAX_CONFIDENCE as f64) as u8
}

/// Literal value series for display plus a coarse first-vs-last direction.
pub fn compute_sparkline(history: &[f64], current: f64) -> Sparkline {
    let mut values = history.to_vec();
    values.push(current);

    let first = values[0];
    let last = current;
    let direction = if last > first {
        SparklineDirection::Up
    } else if last < first {
        SparklineDirection::Down
    } else {
        SparklineDirection::Flat
    };

    Sparkline { values, direction }
}
