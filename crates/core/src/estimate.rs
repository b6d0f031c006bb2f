use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{EstimationResult, MatchCandidate, SourceTag};

/// Confidence reported by interpolation, independent of the date spread.
pub const INTERPOLATE_CONFIDENCE: f64 = 0.8;

/// How many of the best candidates interpolation looks at.
const INTERPOLATE_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationMode {
    /// Date of the single best candidate.
    MostSimilar,
    /// Date of the first dated candidate, confidence averaged over all dated ones.
    #[serde(rename = "weighted_avg")]
    WeightedAverage,
    /// Midpoint of the earliest and latest dates among the top three.
    #[default]
    Interpolate,
}

impl fmt::Display for EstimationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EstimationMode::MostSimilar => "most_similar",
            EstimationMode::WeightedAverage => "weighted_avg",
            EstimationMode::Interpolate => "interpolate",
        };
        f.write_str(s)
    }
}

impl FromStr for EstimationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "most_similar" => Ok(EstimationMode::MostSimilar),
            "weighted_avg" | "weighted_average" => Ok(EstimationMode::WeightedAverage),
            "interpolate" => Ok(EstimationMode::Interpolate),
            other => Err(format!(
                "unknown estimation mode '{other}' (expected most_similar, weighted_avg or interpolate)"
            )),
        }
    }
}

/// Turn ranked candidates into a date estimate.
///
/// `candidates` must already be in descending similarity order. Returns
/// `None` when the selected mode finds nothing to go on. GPS comes from the
/// first candidate that has it, whatever the mode.
pub fn estimate(candidates: &[MatchCandidate<'_>], mode: EstimationMode) -> Option<EstimationResult> {
    let (datetime, confidence, source) = match mode {
        EstimationMode::MostSimilar => {
            let best = candidates.first()?;
            (
                best.reference.capture_datetime?,
                best.similarity,
                SourceTag::MostSimilar,
            )
        }
        EstimationMode::WeightedAverage => {
            let dated: Vec<_> = candidates
                .iter()
                .filter_map(|c| c.reference.capture_datetime.map(|dt| (dt, c.similarity)))
                .collect();
            let (first, _) = *dated.first()?;
            let mean = dated.iter().map(|(_, s)| s).sum::<f64>() / dated.len() as f64;
            (first, mean, SourceTag::WeightedAverage)
        }
        EstimationMode::Interpolate => {
            let dates: Vec<_> = candidates
                .iter()
                .take(INTERPOLATE_WINDOW)
                .filter_map(|c| c.reference.capture_datetime)
                .collect();
            if dates.len() < 2 {
                return None;
            }
            let earliest = *dates.iter().min()?;
            let latest = *dates.iter().max()?;
            (
                earliest + (latest - earliest) / 2,
                INTERPOLATE_CONFIDENCE,
                SourceTag::Interpolated,
            )
        }
    };

    let gps = candidates.iter().find_map(|c| c.reference.gps);

    Some(EstimationResult {
        datetime,
        confidence,
        source,
        gps,
    })
}
