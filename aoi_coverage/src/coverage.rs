//! Rule-based archive coverage evaluation.

use crate::{
    config::{Confidence, CoverageRule},
    geo::{bbox_intersects, AreaOfInterest},
    Level,
};
use serde::Serialize;

pub const REFERENCE_ONLY_REASON: &str =
    "Reference-only coverage rule; confirm availability with the provider.";

/// One output row of the coverage index.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageIndicator {
    pub name: String,
    pub family: String,
    pub sensors_text: String,
    pub level: Level,
    pub reason: String,
    pub note: String,
}

/// Evaluates one rule against the AOI. Never fails.
///
/// A latitude range is checked against the AOI center, then the coverage
/// regions against the AOI box; a rule passing both is leveled by its
/// declared confidence.
pub fn evaluate(rule: &CoverageRule, aoi: &AreaOfInterest) -> CoverageIndicator {
    let coverage = &rule.coverage;
    let note = format!(
        "Rule-based estimate ({} confidence); reference only.",
        coverage.confidence.as_str()
    );
    let row = |level: Level, reason: String| CoverageIndicator {
        name: rule.name.clone(),
        family: rule.family.clone(),
        sensors_text: rule.sensors.join(", "),
        level,
        reason,
        note: note.clone(),
    };

    if let Some([a, b]) = coverage.lat_range {
        // a non-finite bound means no usable range
        if a.is_finite() && b.is_finite() {
            let (min, max) = if a <= b { (a, b) } else { (b, a) };
            let lat = aoi.center().lat;
            if lat < min || lat > max {
                return row(
                    Level::No,
                    format!("Outside stated latitude range ({min}..{max})."),
                );
            }
        }
    }

    if !coverage.coverage_bboxes.is_empty()
        && !coverage
            .coverage_bboxes
            .iter()
            .any(|b| bbox_intersects(&aoi.bbox, b))
    {
        return row(
            Level::No,
            "No overlap with stated coverage regions.".to_string(),
        );
    }

    let level = match coverage.confidence {
        Confidence::High => Level::Ok,
        Confidence::Medium | Confidence::Low => Level::Warn,
    };
    let reason = coverage
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(REFERENCE_ONLY_REASON)
        .to_string();

    row(level, reason)
}

/// Evaluates every rule, in order.
pub fn evaluate_all(rules: &[CoverageRule], aoi: &AreaOfInterest) -> Vec<CoverageIndicator> {
    rules.iter().map(|rule| evaluate(rule, aoi)).collect()
}
