//! Pass window aggregation.
//!
//! The predicted ground track is sampled at a fixed step over the horizon.
//! Each sample is a hit or a miss of the inflated AOI; contiguous runs of
//! hits become pass windows.

use crate::{
    config::PassConfig,
    geo::BoundingBox,
    propagator::SatellitePropagator,
    swath::SwathModel,
    AoiCoverageError, AoiCoverageResult, Level,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// A contiguous interval `[start, end)` during which the simplified footprint
/// overlaps the AOI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PassWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackState {
    Outside,
    Inside { since: DateTime<Utc> },
}

/// OUTSIDE/INSIDE state machine over a strictly increasing sample sequence.
#[derive(Debug)]
pub struct PassWindowAggregator {
    state: TrackState,
    windows: Vec<PassWindow>,
    hit_count: usize,
    max_windows: usize,
}

/// Outcome of a completed (or capped) sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct PassSummary {
    pub windows: Vec<PassWindow>,
    pub hit_count: usize,
    /// Sampling stopped early because the window cap was reached.
    pub capped: bool,
}

impl PassSummary {
    /// Coarse time over the AOI: hit samples times the step.
    pub fn dwell_minutes(&self, step_seconds: i64) -> f64 {
        self.hit_count as f64 * step_seconds as f64 / 60.0
    }
}

impl PassWindowAggregator {
    pub fn new(max_windows: usize) -> Self {
        PassWindowAggregator {
            state: TrackState::Outside,
            windows: Vec::new(),
            hit_count: 0,
            max_windows,
        }
    }

    /// Feeds one sample.
    pub fn push(&mut self, timestamp: DateTime<Utc>, hit: bool) {
        if hit {
            self.hit_count += 1;
        }

        self.state = match (self.state, hit) {
            (TrackState::Outside, true) => TrackState::Inside { since: timestamp },
            (TrackState::Inside { since }, false) => {
                self.windows.push(PassWindow {
                    start: since,
                    end: timestamp,
                });
                TrackState::Outside
            }
            (state, _) => state,
        };
    }

    /// True once the window cap is reached; no further samples are needed.
    pub fn is_full(&self) -> bool {
        self.windows.len() >= self.max_windows
    }

    /// Closes a window still open at the horizon and returns the summary.
    pub fn finish(mut self, horizon_end: DateTime<Utc>) -> PassSummary {
        let capped = self.is_full();
        if let TrackState::Inside { since } = self.state {
            self.windows.push(PassWindow {
                start: since,
                end: horizon_end.max(since),
            });
        }
        PassSummary {
            windows: self.windows,
            hit_count: self.hit_count,
            capped,
        }
    }
}

/// Runs the aggregator over `sample` from `start` (inclusive) to
/// `start + horizon` (exclusive) at `step`.
///
/// `sample` returns `None` when no position is available; such samples are
/// skipped and do not change the state.
///
/// # Errors
/// Returns `AoiCoverageError::InvalidInput` if the horizon end is not
/// representable, and `AoiCoverageError::Cancelled` if `cancel` fires before
/// the run completes.
pub fn aggregate_samples<F>(
    start: DateTime<Utc>,
    horizon: Duration,
    step: Duration,
    max_windows: usize,
    cancel: &CancellationToken,
    mut sample: F,
) -> AoiCoverageResult<PassSummary>
where
    F: FnMut(DateTime<Utc>) -> Option<bool>,
{
    let end = start.checked_add_signed(horizon).ok_or_else(|| {
        AoiCoverageError::InvalidInput(format!("horizon of {horizon} from {start} is out of range"))
    })?;
    let mut aggregator = PassWindowAggregator::new(max_windows);
    let mut t = start;

    while t < end && !aggregator.is_full() {
        if cancel.is_cancelled() {
            return Err(AoiCoverageError::Cancelled(
                "pass estimation cancelled".to_string(),
            ));
        }
        if let Some(hit) = sample(t) {
            aggregator.push(t, hit);
        }
        t = match t.checked_add_signed(step) {
            Some(next) => next,
            None => break,
        };
    }

    Ok(aggregator.finish(end))
}

/// Samples the sub-satellite track of one satellite against the AOI.
pub fn find_pass_windows(
    propagator: &SatellitePropagator,
    aoi: &BoundingBox,
    swath_km: f64,
    start: DateTime<Utc>,
    cfg: &PassConfig,
    horizon_days: i64,
    cancel: &CancellationToken,
) -> AoiCoverageResult<PassSummary> {
    let model = SwathModel {
        km_per_degree: cfg.km_per_degree,
        pole_cos_floor: cfg.pole_cos_floor,
    };

    let horizon = Duration::try_days(horizon_days).ok_or_else(|| {
        AoiCoverageError::InvalidInput(format!("horizon of {horizon_days} days is out of range"))
    })?;
    let step = Duration::try_seconds(cfg.step_seconds).ok_or_else(|| {
        AoiCoverageError::InvalidInput(format!("step of {} s is out of range", cfg.step_seconds))
    })?;

    aggregate_samples(
        start,
        horizon,
        step,
        cfg.max_windows,
        cancel,
        |t| {
            propagator
                .propagate(t)
                .map(|p| model.hit(p.lat, p.lon, aoi, swath_km))
        },
    )
}

/// Output row per tracked satellite.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassResult {
    pub name: String,
    pub level: Level,
    pub description: String,
    pub windows: Vec<PassWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dwell_minutes: Option<f64>,
}

impl PassResult {
    /// A row for a satellite whose computation could not run.
    pub fn warn(name: &str, description: impl Into<String>) -> Self {
        PassResult {
            name: name.to_string(),
            level: Level::Warn,
            description: description.into(),
            windows: Vec::new(),
            dwell_minutes: None,
        }
    }

    /// A row for a completed computation; at most `cfg.shown_windows` windows
    /// are kept.
    pub fn from_summary(name: &str, summary: PassSummary, cfg: &PassConfig, horizon_days: i64) -> Self {
        let dwell = summary.dwell_minutes(cfg.step_seconds);

        if summary.windows.is_empty() {
            return PassResult {
                name: name.to_string(),
                level: Level::No,
                description: format!("No pass over AOI in the next {horizon_days} days."),
                windows: Vec::new(),
                dwell_minutes: Some(0.0),
            };
        }

        let found = summary.windows.len();
        let more = if summary.capped { "+" } else { "" };
        let mut description = format!(
            "{found}{more} pass window(s) in the next {horizon_days} days, ~{dwell:.0} min over AOI (reference only)."
        );
        if found > cfg.shown_windows {
            description.push_str(&format!(" Showing first {}.", cfg.shown_windows));
        }

        let mut windows = summary.windows;
        windows.truncate(cfg.shown_windows);

        PassResult {
            name: name.to_string(),
            level: Level::Ok,
            description,
            windows,
            dwell_minutes: Some(dwell),
        }
    }
}
