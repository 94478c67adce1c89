//! AOI pipelines.
//!
//! Each entry point turns per-item failures into `no`/`warn` rows at the point
//! of failure, so callers always get one row per configured item in
//! configuration order.

use crate::{
    catalog::{list_scenes, probe, probe_indicator, CatalogSearch, SceneGroup},
    config::{EngineConfig, TrackedSatellite, MAX_HORIZON_DAYS},
    coverage::{evaluate_all, CoverageIndicator},
    geo::AreaOfInterest,
    passes::{find_pass_windows, PassResult},
    propagator::SatellitePropagator,
    time_window::TimeWindow,
    tle::{find_elements, parse_element_sets, OrbitalElements, TleStore},
    AoiCoverageError, AoiCoverageResult,
};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PASSES_CANCELLED: &str = "Pass estimation cancelled.";

/// Coverage index for an AOI: one row per coverage rule, followed by one
/// existence-probe row per open collection when a time window is given.
pub async fn run_coverage_index(
    cfg: &EngineConfig,
    aoi: &AreaOfInterest,
    window: Option<&TimeWindow>,
    catalog: &dyn CatalogSearch,
    cancel: &CancellationToken,
) -> Vec<CoverageIndicator> {
    info!(
        "coverage index for bbox {:?} ({} rules)",
        aoi.bbox.to_array(),
        cfg.rules.len()
    );
    let mut rows = evaluate_all(&cfg.rules, aoi);

    match window {
        Some(window) => {
            let outcomes = probe(catalog, &cfg.catalog.collections, aoi, Some(window), cancel).await;
            rows.extend(outcomes.iter().map(|(c, status)| probe_indicator(c, status)));
        }
        None => debug!("no time window, skipping open catalog probes"),
    }

    info!("coverage index done: {} rows", rows.len());
    rows
}

/// Satellites sharing a TLE source, by index into the configuration.
struct SourceJob<'a> {
    key: &'a str,
    satellites: Vec<usize>,
}

fn source_jobs(satellites: &[TrackedSatellite]) -> Vec<SourceJob<'_>> {
    let mut jobs: Vec<SourceJob> = Vec::new();
    for (i, sat) in satellites.iter().enumerate() {
        match jobs.iter_mut().find(|job| job.key == sat.tle_source) {
            Some(job) => job.satellites.push(i),
            None => jobs.push(SourceJob {
                key: &sat.tle_source,
                satellites: vec![i],
            }),
        }
    }
    jobs
}

/// Upcoming pass windows over the AOI, one result per tracked satellite.
///
/// Each TLE source is fetched once, through the store's cache, no matter how
/// many satellites it serves.
///
/// # Errors
/// Returns `AoiCoverageError::InvalidInput` if `horizon_days` is outside
/// `1..=MAX_HORIZON_DAYS`.
/// Everything after that is reported per satellite.
pub async fn estimate_passes(
    cfg: &EngineConfig,
    store: &TleStore,
    aoi: &AreaOfInterest,
    start: DateTime<Utc>,
    horizon_days: i64,
    cancel: &CancellationToken,
) -> AoiCoverageResult<Vec<PassResult>> {
    if !(1..=MAX_HORIZON_DAYS).contains(&horizon_days) {
        return Err(AoiCoverageError::InvalidInput(format!(
            "horizon must be 1 to {MAX_HORIZON_DAYS} days, got {horizon_days}"
        )));
    }

    info!(
        "estimating passes of {} satellites over {horizon_days} days from {start}",
        cfg.satellites.len()
    );
    let mut results: Vec<Option<PassResult>> = vec![None; cfg.satellites.len()];

    for job in source_jobs(&cfg.satellites) {
        if cancel.is_cancelled() {
            for &i in &job.satellites {
                results[i] = Some(PassResult::warn(&cfg.satellites[i].name, PASSES_CANCELLED));
            }
            continue;
        }

        let text = match cfg.tle_source(job.key) {
            Some(source) => {
                store
                    .fetch_elements(&source.url, &format!("tle:{}", job.key), source.ttl_hours)
                    .await
            }
            None => Err(AoiCoverageError::Config(format!("unknown TLE source '{}'", job.key))),
        };

        let sets = match text {
            Ok(text) => parse_element_sets(&text),
            Err(e) => {
                warn!("TLE fetch failed for source '{}': {e}", job.key);
                for &i in &job.satellites {
                    results[i] = Some(PassResult::warn(
                        &cfg.satellites[i].name,
                        format!("TLE fetch failed for source '{}': {e}", job.key),
                    ));
                }
                continue;
            }
        };
        debug!("source '{}' has {} element sets", job.key, sets.len());

        for &i in &job.satellites {
            let sat = &cfg.satellites[i];
            let row = match find_elements(&sets, sat.tle_lookup_name()) {
                Ok(elements) => satellite_passes(cfg, sat, elements, aoi, start, horizon_days, cancel),
                Err(e) => {
                    warn!("{}: {e}", sat.name);
                    PassResult::warn(&sat.name, e.to_string())
                }
            };
            results[i] = Some(row);
        }
    }

    let results: Vec<PassResult> = results.into_iter().flatten().collect();
    info!("pass estimation done: {} results", results.len());
    Ok(results)
}

fn satellite_passes(
    cfg: &EngineConfig,
    sat: &TrackedSatellite,
    elements: &OrbitalElements,
    aoi: &AreaOfInterest,
    start: DateTime<Utc>,
    horizon_days: i64,
    cancel: &CancellationToken,
) -> PassResult {
    let propagator = match SatellitePropagator::new(elements) {
        Ok(p) => p,
        Err(e) => {
            warn!("{}: {e}", sat.name);
            return PassResult::warn(&sat.name, e.to_string());
        }
    };

    match find_pass_windows(
        &propagator,
        &aoi.bbox,
        sat.swath_km,
        start,
        &cfg.passes,
        horizon_days,
        cancel,
    ) {
        Ok(summary) => {
            debug!(
                "{}: {} windows ({} hit samples)",
                sat.name,
                summary.windows.len(),
                summary.hit_count
            );
            PassResult::from_summary(&sat.name, summary, &cfg.passes, horizon_days)
        }
        Err(AoiCoverageError::Cancelled(_)) => PassResult::warn(&sat.name, PASSES_CANCELLED),
        Err(e) => PassResult::warn(&sat.name, e.to_string()),
    }
}

/// Archive scenes over the AOI from the configured open collections.
///
/// # Errors
/// Returns `AoiCoverageError::Cancelled` if cancelled mid-listing.
pub async fn list_archive_scenes(
    cfg: &EngineConfig,
    aoi: &AreaOfInterest,
    window: Option<&TimeWindow>,
    catalog: &dyn CatalogSearch,
    cancel: &CancellationToken,
) -> AoiCoverageResult<Vec<SceneGroup>> {
    list_scenes(
        catalog,
        &cfg.catalog.collections,
        aoi,
        window,
        cfg.catalog.scene_limit,
        cancel,
    )
    .await
}
