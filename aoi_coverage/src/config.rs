//! Static engine configuration.
//!
//! Coverage rules, tracked satellites, the TLE source table, the open catalog
//! and the pass-prediction tunables are loaded once from a JSON file and
//! validated before any AOI action. A configuration that fails to load or
//! validate is reported as `AoiCoverageError::Config`.

use crate::{geo::BoundingBox, AoiCoverageError, AoiCoverageResult};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

const APP_NAME: &str = "aoi_coverage";
const CONFIG_FILE_NAME: &str = "config.json";

pub const DEFAULT_TLE_TTL_HOURS: f64 = 2.0;
/// Longest pass-prediction horizon accepted from configuration or callers.
pub const MAX_HORIZON_DAYS: i64 = 366;
pub const DEFAULT_CATALOG_ENDPOINT: &str = "https://earth-search.aws.element84.com/v1/search";

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    let mut dir = dirs::config_dir().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
    });
    dir.push(APP_NAME);
    dir.push(CONFIG_FILE_NAME);
    dir
}

/// Default directory of the persistent TLE text cache.
pub fn default_cache_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Declared confidence of a coverage rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

/// The coverage predicate of a rule. Every part is optional; an empty
/// predicate means global coverage at medium confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CoverageSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat_range: Option<[f64; 2]>,
    /// OR-combined coverage regions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage_bboxes: Vec<BoundingBox>,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One rule per data provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRule {
    pub name: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub sensors: Vec<String>,
    #[serde(default)]
    pub coverage: CoverageSpec,
}

impl CoverageRule {
    /// A rule with global coverage and default confidence.
    pub fn named(name: &str) -> Self {
        CoverageRule {
            name: name.to_string(),
            family: String::new(),
            sensors: Vec::new(),
            coverage: CoverageSpec::default(),
        }
    }
}

/// A satellite whose passes are predicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedSatellite {
    /// Display name.
    pub name: String,
    /// Name to look up in the TLE set; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tle_name: Option<String>,
    /// Key into the TLE source table.
    pub tle_source: String,
    /// Half-width of the simplified ground footprint (km).
    pub swath_km: f64,
}

impl TrackedSatellite {
    pub fn tle_lookup_name(&self) -> &str {
        self.tle_name.as_deref().unwrap_or(&self.name)
    }
}

/// Where a TLE group is fetched from and how long it stays cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TleSource {
    pub url: String,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: f64,
}

fn default_ttl_hours() -> f64 {
    DEFAULT_TLE_TTL_HOURS
}

/// An open catalog collection probed for existing scenes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenCollection {
    pub key: String,
    pub title: String,
    pub collection: String,
}

impl OpenCollection {
    fn new(key: &str, title: &str, collection: &str) -> Self {
        OpenCollection {
            key: key.to_string(),
            title: title.to_string(),
            collection: collection.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogConfig {
    /// STAC `/search` endpoint.
    pub endpoint: String,
    pub collections: Vec<OpenCollection>,
    pub timeout_secs: u64,
    /// Page size used when listing scenes.
    pub scene_limit: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            endpoint: DEFAULT_CATALOG_ENDPOINT.to_string(),
            collections: vec![
                OpenCollection::new("s2", "Sentinel-2", "sentinel-2-l2a"),
                OpenCollection::new("s1", "Sentinel-1", "sentinel-1-grd"),
                OpenCollection::new("ls", "Landsat", "landsat-c2-l2"),
            ],
            timeout_secs: 30,
            scene_limit: 200,
        }
    }
}

/// Pass prediction tunables. These are heuristics, not derived values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PassConfig {
    pub step_seconds: i64,
    /// Sampling stops once this many windows were emitted.
    pub max_windows: usize,
    /// Number of windows surfaced per result row.
    pub shown_windows: usize,
    /// Floor for `cos(lat)` in the longitude inflation.
    pub pole_cos_floor: f64,
    pub km_per_degree: f64,
    pub horizon_days: i64,
}

impl Default for PassConfig {
    fn default() -> Self {
        PassConfig {
            step_seconds: 60,
            max_windows: 6,
            shown_windows: 5,
            pole_cos_floor: 0.2,
            km_per_degree: 111.0,
            horizon_days: 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub rules: Vec<CoverageRule>,
    #[serde(default)]
    pub satellites: Vec<TrackedSatellite>,
    #[serde(default)]
    pub tle_sources: BTreeMap<String, TleSource>,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub passes: PassConfig,
}

macro_rules! config_error {
    ($fmt:literal $(, $arg:expr )* ) => {
        AoiCoverageError::Config( format!( $fmt $(, $arg)* ))
    };
}

impl EngineConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json_str(json: &str) -> AoiCoverageResult<Self> {
        let cfg: EngineConfig = serde_json::from_str(json)
            .map_err(|e| config_error!("configuration failed to load: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads and validates the configuration file at `path`.
    pub fn load(path: &Path) -> AoiCoverageResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| config_error!("configuration failed to load from {}: {e}", path.display()))?;
        let cfg = Self::from_json_str(&raw)?;
        info!(
            "loaded {} coverage rules and {} tracked satellites from {}",
            cfg.rules.len(),
            cfg.satellites.len(),
            path.display()
        );
        Ok(cfg)
    }

    /// Loads from the default location, or returns the built-in defaults
    /// (no rules, no satellites) if there is no configuration file.
    pub fn load_or_default() -> AoiCoverageResult<Self> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            debug!("no configuration at {}, using defaults", path.display());
            Ok(EngineConfig::default())
        }
    }

    pub fn tle_source(&self, key: &str) -> Option<&TleSource> {
        self.tle_sources.get(key)
    }

    /// Checks every section and fails on the first problem found.
    pub fn validate(&self) -> AoiCoverageResult<()> {
        let mut names = HashSet::new();
        for rule in &self.rules {
            validate_rule(rule)?;
            if !names.insert(rule.name.as_str()) {
                return Err(config_error!("duplicate coverage rule '{}'", rule.name));
            }
        }

        for (key, source) in &self.tle_sources {
            if !(source.url.starts_with("http://") || source.url.starts_with("https://")) {
                return Err(config_error!("TLE source '{key}' has invalid url '{}'", source.url));
            }
            if !source.ttl_hours.is_finite() || source.ttl_hours < 0.0 {
                return Err(config_error!(
                    "TLE source '{key}' has invalid ttlHours {}",
                    source.ttl_hours
                ));
            }
        }

        let mut names = HashSet::new();
        for sat in &self.satellites {
            if sat.name.trim().is_empty() {
                return Err(config_error!("tracked satellite without name"));
            }
            if !names.insert(sat.name.as_str()) {
                return Err(config_error!("duplicate tracked satellite '{}'", sat.name));
            }
            if !self.tle_sources.contains_key(&sat.tle_source) {
                return Err(config_error!(
                    "satellite '{}' refers to unknown TLE source '{}'",
                    sat.name,
                    sat.tle_source
                ));
            }
            if !sat.swath_km.is_finite() || sat.swath_km <= 0.0 {
                return Err(config_error!(
                    "satellite '{}' has invalid swathKm {}",
                    sat.name,
                    sat.swath_km
                ));
            }
        }

        self.catalog.validate()?;
        self.passes.validate()
    }
}

fn validate_rule(rule: &CoverageRule) -> AoiCoverageResult<()> {
    if rule.name.trim().is_empty() {
        return Err(config_error!("coverage rule without name"));
    }
    if let Some([min, max]) = rule.coverage.lat_range {
        let in_range = |v: f64| v.is_finite() && (-90.0..=90.0).contains(&v);
        if !in_range(min) || !in_range(max) || min > max {
            return Err(config_error!(
                "coverage rule '{}' has invalid latRange [{min}, {max}]",
                rule.name
            ));
        }
    }
    Ok(())
}

impl CatalogConfig {
    fn validate(&self) -> AoiCoverageResult<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(config_error!("invalid catalog endpoint '{}'", self.endpoint));
        }
        let mut keys = HashSet::new();
        for c in &self.collections {
            if c.collection.trim().is_empty() {
                return Err(config_error!("open collection '{}' without collection id", c.key));
            }
            if !keys.insert(c.key.as_str()) {
                return Err(config_error!("duplicate open collection '{}'", c.key));
            }
        }
        if self.scene_limit == 0 {
            return Err(config_error!("catalog sceneLimit must be positive"));
        }
        Ok(())
    }
}

impl PassConfig {
    fn validate(&self) -> AoiCoverageResult<()> {
        if self.step_seconds <= 0 {
            return Err(config_error!("passes.stepSeconds must be positive"));
        }
        if self.max_windows == 0 || self.shown_windows == 0 {
            return Err(config_error!("passes.maxWindows and passes.shownWindows must be positive"));
        }
        if !(self.pole_cos_floor > 0.0 && self.pole_cos_floor <= 1.0) {
            return Err(config_error!(
                "passes.poleCosFloor must be in (0, 1], got {}",
                self.pole_cos_floor
            ));
        }
        if !self.km_per_degree.is_finite() || self.km_per_degree <= 0.0 {
            return Err(config_error!("passes.kmPerDegree must be positive"));
        }
        if !(1..=MAX_HORIZON_DAYS).contains(&self.horizon_days) {
            return Err(config_error!(
                "passes.horizonDays must be in 1..={MAX_HORIZON_DAYS}, got {}",
                self.horizon_days
            ));
        }
        Ok(())
    }
}
