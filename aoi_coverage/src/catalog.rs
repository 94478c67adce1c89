//! Open STAC catalog access.
//!
//! Two uses: a cheap `limit=1` existence probe per configured collection over
//! the AOI and time window, and a full scene listing merged by satellite and
//! UTC date.

use crate::{
    config::{CatalogConfig, OpenCollection},
    coverage::CoverageIndicator,
    geo::AreaOfInterest,
    time_window::{format_timestamp, stac_datetime, utc_date_key, TimeMode, TimeWindow},
    AoiCoverageError, AoiCoverageResult, Level,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("aoi_coverage/", env!("CARGO_PKG_VERSION"));

pub const UNKNOWN_SATELLITE: &str = "Unknown satellite";

/// Body of a STAC `POST /search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub collections: Vec<String>,
    pub datetime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersects: Option<Value>,
    pub limit: usize,
}

impl SearchRequest {
    /// Searches one collection. The AOI geometry is sent as `intersects`
    /// when present, the bbox otherwise.
    pub fn new(
        collection: &str,
        aoi: &AreaOfInterest,
        window: Option<&TimeWindow>,
        limit: usize,
    ) -> Self {
        let (bbox, intersects) = match &aoi.geometry {
            Some(geometry) => (None, Some(geometry.clone())),
            None => (Some(aoi.bbox.to_array()), None),
        };
        SearchRequest {
            collections: vec![collection.to_string()],
            datetime: stac_datetime(window),
            bbox,
            intersects,
            limit,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub features: Vec<StacItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StacItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub properties: ItemProperties,
}

/// The item properties we read; everything else is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemProperties {
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub constellation: Option<String>,
}

#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// # Errors
    /// Returns `AoiCoverageError::Fetch` on network errors, non-success status
    /// codes and undecodable bodies.
    async fn search(&self, request: &SearchRequest) -> AoiCoverageResult<SearchResponse>;
}

/// `CatalogSearch` against a STAC API `/search` endpoint.
pub struct StacClient {
    client: reqwest::Client,
    endpoint: String,
}

impl StacClient {
    pub fn new(cfg: &CatalogConfig) -> AoiCoverageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AoiCoverageError::Fetch(format!("Failed to create HTTP client: {e}")))?;
        Ok(StacClient {
            client,
            endpoint: cfg.endpoint.clone(),
        })
    }
}

// decode from bytes so the serde error is kept in the message
async fn from_json<T: DeserializeOwned>(response: reqwest::Response) -> AoiCoverageResult<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AoiCoverageError::Fetch(format!("Failed to read response: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AoiCoverageError::Fetch(format!("Invalid catalog response: {e}")))
}

#[async_trait]
impl CatalogSearch for StacClient {
    async fn search(&self, request: &SearchRequest) -> AoiCoverageResult<SearchResponse> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AoiCoverageError::Fetch(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AoiCoverageError::Fetch(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        from_json(response).await
    }
}

/// Outcome of one existence probe.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeStatus {
    Found,
    NotFound,
    Failed(String),
    Cancelled,
}

impl ProbeStatus {
    pub fn found(&self) -> bool {
        matches!(self, ProbeStatus::Found)
    }
}

/// Runs one `limit=1` search per collection, in order.
///
/// Failures never abort the run; they are logged and reported as
/// `ProbeStatus::Failed`. Once `cancel` fires the remaining collections are
/// reported as `ProbeStatus::Cancelled` without a request.
pub async fn probe(
    catalog: &dyn CatalogSearch,
    collections: &[OpenCollection],
    aoi: &AreaOfInterest,
    window: Option<&TimeWindow>,
    cancel: &CancellationToken,
) -> Vec<(OpenCollection, ProbeStatus)> {
    let mut outcomes = Vec::with_capacity(collections.len());

    for collection in collections {
        if cancel.is_cancelled() {
            outcomes.push((collection.clone(), ProbeStatus::Cancelled));
            continue;
        }

        let request = SearchRequest::new(&collection.collection, aoi, window, 1);
        let status = match catalog.search(&request).await {
            Ok(response) if !response.features.is_empty() => ProbeStatus::Found,
            Ok(_) => ProbeStatus::NotFound,
            Err(e) => {
                warn!("catalog probe for {} failed: {e}", collection.collection);
                ProbeStatus::Failed(e.to_string())
            }
        };
        debug!("probe {}: {status:?}", collection.collection);
        outcomes.push((collection.clone(), status));
    }

    outcomes
}

/// Folds a probe outcome into a coverage row.
pub fn probe_indicator(collection: &OpenCollection, status: &ProbeStatus) -> CoverageIndicator {
    let (level, reason) = match status {
        ProbeStatus::Found => (Level::Ok, "Scenes found over AOI in the time window.".to_string()),
        ProbeStatus::NotFound => (Level::No, "No scenes found over AOI in the time window.".to_string()),
        ProbeStatus::Failed(e) => (Level::No, format!("Catalog search failed: {e}")),
        ProbeStatus::Cancelled => (Level::No, "Catalog probe cancelled.".to_string()),
    };
    CoverageIndicator {
        name: collection.title.clone(),
        family: "Open catalog".to_string(),
        sensors_text: collection.collection.clone(),
        level,
        reason,
        note: "Open catalog existence check (best effort).".to_string(),
    }
}

/// Scenes of one satellite on one UTC day.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneGroup {
    pub satellite: String,
    /// `YYYY-MM-DD` (UTC) or `"Unknown"`.
    pub date: String,
    pub times: Vec<String>,
    pub scene_count: usize,
    /// Collection of the first scene in the group.
    pub collection: String,
}

impl SceneGroup {
    /// Rewrites the scene times for display.
    pub fn with_time_mode(mut self, mode: TimeMode) -> Self {
        self.times = self
            .times
            .iter()
            .map(|t| format_timestamp(Some(t.as_str()), mode))
            .collect();
        self
    }
}

/// Platform, then constellation, then the collection title.
pub fn satellite_name(item: &StacItem, fallback: &str) -> String {
    let props = &item.properties;
    [props.platform.as_deref(), props.constellation.as_deref(), Some(fallback)]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_SATELLITE)
        .to_string()
}

/// Merges `(collection, item)` pairs by satellite and UTC date, newest date
/// first. Groups with the same date keep their first-seen order.
pub fn group_scenes(items: &[(OpenCollection, StacItem)]) -> Vec<SceneGroup> {
    let mut groups: Vec<SceneGroup> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for (collection, item) in items {
        let satellite = satellite_name(item, &collection.title);
        let date = item
            .properties
            .datetime
            .as_deref()
            .map(utc_date_key)
            .unwrap_or_else(|| "Unknown".to_string());

        let i = *index.entry((satellite.clone(), date.clone())).or_insert_with(|| {
            groups.push(SceneGroup {
                satellite,
                date,
                times: Vec::new(),
                scene_count: 0,
                collection: collection.collection.clone(),
            });
            groups.len() - 1
        });

        let group = &mut groups[i];
        group.scene_count += 1;
        if let Some(t) = &item.properties.datetime {
            group.times.push(t.clone());
        }
    }

    groups.sort_by(|a, b| b.date.cmp(&a.date));
    groups
}

/// Lists archive scenes over the AOI, one search per collection.
///
/// A failing collection is logged and skipped.
///
/// # Errors
/// Returns `AoiCoverageError::Cancelled` if `cancel` fires before all
/// collections were searched.
pub async fn list_scenes(
    catalog: &dyn CatalogSearch,
    collections: &[OpenCollection],
    aoi: &AreaOfInterest,
    window: Option<&TimeWindow>,
    limit: usize,
    cancel: &CancellationToken,
) -> AoiCoverageResult<Vec<SceneGroup>> {
    let mut items = Vec::new();

    for collection in collections {
        if cancel.is_cancelled() {
            return Err(AoiCoverageError::Cancelled("scene listing cancelled".to_string()));
        }

        let request = SearchRequest::new(&collection.collection, aoi, window, limit);
        match catalog.search(&request).await {
            Ok(response) => {
                info!(
                    "{} scenes from {}",
                    response.features.len(),
                    collection.collection
                );
                items.extend(
                    response
                        .features
                        .into_iter()
                        .map(|item| (collection.clone(), item)),
                );
            }
            Err(e) => warn!("scene search in {} failed: {e}", collection.collection),
        }
    }

    Ok(group_scenes(&items))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geo::BoundingBox;
    use serde_json::json;
    use std::sync::Mutex;

    /// Serves canned bodies per collection id; a missing entry is a fetch error.
    pub(crate) struct FakeCatalog {
        bodies: HashMap<String, Value>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl FakeCatalog {
        pub(crate) fn new(bodies: &[(&str, Value)]) -> Self {
            FakeCatalog {
                bodies: bodies
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn requests(&self) -> Vec<SearchRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CatalogSearch for FakeCatalog {
        async fn search(&self, request: &SearchRequest) -> AoiCoverageResult<SearchResponse> {
            self.requests.lock().unwrap().push(request.clone());
            match self.bodies.get(&request.collections[0]) {
                Some(body) => Ok(serde_json::from_value(body.clone())?),
                None => Err(AoiCoverageError::Fetch("HTTP error: 502 Bad Gateway".to_string())),
            }
        }
    }

    pub(crate) fn item(platform: Option<&str>, datetime: &str) -> Value {
        let mut properties = json!({ "datetime": datetime });
        if let Some(p) = platform {
            properties["platform"] = json!(p);
        }
        json!({ "type": "Feature", "id": datetime, "properties": properties })
    }

    fn aoi() -> AreaOfInterest {
        AreaOfInterest::from_bbox(BoundingBox::new(-10.0, 35.0, 5.0, 45.0).unwrap())
    }

    fn collections() -> Vec<OpenCollection> {
        CatalogConfig::default().collections
    }

    #[test]
    fn test_search_request_body() {
        let window = TimeWindow::from_month_strs("2024-01", "2024-03").unwrap();
        let body = serde_json::to_value(SearchRequest::new("sentinel-2-l2a", &aoi(), Some(&window), 1)).unwrap();
        assert_eq!(
            body,
            json!({
                "collections": ["sentinel-2-l2a"],
                "datetime": "2024-01-01T00:00:00Z/2024-03-31T23:59:59Z",
                "bbox": [-10.0, 35.0, 5.0, 45.0],
                "limit": 1
            })
        );

        let polygon = json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
        });
        let aoi = AreaOfInterest::from_geometry(polygon.clone()).unwrap();
        let body = serde_json::to_value(SearchRequest::new("landsat-c2-l2", &aoi, None, 200)).unwrap();
        assert_eq!(body["intersects"], polygon);
        assert_eq!(body["datetime"], "..");
        assert!(body.get("bbox").is_none());
    }

    #[tokio::test]
    async fn test_probe_folds_failures_to_no() {
        let catalog = FakeCatalog::new(&[
            ("sentinel-2-l2a", json!({ "features": [item(Some("sentinel-2a"), "2024-02-01T10:00:00Z")] })),
            ("sentinel-1-grd", json!({ "features": [] })),
        ]);
        let window = TimeWindow::from_month_strs("2024-01", "2024-03").unwrap();

        let outcomes = probe(&catalog, &collections(), &aoi(), Some(&window), &CancellationToken::new()).await;
        let statuses: Vec<_> = outcomes.iter().map(|(_, s)| s.clone()).collect();
        assert_eq!(statuses[0], ProbeStatus::Found);
        assert_eq!(statuses[1], ProbeStatus::NotFound);
        assert!(matches!(statuses[2], ProbeStatus::Failed(_)));
        assert!(catalog.requests().iter().all(|r| r.limit == 1));

        let rows: Vec<_> = outcomes.iter().map(|(c, s)| probe_indicator(c, s)).collect();
        assert_eq!(rows[0].level, Level::Ok);
        assert_eq!(rows[0].name, "Sentinel-2");
        assert_eq!(rows[1].level, Level::No);
        assert_eq!(rows[2].level, Level::No);
        assert!(rows[2].reason.contains("502"));
    }

    #[tokio::test]
    async fn test_probe_after_cancel_issues_no_requests() {
        let catalog = FakeCatalog::new(&[]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcomes = probe(&catalog, &collections(), &aoi(), None, &cancel).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(_, s)| *s == ProbeStatus::Cancelled));
        assert!(catalog.requests().is_empty());
    }

    #[test]
    fn test_satellite_name_fallbacks() {
        let with = |props: Value| -> StacItem {
            serde_json::from_value(json!({ "properties": props })).unwrap()
        };
        assert_eq!(satellite_name(&with(json!({"platform": "landsat-9", "constellation": "landsat"})), "Landsat"), "landsat-9");
        assert_eq!(satellite_name(&with(json!({"constellation": "sentinel-1"})), "Sentinel-1"), "sentinel-1");
        assert_eq!(satellite_name(&with(json!({})), "Landsat"), "Landsat");
        assert_eq!(satellite_name(&with(json!({"platform": ""})), ""), UNKNOWN_SATELLITE);
    }

    #[tokio::test]
    async fn test_list_scenes_merges_and_sorts() {
        let catalog = FakeCatalog::new(&[
            (
                "sentinel-2-l2a",
                json!({ "features": [
                    item(Some("sentinel-2a"), "2024-01-05T10:30:00Z"),
                    item(Some("sentinel-2a"), "2024-01-05T10:30:20Z"),
                    item(Some("sentinel-2b"), "2024-01-07T10:40:00Z"),
                ]}),
            ),
            ("landsat-c2-l2", json!({ "features": [item(None, "2024-01-06T09:00:00Z")] })),
        ]);

        let groups = list_scenes(&catalog, &collections(), &aoi(), None, 200, &CancellationToken::new())
            .await
            .unwrap();

        let summary: Vec<(&str, &str, usize)> = groups
            .iter()
            .map(|g| (g.satellite.as_str(), g.date.as_str(), g.scene_count))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("sentinel-2b", "2024-01-07", 1),
                ("Landsat", "2024-01-06", 1),
                ("sentinel-2a", "2024-01-05", 2),
            ]
        );
        assert_eq!(groups[2].times.len(), 2);
        assert_eq!(groups[1].collection, "landsat-c2-l2");
        assert!(catalog.requests().iter().all(|r| r.limit == 200 && r.datetime == ".."));
    }

    #[test]
    fn test_scene_times_display() {
        let group = SceneGroup {
            satellite: "sentinel-2a".to_string(),
            date: "2024-01-05".to_string(),
            times: vec!["2024-01-05T10:30:20.024Z".to_string(), "bogus".to_string()],
            scene_count: 2,
            collection: "sentinel-2-l2a".to_string(),
        };

        let shown = group.clone().with_time_mode(TimeMode::Datetime);
        assert_eq!(shown.times, vec!["2024-01-05 10:30 UTC", "bogus"]);

        let shown = group.with_time_mode(TimeMode::Date);
        assert_eq!(shown.times, vec!["2024-01-05", "Unknown"]);
        assert_eq!(shown.scene_count, 2);
    }

    #[tokio::test]
    async fn test_list_scenes_cancelled() {
        let catalog = FakeCatalog::new(&[]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res = list_scenes(&catalog, &collections(), &aoi(), None, 200, &cancel).await;
        assert!(matches!(res, Err(AoiCoverageError::Cancelled(_))));
    }
}
