//! TLE (Two-Line Element) handling module.
//!
//! This module fetches TLE text from configured source URLs, caches it with a
//! per-source time-to-live and parses it into named element sets.

use crate::{
    cache::{ttl_from_hours, CacheEntry, KeyedLocks, TextCache},
    AoiCoverageError, AoiCoverageResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("aoi_coverage/", env!("CARGO_PKG_VERSION"));

/// A named pair of TLE lines. Opaque to everything but the propagator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrbitalElements {
    pub name: String,
    pub line1: String,
    pub line2: String,
}

/// Something that can retrieve the text body of a URL.
#[async_trait]
pub trait TextFetcher: Send + Sync {
    /// # Errors
    /// Returns `AoiCoverageError::Fetch` on network errors and non-success
    /// HTTP status codes.
    async fn fetch_text(&self, url: &str) -> AoiCoverageResult<String>;
}

/// `TextFetcher` over a shared reqwest client.
pub struct HttpTextFetcher {
    client: reqwest::Client,
}

impl HttpTextFetcher {
    pub fn new(timeout: std::time::Duration) -> AoiCoverageResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AoiCoverageError::Fetch(format!("Failed to create HTTP client: {e}")))?;
        Ok(HttpTextFetcher { client })
    }
}

#[async_trait]
impl TextFetcher for HttpTextFetcher {
    async fn fetch_text(&self, url: &str) -> AoiCoverageResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AoiCoverageError::Fetch(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AoiCoverageError::Fetch(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AoiCoverageError::Fetch(format!("Failed to read response: {e}")))
    }
}

/// Fetches TLE text through a TTL cache.
pub struct TleStore {
    cache: Arc<dyn TextCache>,
    fetcher: Arc<dyn TextFetcher>,
    locks: KeyedLocks,
}

impl TleStore {
    pub fn new(cache: Arc<dyn TextCache>, fetcher: Arc<dyn TextFetcher>) -> Self {
        TleStore {
            cache,
            fetcher,
            locks: KeyedLocks::default(),
        }
    }

    /// Returns the raw TLE text for `source_url`.
    ///
    /// A cache entry under `cache_key` younger than `ttl_hours` is returned
    /// without network access. Otherwise the text is fetched and stored; a
    /// failure to store is logged and ignored.
    ///
    /// # Errors
    /// Returns `AoiCoverageError::Fetch` if the source cannot be retrieved.
    pub async fn fetch_elements(
        &self,
        source_url: &str,
        cache_key: &str,
        ttl_hours: f64,
    ) -> AoiCoverageResult<String> {
        self.fetch_elements_at(source_url, cache_key, ttl_hours, Utc::now())
            .await
    }

    pub(crate) async fn fetch_elements_at(
        &self,
        source_url: &str,
        cache_key: &str,
        ttl_hours: f64,
        now: DateTime<Utc>,
    ) -> AoiCoverageResult<String> {
        let _guard = self.locks.lock(cache_key).await;

        if let Some(entry) = self.cache.get(cache_key).await {
            if entry.is_fresh(now, ttl_from_hours(ttl_hours)) {
                debug!("using cached TLE text for {cache_key} (stored {})", entry.stored_at);
                return Ok(entry.text);
            }
        }

        info!("fetching TLE text for {cache_key} from {source_url}");
        let text = self.fetcher.fetch_text(source_url).await?;

        if let Err(e) = self
            .cache
            .put(cache_key, CacheEntry::new(text.clone(), now))
            .await
        {
            warn!("failed to cache TLE text for {cache_key}: {e}");
        }

        Ok(text)
    }
}

/// Splits TLE text into element sets.
///
/// Non-empty trimmed lines are taken in groups of three (name, line 1,
/// line 2). A group is kept only if line 1 starts with `"1 "` and line 2 with
/// `"2 "`; malformed groups and a short trailing group are dropped.
pub fn parse_element_sets(text: &str) -> Vec<OrbitalElements> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    lines
        .chunks_exact(3)
        .filter(|group| group[1].starts_with("1 ") && group[2].starts_with("2 "))
        .map(|group| OrbitalElements {
            name: group[0].to_string(),
            line1: group[1].to_string(),
            line2: group[2].to_string(),
        })
        .collect()
}

/// Looks up an element set by display name.
///
/// Exact case-insensitive match first, then a case-insensitive substring
/// match. Several substring matches without an exact match are ambiguous.
///
/// # Errors
/// Returns `AoiCoverageError::NameMatch` if the name is absent or ambiguous.
pub fn find_elements<'a>(
    sets: &'a [OrbitalElements],
    name: &str,
) -> AoiCoverageResult<&'a OrbitalElements> {
    let needle = name.trim().to_lowercase();

    if let Some(exact) = sets.iter().find(|s| s.name.to_lowercase() == needle) {
        return Ok(exact);
    }

    let partial: Vec<&OrbitalElements> = sets
        .iter()
        .filter(|s| s.name.to_lowercase().contains(&needle))
        .collect();

    match partial.as_slice() {
        [single] => Ok(single),
        [] => Err(AoiCoverageError::NameMatch(format!(
            "TLE for '{name}' not found"
        ))),
        several => Err(AoiCoverageError::NameMatch(format!(
            "TLE name '{name}' is ambiguous ({} candidates: {})",
            several.len(),
            several
                .iter()
                .take(3)
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::MemoryTextCache;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) const ISS_TLE: &str = "ISS (ZARYA)
1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927
2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    pub(crate) const WEATHER_TLE: &str = r#"ISS (ZARYA)
1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927
2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537
0 NOAA 21
1 54234U 22150A   25076.92835707  .00000366  00000-0  19403-3 0  9994
2 54234  98.7204  17.0432 0002710  72.7407 287.4066 14.19556514121811
NOAA 21 (JPSS-2) PREVIOUS
1 54234U 22150A   25076.57593612  .00000324  00000-0  17437-3 0  9990
2 54234  98.7204  16.6962 0002723  73.3399 286.8075 14.19555996121765
"#;

    /// Serves canned text or a failure and counts calls.
    pub(crate) struct FakeFetcher {
        pub body: Option<String>,
        pub calls: AtomicUsize,
    }

    impl FakeFetcher {
        pub(crate) fn ok(body: &str) -> Self {
            FakeFetcher {
                body: Some(body.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            FakeFetcher {
                body: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextFetcher for FakeFetcher {
        async fn fetch_text(&self, _url: &str) -> AoiCoverageResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.body
                .clone()
                .ok_or_else(|| AoiCoverageError::Fetch("HTTP request failed: connection refused".to_string()))
        }
    }

    #[test]
    fn test_parse_element_sets() {
        let sets = parse_element_sets(WEATHER_TLE);
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].name, "ISS (ZARYA)");
        assert!(sets[0].line1.starts_with("1 25544U"));
        assert!(sets[0].line2.starts_with("2 25544"));
    }

    #[test]
    fn test_parse_drops_malformed_trailing_pair() {
        let text = format!(
            "{ISS_TLE}\nBROKEN SAT\nX 99999U 98067A   24001.50000000\n2 99999  51.6416"
        );
        let sets = parse_element_sets(&text);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].name, "ISS (ZARYA)");
    }

    #[test]
    fn test_parse_drops_short_trailing_group() {
        let text = format!("\n\n{ISS_TLE}\n\nLONELY NAME\n1 11111U\n");
        assert_eq!(parse_element_sets(&text).len(), 1);
    }

    #[test]
    fn test_find_elements() {
        let sets = parse_element_sets(WEATHER_TLE);
        assert_eq!(find_elements(&sets, "iss (zarya)").unwrap().name, "ISS (ZARYA)");
        assert_eq!(find_elements(&sets, "zarya").unwrap().name, "ISS (ZARYA)");
        assert_eq!(find_elements(&sets, "jpss-2").unwrap().name, "NOAA 21 (JPSS-2) PREVIOUS");

        let err = find_elements(&sets, "noaa 21").unwrap_err();
        assert!(matches!(err, AoiCoverageError::NameMatch(_)));
        assert!(err.to_string().contains("ambiguous"));

        assert!(matches!(
            find_elements(&sets, "HUBBLE"),
            Err(AoiCoverageError::NameMatch(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_uses_cache_within_ttl() {
        let fetcher = Arc::new(FakeFetcher::ok(WEATHER_TLE));
        let store = TleStore::new(Arc::new(MemoryTextCache::new()), fetcher.clone());
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();

        let text = store
            .fetch_elements_at("https://example.org/stations", "tle:stations", 2.0, t0)
            .await
            .unwrap();
        assert_eq!(text, WEATHER_TLE);
        assert_eq!(fetcher.calls(), 1);

        store
            .fetch_elements_at("https://example.org/stations", "tle:stations", 2.0, t0 + Duration::minutes(90))
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 1);

        store
            .fetch_elements_at("https://example.org/stations", "tle:stations", 2.0, t0 + Duration::hours(3))
            .await
            .unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_fetch_error() {
        let store = TleStore::new(
            Arc::new(MemoryTextCache::new()),
            Arc::new(FakeFetcher::failing()),
        );
        let err = store
            .fetch_elements("https://example.org/a", "tle:a", 2.0)
            .await
            .unwrap_err();
        assert!(matches!(err, AoiCoverageError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_stale_cache_is_not_used_when_fetch_fails() {
        let cache = Arc::new(MemoryTextCache::new());
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        cache
            .put("tle:a", CacheEntry::new(ISS_TLE.to_string(), t0))
            .await
            .unwrap();

        let store = TleStore::new(cache, Arc::new(FakeFetcher::failing()));
        let res = store
            .fetch_elements_at("https://example.org/a", "tle:a", 2.0, t0 + Duration::hours(5))
            .await;
        assert!(res.is_err());
    }

    struct ReadOnlyCache;

    #[async_trait]
    impl TextCache for ReadOnlyCache {
        async fn get(&self, _key: &str) -> Option<CacheEntry> {
            None
        }
        async fn put(&self, _key: &str, _entry: CacheEntry) -> AoiCoverageResult<()> {
            Err(AoiCoverageError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_swallowed() {
        let store = TleStore::new(Arc::new(ReadOnlyCache), Arc::new(FakeFetcher::ok(ISS_TLE)));
        let text = store
            .fetch_elements("https://example.org/a", "tle:a", 2.0)
            .await
            .unwrap();
        assert_eq!(text, ISS_TLE);
    }
}
