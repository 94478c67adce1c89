//! Geo primitives.
//!
//! Bounding-box predicates shared by the coverage evaluator and the pass
//! predictor. All values are WGS84 degrees. Boxes are assumed not to cross
//! the antimeridian (`west <= east`); crossing boxes are accepted but are not
//! unwrapped, so predicates on them are unreliable.

use crate::{AoiCoverageError, AoiCoverageResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Latitude limit used to keep downstream trigonometry away from the poles.
pub const MAX_ABS_LATITUDE: f64 = 89.999;

/// An axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BboxRepr")]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// Accepted serialized forms: `{west,south,east,north}` or `[w,s,e,n]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum BboxRepr {
    Object {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
    },
    Array([f64; 4]),
}

impl TryFrom<BboxRepr> for BoundingBox {
    type Error = AoiCoverageError;

    fn try_from(repr: BboxRepr) -> AoiCoverageResult<Self> {
        match repr {
            BboxRepr::Object {
                west,
                south,
                east,
                north,
            } => BoundingBox::new(west, south, east, north),
            BboxRepr::Array([west, south, east, north]) => {
                BoundingBox::new(west, south, east, north)
            }
        }
    }
}

/// A single geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl BoundingBox {
    /// Creates a validated bounding box.
    ///
    /// # Errors
    /// Returns `AoiCoverageError::InvalidInput` for non-finite values, values
    /// outside the WGS84 range, or `south > north`.
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> AoiCoverageResult<Self> {
        if ![west, south, east, north].iter().all(|v| v.is_finite()) {
            return Err(AoiCoverageError::InvalidInput(
                "bounding box values must be finite".to_string(),
            ));
        }
        if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) {
            return Err(AoiCoverageError::InvalidInput(format!(
                "latitude out of range in bbox ({south}, {north})"
            )));
        }
        if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
            return Err(AoiCoverageError::InvalidInput(format!(
                "longitude out of range in bbox ({west}, {east})"
            )));
        }
        if south > north {
            return Err(AoiCoverageError::InvalidInput(format!(
                "bbox south {south} is greater than north {north}"
            )));
        }
        Ok(BoundingBox {
            west,
            south,
            east,
            north,
        })
    }

    /// Whether this box wraps across the antimeridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.west > self.east
    }

    /// Returns a copy grown by `dlat`/`dlon` degrees on every side.
    ///
    /// The result is not re-validated; it may extend past the poles or the
    /// antimeridian, which is harmless for point membership tests.
    pub fn inflate(&self, dlat: f64, dlon: f64) -> BoundingBox {
        BoundingBox {
            west: self.west - dlon,
            south: self.south - dlat,
            east: self.east + dlon,
            north: self.north + dlat,
        }
    }

    /// Inclusive point-in-box membership.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.south && lat <= self.north && lon >= self.west && lon <= self.east
    }

    /// The box as `[west, south, east, north]`, the order used by STAC `bbox`.
    pub fn to_array(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }
}

impl FromStr for BoundingBox {
    type Err = AoiCoverageError;

    /// Parses `"west,south,east,north"`.
    fn from_str(s: &str) -> AoiCoverageResult<Self> {
        let values = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| AoiCoverageError::InvalidInput(format!("invalid bbox '{s}': {e}")))?;

        if values.len() != 4 {
            return Err(AoiCoverageError::InvalidInput(format!(
                "bbox needs 4 values (west,south,east,north), got {}",
                values.len()
            )));
        }
        BoundingBox::new(values[0], values[1], values[2], values[3])
    }
}

/// The area of interest handed to the engine by the outer UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaOfInterest {
    pub bbox: BoundingBox,
    /// Optional GeoJSON geometry, only used for catalog `intersects` queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,
}

impl AreaOfInterest {
    pub fn from_bbox(bbox: BoundingBox) -> Self {
        AreaOfInterest {
            bbox,
            geometry: None,
        }
    }

    /// Builds an AOI from a GeoJSON geometry, feature or feature collection.
    /// The bounding box is derived from the geometry.
    pub fn from_geometry(geometry: Value) -> AoiCoverageResult<Self> {
        let bbox = bbox_from_geometry(&geometry)?;
        let geometry = match geometry.get("type").and_then(Value::as_str) {
            Some("Feature") => geometry.get("geometry").cloned(),
            Some("FeatureCollection") => None, // not a single geometry, bbox only
            _ => Some(geometry),
        };
        Ok(AreaOfInterest { bbox, geometry })
    }

    pub fn center(&self) -> GeoPoint {
        bbox_center(&self.bbox)
    }
}

/// True unless `b` is strictly outside `a` on either axis.
///
/// Longitudes are compared as-is, without antimeridian unwrapping.
pub fn bbox_intersects(a: &BoundingBox, b: &BoundingBox) -> bool {
    !(b.east < a.west || b.west > a.east || b.north < a.south || b.south > a.north)
}

/// Arithmetic midpoint of the box edges.
pub fn bbox_center(b: &BoundingBox) -> GeoPoint {
    GeoPoint {
        lat: (b.south + b.north) / 2.0,
        lon: (b.west + b.east) / 2.0,
    }
}

/// Folds a longitude into `[-180, 180]`.
pub fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

/// Clamps a latitude to `[-89.999, 89.999]`.
pub fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(-MAX_ABS_LATITUDE, MAX_ABS_LATITUDE)
}

/// Extracts the bounding box of a GeoJSON object.
///
/// Accepts any geometry type as well as `Feature`, `FeatureCollection` and
/// `GeometryCollection`.
pub fn bbox_from_geometry(geojson: &Value) -> AoiCoverageResult<BoundingBox> {
    let mut extent: Option<(f64, f64, f64, f64)> = None;
    collect_extent(geojson, &mut extent);

    let (west, south, east, north) = extent.ok_or_else(|| {
        AoiCoverageError::InvalidInput("geometry contains no coordinates".to_string())
    })?;
    BoundingBox::new(west, south, east, north)
}

fn collect_extent(value: &Value, extent: &mut Option<(f64, f64, f64, f64)>) {
    match value.get("type").and_then(Value::as_str) {
        Some("Feature") => {
            if let Some(g) = value.get("geometry") {
                collect_extent(g, extent);
            }
        }
        Some("FeatureCollection") => {
            for f in value
                .get("features")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                collect_extent(f, extent);
            }
        }
        Some("GeometryCollection") => {
            for g in value
                .get("geometries")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                collect_extent(g, extent);
            }
        }
        _ => {
            if let Some(coords) = value.get("coordinates") {
                collect_positions(coords, extent);
            }
        }
    }
}

fn collect_positions(coords: &Value, extent: &mut Option<(f64, f64, f64, f64)>) {
    let Some(items) = coords.as_array() else {
        return;
    };

    // a position is an array whose first two members are numbers
    if let (Some(lon), Some(lat)) = (
        items.first().and_then(Value::as_f64),
        items.get(1).and_then(Value::as_f64),
    ) {
        *extent = Some(match *extent {
            None => (lon, lat, lon, lat),
            Some((w, s, e, n)) => (w.min(lon), s.min(lat), e.max(lon), n.max(lat)),
        });
        return;
    }

    for item in items {
        collect_positions(item, extent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bbox(w: f64, s: f64, e: f64, n: f64) -> BoundingBox {
        BoundingBox::new(w, s, e, n).unwrap()
    }

    #[test]
    fn test_bbox_intersects_is_symmetric() {
        let boxes = [
            bbox(-10.0, 35.0, 5.0, 45.0),
            bbox(0.0, 40.0, 20.0, 60.0),
            bbox(6.0, 35.0, 10.0, 45.0),
            bbox(-180.0, -90.0, 180.0, 90.0),
            bbox(-10.0, 46.0, 5.0, 50.0),
            bbox(5.0, 45.0, 6.0, 46.0), // touching corner
        ];

        for a in &boxes {
            for b in &boxes {
                assert_eq!(bbox_intersects(a, b), bbox_intersects(b, a), "{a:?} / {b:?}");
            }
        }
    }

    #[test]
    fn test_bbox_intersects() {
        let aoi = bbox(-10.0, 35.0, 5.0, 45.0);
        assert!(bbox_intersects(&aoi, &bbox(0.0, 40.0, 20.0, 60.0)));
        assert!(bbox_intersects(&aoi, &bbox(5.0, 45.0, 6.0, 46.0)));
        assert!(!bbox_intersects(&aoi, &bbox(6.0, 35.0, 10.0, 45.0)));
        assert!(!bbox_intersects(&aoi, &bbox(-10.0, 46.0, 5.0, 50.0)));
    }

    #[test]
    fn test_bbox_center() {
        let c = bbox_center(&bbox(-10.0, 35.0, 5.0, 45.0));
        assert_eq!(c.lat, 40.0);
        assert_eq!(c.lon, -2.5);
    }

    #[test]
    fn test_normalize_longitude() {
        assert_eq!(normalize_longitude(10.0), 10.0);
        assert_eq!(normalize_longitude(180.0), 180.0);
        assert_eq!(normalize_longitude(190.0), -170.0);
        assert_eq!(normalize_longitude(-190.0), 170.0);
        assert_eq!(normalize_longitude(540.0), -180.0);
    }

    #[test]
    fn test_clamp_latitude() {
        assert_eq!(clamp_latitude(90.0), MAX_ABS_LATITUDE);
        assert_eq!(clamp_latitude(-95.0), -MAX_ABS_LATITUDE);
        assert_eq!(clamp_latitude(45.0), 45.0);
    }

    #[test]
    fn test_bbox_validation() {
        assert!(BoundingBox::new(0.0, 10.0, 5.0, 5.0).is_err());
        assert!(BoundingBox::new(0.0, -91.0, 5.0, 5.0).is_err());
        assert!(BoundingBox::new(f64::NAN, 0.0, 5.0, 5.0).is_err());
        assert!(BoundingBox::new(170.0, 0.0, -170.0, 5.0)
            .unwrap()
            .crosses_antimeridian());
    }

    #[test]
    fn test_bbox_from_str() {
        let b: BoundingBox = "-10, 35, 5, 45".parse().unwrap();
        assert_eq!(b, bbox(-10.0, 35.0, 5.0, 45.0));
        assert!("1,2,3".parse::<BoundingBox>().is_err());
        assert!("a,b,c,d".parse::<BoundingBox>().is_err());
    }

    #[test]
    fn test_bbox_deserialize_forms() {
        let a: BoundingBox =
            serde_json::from_value(json!({"west": 1.0, "south": 2.0, "east": 3.0, "north": 4.0}))
                .unwrap();
        let b: BoundingBox = serde_json::from_value(json!([1.0, 2.0, 3.0, 4.0])).unwrap();
        assert_eq!(a, b);
        assert!(serde_json::from_value::<BoundingBox>(json!([1.0, 5.0, 3.0, 4.0])).is_err());
    }

    #[test]
    fn test_bbox_from_geometry() {
        let polygon = json!({
            "type": "Polygon",
            "coordinates": [[[-10.0, 35.0], [5.0, 35.0], [5.0, 45.0], [-10.0, 45.0], [-10.0, 35.0]]]
        });
        assert_eq!(bbox_from_geometry(&polygon).unwrap(), bbox(-10.0, 35.0, 5.0, 45.0));

        let multi = json!({
            "type": "Feature",
            "properties": {},
            "geometry": {
                "type": "MultiPolygon",
                "coordinates": [
                    [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
                    [[[10.0, -5.0], [12.0, -5.0], [12.0, 2.0], [10.0, -5.0]]]
                ]
            }
        });
        assert_eq!(bbox_from_geometry(&multi).unwrap(), bbox(0.0, -5.0, 12.0, 2.0));

        let empty = json!({"type": "Polygon", "coordinates": []});
        assert!(bbox_from_geometry(&empty).is_err());
    }

    #[test]
    fn test_aoi_from_feature_keeps_geometry() {
        let feature = json!({
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [3.0, 4.0]}
        });
        let aoi = AreaOfInterest::from_geometry(feature).unwrap();
        assert_eq!(aoi.bbox, bbox(3.0, 4.0, 3.0, 4.0));
        assert_eq!(aoi.geometry.unwrap()["type"], "Point");
    }
}
