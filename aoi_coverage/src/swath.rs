//! Simplified swath hit-test.
//!
//! The sensor footprint is not modelled. Instead the AOI is inflated by the
//! swath half-width converted to degrees, and the sub-satellite point is
//! tested for membership. This is a reference-only heuristic.

use crate::geo::BoundingBox;

/// Kilometres per degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Lower bound for `cos(lat)` so the longitude delta stays finite near the poles.
pub const POLE_COS_FLOOR: f64 = 0.2;

/// Degree-space parameters of the swath inflation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwathModel {
    pub km_per_degree: f64,
    pub pole_cos_floor: f64,
}

impl Default for SwathModel {
    fn default() -> Self {
        SwathModel {
            km_per_degree: KM_PER_DEGREE,
            pole_cos_floor: POLE_COS_FLOOR,
        }
    }
}

impl SwathModel {
    /// `(dlat, dlon)` in degrees for a swath half-width at latitude `lat`.
    pub fn deltas(&self, lat: f64, swath_km: f64) -> (f64, f64) {
        let dlat = swath_km / self.km_per_degree;
        let dlon = swath_km / (self.km_per_degree * self.pole_cos_floor.max(lat.to_radians().cos()));
        (dlat, dlon)
    }

    pub fn hit(&self, lat: f64, lon: f64, aoi: &BoundingBox, swath_km: f64) -> bool {
        let (dlat, dlon) = self.deltas(lat, swath_km);
        aoi.inflate(dlat, dlon).contains(lat, lon)
    }
}

/// Whether a sub-satellite point at (`lat`, `lon`) is within `swath_km` of the
/// AOI, using the default model constants.
pub fn approx_hit(lat: f64, lon: f64, aoi: &BoundingBox, swath_km: f64) -> bool {
    SwathModel::default().hit(lat, lon, aoi, swath_km)
}
