//! SGP4 propagation adapter.
//!
//! Wraps the `sgp4` crate: a satellite record is built once from the two TLE
//! lines and then evaluated at arbitrary timestamps, yielding the
//! sub-satellite point in geodetic degrees.

use crate::{
    geo::{clamp_latitude, normalize_longitude},
    tle::OrbitalElements,
    AoiCoverageError, AoiCoverageResult,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sgp4::{Constants, Elements};

/// WGS84 equatorial radius (km)
const WGS84_A: f64 = 6378.137;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Sub-satellite point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeodeticPoint {
    /// Geodetic latitude (degrees)
    pub lat: f64,
    /// Longitude (degrees, -180..180)
    pub lon: f64,
    /// Height above the ellipsoid (km)
    pub alt_km: f64,
}

/// A propagatable satellite record.
pub struct SatellitePropagator {
    epoch: DateTime<Utc>,
    constants: Constants<'static>,
}

impl SatellitePropagator {
    /// Builds the SGP4 record from an element set.
    ///
    /// # Errors
    /// Returns `AoiCoverageError::ElementParse` if the lines are rejected by
    /// the TLE parser or the SGP4 initialization.
    pub fn new(elements: &OrbitalElements) -> AoiCoverageResult<Self> {
        let parsed = Elements::from_tle(
            Some(elements.name.clone()),
            elements.line1.as_bytes(),
            elements.line2.as_bytes(),
        )
        .map_err(|e| {
            AoiCoverageError::ElementParse(format!("Failed to parse TLE for {}: {e}", elements.name))
        })?;

        let constants = Constants::from_elements(&parsed).map_err(|e| {
            AoiCoverageError::ElementParse(format!(
                "Failed to create constants for {}: {e}",
                elements.name
            ))
        })?;

        Ok(SatellitePropagator {
            epoch: parsed.datetime.and_utc(),
            constants,
        })
    }

    /// Epoch of the underlying element set.
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Sub-satellite point at `timestamp`, or `None` if SGP4 cannot produce a
    /// position (e.g. decayed orbit or a time far outside the element validity).
    pub fn propagate(&self, timestamp: DateTime<Utc>) -> Option<GeodeticPoint> {
        let since_epoch = timestamp.signed_duration_since(self.epoch);
        let minutes_since_epoch = since_epoch.num_milliseconds() as f64 / 60_000.0;

        let prediction = self.constants.propagate(minutes_since_epoch).ok()?;
        let position = prediction.position;
        if !position.iter().all(|v| v.is_finite()) {
            return None;
        }

        let ecef = teme_to_ecef(position, gmst_rad(timestamp));
        ecef_to_geodetic(ecef)
    }
}

/// Convenience wrapper: build the record and evaluate once.
pub fn propagate(
    elements: &OrbitalElements,
    timestamp: DateTime<Utc>,
) -> AoiCoverageResult<Option<GeodeticPoint>> {
    Ok(SatellitePropagator::new(elements)?.propagate(timestamp))
}

fn julian_date(timestamp: DateTime<Utc>) -> f64 {
    let unix = timestamp.timestamp() as f64;
    let sub = timestamp.timestamp_subsec_nanos() as f64 * 1e-9;
    2440587.5 + (unix + sub) / 86400.0
}

/// Greenwich mean sidereal time (radians).
fn gmst_rad(timestamp: DateTime<Utc>) -> f64 {
    let d = julian_date(timestamp) - 2451545.0;
    let t = d / 36525.0;
    let gmst_deg = 280.46061837 + 360.98564736629 * d + 0.000387933 * t.powi(2)
        - t.powi(3) / 38710000.0;
    gmst_deg.rem_euclid(360.0).to_radians()
}

/// Rotates a TEME position into the Earth-fixed frame (polar motion ignored).
fn teme_to_ecef(position: [f64; 3], gmst: f64) -> [f64; 3] {
    let (x, y, z) = (position[0], position[1], position[2]);
    let (sin_t, cos_t) = gmst.sin_cos();
    [cos_t * x + sin_t * y, -sin_t * x + cos_t * y, z]
}

/// Bowring's method, WGS84.
fn ecef_to_geodetic(position: [f64; 3]) -> Option<GeodeticPoint> {
    let (x, y, z) = (position[0], position[1], position[2]);
    let a = WGS84_A;
    let b = a * (1.0 - WGS84_F);
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = (a * a - b * b) / (b * b);

    let p = (x * x + y * y).sqrt();
    if p < 1e-8 {
        return None;
    }

    let theta = (z * a).atan2(p * b);
    let (sin_theta, cos_theta) = theta.sin_cos();
    let lat = (z + ep2 * b * sin_theta.powi(3)).atan2(p - e2 * a * cos_theta.powi(3));
    let lon = y.atan2(x);

    let sin_lat = lat.sin();
    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let alt_km = p / lat.cos() - n;

    Some(GeodeticPoint {
        lat: clamp_latitude(lat.to_degrees()),
        lon: normalize_longitude(lon.to_degrees()),
        alt_km,
    })
}
