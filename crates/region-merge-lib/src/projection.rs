//! Coordinate reference frames and the projector used for area measurement
//!
//! Regions arrive in a native frame (usually WGS84 degrees) and are measured in a planar
//! frame. Only three frames are known: WGS84, Web Mercator and the WGS84 cylindrical
//! equal-area grid. Every non-identity transform goes through geographic coordinates.

use crate::{MergeError, Result};
use geo::{Area, BoundingRect, Coord, MapCoords, MultiPolygon};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Web Mercator bounds in meters (EPSG:3857)
pub const EARTH_MERCATOR_MAX: f64 = 20037508.34;
pub const EARTH_MERCATOR_MIN: f64 = -20037508.34;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Square meters in one square kilometer
pub const SQUARE_METERS_PER_KM2: f64 = 1e6;

/// Precomputed constant: EARTH_MERCATOR_MAX / 180.0
const LON_TO_X_FACTOR: f64 = EARTH_MERCATOR_MAX / 180.0;

/// Precomputed constant: EARTH_MERCATOR_MAX / PI
const Y_FACTOR: f64 = EARTH_MERCATOR_MAX / std::f64::consts::PI;

/// Precomputed constant: 180.0 / EARTH_MERCATOR_MAX
const X_TO_LON_FACTOR: f64 = 180.0 / EARTH_MERCATOR_MAX;

/// Precomputed constant: PI / EARTH_MERCATOR_MAX
const Y_TO_LAT_FACTOR: f64 = std::f64::consts::PI / EARTH_MERCATOR_MAX;

/// WGS84 semi-major axis in meters
const WGS84_A: f64 = 6378137.0;

/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257223563;

/// Standard parallel of EPSG:6933, in degrees
const EQUAL_AREA_STANDARD_PARALLEL: f64 = 30.0;

/// Tolerance on the Web Mercator extent, in meters
const MERCATOR_SLACK_METERS: f64 = 1.0;

/// Slack allowed on range checks, absorbs rounding in upstream data
const RANGE_EPSILON: f64 = 1e-9;

/// A coordinate reference frame known to the projector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Crs {
    /// EPSG:4326, longitude/latitude in degrees
    Wgs84,
    /// EPSG:3857, Web Mercator meters
    WebMercator,
    /// EPSG:6933, WGS84 / NSIDC EASE-Grid 2.0 Global (cylindrical equal-area meters)
    EqualArea,
}

impl Crs {
    /// EPSG code of this frame
    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::EqualArea => 6933,
        }
    }

    /// Whether coordinates in this frame are lengths (meters), suitable for area measurement
    pub fn is_planar(&self) -> bool {
        !matches!(self, Crs::Wgs84)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = MergeError;

    /// Accepts `EPSG:<code>`, a bare code, or a common alias (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        let code = normalized.strip_prefix("epsg:").unwrap_or(&normalized);
        match code {
            "4326" | "wgs84" => Ok(Crs::Wgs84),
            "3857" | "webmercator" | "web-mercator" => Ok(Crs::WebMercator),
            "6933" | "equal-area" | "ease2" => Ok(Crs::EqualArea),
            _ => Err(MergeError::UnsupportedProjection(s.to_string())),
        }
    }
}

/// Fixed source/target frame pair
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Projector {
    source: Crs,
    target: Crs,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Projector {
    /// Create a projector from `source` to `target`
    ///
    /// # Errors
    /// `UnsupportedProjection` if the target is not planar, areas in degrees are meaningless.
    pub fn new(source: Crs, target: Crs) -> Result<Self> {
        if !target.is_planar() {
            return Err(MergeError::UnsupportedProjection(format!(
                "target frame {target} is not planar"
            )));
        }
        Ok(Self { source, target })
    }

    #[inline]
    pub fn source(&self) -> Crs {
        self.source
    }

    #[inline]
    pub fn target(&self) -> Crs {
        self.target
    }

    /// Transform a single coordinate from the source to the target frame
    pub fn project_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        check_range(self.source, coord)?;
        if self.source == self.target {
            return Ok(coord);
        }
        let (lat, lon) = match self.source {
            Crs::Wgs84 => (coord.y, coord.x),
            Crs::WebMercator => mercator_to_wgs84(coord.x, coord.y),
            Crs::EqualArea => equal_area_to_wgs84(coord.x, coord.y),
        };
        Ok(match self.target {
            Crs::WebMercator => wgs84_to_mercator(lat, lon),
            Crs::EqualArea => wgs84_to_equal_area(lat, lon),
            // Rejected in `new`
            Crs::Wgs84 => Coord { x: lon, y: lat },
        })
    }

    /// Reproject a native geometry into the planar frame
    ///
    /// # Errors
    /// `ProjectionFailure` if a coordinate is outside the source frame, or if the
    /// geometry lies entirely beyond the Web Mercator latitude limit and would be
    /// flattened onto it.
    pub fn to_planar(&self, geometry: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        let planar = geometry.try_map_coords(|coord| self.project_coord(coord))?;
        if self.target == Crs::WebMercator && self.source != Crs::WebMercator {
            check_mercator_coverage(&planar)?;
        }
        Ok(planar)
    }

    /// Area of a planar geometry, in square meters of the target frame
    ///
    /// # Errors
    /// `InvalidGeometry` if the geometry is empty or its area is not a finite number.
    pub fn area(&self, planar: &MultiPolygon<f64>) -> Result<f64> {
        if planar.0.is_empty() {
            return Err(MergeError::InvalidGeometry(
                "cannot measure an empty geometry".to_string(),
            ));
        }
        let area = planar.unsigned_area();
        if !area.is_finite() {
            return Err(MergeError::InvalidGeometry(format!(
                "area is not finite ({area})"
            )));
        }
        Ok(area)
    }

    /// Area of a planar geometry in square kilometers
    pub fn area_km2(&self, planar: &MultiPolygon<f64>) -> Result<f64> {
        Ok(self.area(planar)? / SQUARE_METERS_PER_KM2)
    }
}

fn check_range(crs: Crs, coord: Coord<f64>) -> Result<()> {
    let in_range = match crs {
        Crs::Wgs84 => {
            coord.x.abs() <= 180.0 + RANGE_EPSILON && coord.y.abs() <= 90.0 + RANGE_EPSILON
        }
        Crs::WebMercator => is_valid_mercator(coord),
        Crs::EqualArea => {
            let (x_max, y_max) = equal_area_bounds();
            coord.x.abs() <= x_max + RANGE_EPSILON && coord.y.abs() <= y_max + RANGE_EPSILON
        }
    };
    if in_range {
        Ok(())
    } else {
        Err(MergeError::ProjectionFailure(format!(
            "coordinate ({}, {}) is outside the valid range of {crs}",
            coord.x, coord.y
        )))
    }
}

/// Fail when every coordinate was clamped onto the same latitude limit
fn check_mercator_coverage(planar: &MultiPolygon<f64>) -> Result<()> {
    let north = wgs84_to_mercator(MAX_LATITUDE, 0.0).y;
    let south = wgs84_to_mercator(-MAX_LATITUDE, 0.0).y;
    match planar.bounding_rect() {
        Some(rect) if rect.min().y >= north || rect.max().y <= south => {
            Err(MergeError::ProjectionFailure(format!(
                "geometry lies entirely beyond the ±{MAX_LATITUDE}° latitude limit of {}",
                Crs::WebMercator
            )))
        }
        _ => Ok(()),
    }
}

/// Convert WGS84 (lat, lon) to Web Mercator (x, y) in meters
///
/// Latitude is clamped to the valid Web Mercator range, so polar rings stay finite.
#[inline(always)]
pub fn wgs84_to_mercator(lat: f64, lon: f64) -> Coord<f64> {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);

    let x = lon * LON_TO_X_FACTOR;

    let lat_rad = lat.to_radians();
    let y = (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * Y_FACTOR;

    Coord { x, y }
}

/// Convert Web Mercator (x, y) in meters to WGS84 (lat, lon)
#[inline(always)]
pub fn mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = x * X_TO_LON_FACTOR;
    let lat =
        (std::f64::consts::PI / 2.0 - 2.0 * ((-y * Y_TO_LAT_FACTOR).exp()).atan()).to_degrees();
    (lat, lon)
}

/// Check if a coordinate is within Web Mercator bounds
///
/// Allows [`MERCATOR_SLACK_METERS`] beyond the rounded extent, since exported data often
/// uses the full-precision half-circumference.
#[inline(always)]
pub fn is_valid_mercator(coord: Coord<f64>) -> bool {
    coord.x >= EARTH_MERCATOR_MIN - MERCATOR_SLACK_METERS
        && coord.x <= EARTH_MERCATOR_MAX + MERCATOR_SLACK_METERS
        && coord.y >= EARTH_MERCATOR_MIN - MERCATOR_SLACK_METERS
        && coord.y <= EARTH_MERCATOR_MAX + MERCATOR_SLACK_METERS
}

#[inline(always)]
fn eccentricity_squared() -> f64 {
    WGS84_F * (2.0 - WGS84_F)
}

/// Scale factor along the equator for the EPSG:6933 standard parallel
#[inline(always)]
fn equal_area_k0() -> f64 {
    let e2 = eccentricity_squared();
    let phi = EQUAL_AREA_STANDARD_PARALLEL.to_radians();
    phi.cos() / (1.0 - e2 * phi.sin().powi(2)).sqrt()
}

/// Authalic `q` function of the ellipsoid for latitude `phi` (radians)
#[inline(always)]
fn authalic_q(phi: f64) -> f64 {
    let e2 = eccentricity_squared();
    let e = e2.sqrt();
    let sin_phi = phi.sin();
    (1.0 - e2)
        * (sin_phi / (1.0 - e2 * sin_phi * sin_phi)
            - (1.0 / (2.0 * e)) * ((1.0 - e * sin_phi) / (1.0 + e * sin_phi)).ln())
}

/// Half-extents (x, y) of the EPSG:6933 world in meters
pub fn equal_area_bounds() -> (f64, f64) {
    let k0 = equal_area_k0();
    let q_pole = authalic_q(std::f64::consts::FRAC_PI_2);
    (
        WGS84_A * k0 * std::f64::consts::PI,
        WGS84_A * q_pole / (2.0 * k0),
    )
}

/// Convert WGS84 (lat, lon) to EPSG:6933 (x, y) in meters
pub fn wgs84_to_equal_area(lat: f64, lon: f64) -> Coord<f64> {
    let k0 = equal_area_k0();
    let x = WGS84_A * k0 * lon.to_radians();
    let y = WGS84_A * authalic_q(lat.to_radians()) / (2.0 * k0);
    Coord { x, y }
}

/// Convert EPSG:6933 (x, y) in meters to WGS84 (lat, lon)
pub fn equal_area_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let e2 = eccentricity_squared();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let k0 = equal_area_k0();
    let q_pole = authalic_q(std::f64::consts::FRAC_PI_2);

    let q = 2.0 * y * k0 / WGS84_A;
    let beta = (q / q_pole).clamp(-1.0, 1.0).asin();
    // Series inversion of the authalic latitude
    let phi = beta
        + (e2 / 3.0 + 31.0 * e4 / 180.0 + 517.0 * e6 / 5040.0) * (2.0 * beta).sin()
        + (23.0 * e4 / 360.0 + 251.0 * e6 / 3780.0) * (4.0 * beta).sin()
        + (761.0 * e6 / 45360.0) * (6.0 * beta).sin();

    let lon = (x / (WGS84_A * k0)).to_degrees();
    (phi.to_degrees(), lon)
}
