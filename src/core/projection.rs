//! Coordinate projections used for tide-grid lookup and tile merging.
//!
//! Supports WGS84 geographic coordinates and UTM zones via a Transverse
//! Mercator forward/inverse pair. This is deliberately not a general
//! projection engine; the merge step only needs to move tile outputs into
//! one shared system.

use crate::types::Crs;
use std::f64::consts::PI;

/// WGS84 equatorial radius in meters
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Trait for coordinate projections.
pub trait CoordinateProjection {
    /// Convert geographic coordinates (lat, lon) to projected (x, y) in meters.
    fn geo_to_xy(&self, lat: f64, lon: f64) -> (f64, f64);

    /// Convert projected coordinates (x, y) to geographic (lat, lon).
    fn xy_to_geo(&self, x: f64, y: f64) -> (f64, f64);
}

/// Universal Transverse Mercator projection for a specific zone.
#[derive(Debug, Clone, Copy)]
pub struct UtmProjection {
    central_meridian: f64,
    scale_factor: f64,
    false_easting: f64,
    false_northing: f64,
    zone: u8,
    northern: bool,
}

impl UtmProjection {
    /// Create a UTM projection for a given zone and hemisphere.
    pub fn new(zone: u8, northern: bool) -> Self {
        debug_assert!((1..=60).contains(&zone), "UTM zone must be 1-60");
        let central_meridian = (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0;

        Self {
            central_meridian,
            scale_factor: 0.9996,
            false_easting: 500_000.0,
            false_northing: if northern { 0.0 } else { 10_000_000.0 },
            zone,
            northern,
        }
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn is_northern(&self) -> bool {
        self.northern
    }
}

impl CoordinateProjection for UtmProjection {
    fn geo_to_xy(&self, lat: f64, lon: f64) -> (f64, f64) {
        let lat_rad = lat * PI / 180.0;
        let lon_rad = lon * PI / 180.0;
        let lon0_rad = self.central_meridian * PI / 180.0;

        let e2 = 2.0 * WGS84_F - WGS84_F * WGS84_F;
        let e_prime2 = e2 / (1.0 - e2);

        let n = WGS84_A / (1.0 - e2 * lat_rad.sin().powi(2)).sqrt();
        let t = lat_rad.tan().powi(2);
        let c = e_prime2 * lat_rad.cos().powi(2);
        let a_coef = (lon_rad - lon0_rad) * lat_rad.cos();

        // Meridian arc length
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let m = WGS84_A
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat_rad
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat_rad).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat_rad).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * lat_rad).sin());

        let x = self.scale_factor * n
            * (a_coef
                + (1.0 - t + c) * a_coef.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * e_prime2) * a_coef.powi(5) / 120.0)
            + self.false_easting;

        let y = self.scale_factor
            * (m
                + n * lat_rad.tan()
                    * (a_coef.powi(2) / 2.0
                        + (5.0 - t + 9.0 * c + 4.0 * c * c) * a_coef.powi(4) / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * e_prime2)
                            * a_coef.powi(6)
                            / 720.0))
            + self.false_northing;

        (x, y)
    }

    fn xy_to_geo(&self, x: f64, y: f64) -> (f64, f64) {
        let x = x - self.false_easting;
        let y = y - self.false_northing;

        let e2 = 2.0 * WGS84_F - WGS84_F * WGS84_F;
        let e_prime2 = e2 / (1.0 - e2);
        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

        let m = y / self.scale_factor;
        let mu = m
            / (WGS84_A
                * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1 * e1 / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let n1 = WGS84_A / (1.0 - e2 * phi1.sin().powi(2)).sqrt();
        let t1 = phi1.tan().powi(2);
        let c1 = e_prime2 * phi1.cos().powi(2);
        let r1 = WGS84_A * (1.0 - e2) / (1.0 - e2 * phi1.sin().powi(2)).powf(1.5);
        let d = x / (n1 * self.scale_factor);

        let lat = phi1
            - (n1 * phi1.tan() / r1)
                * (d * d / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * e_prime2) * d.powi(4)
                        / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * e_prime2
                        - 3.0 * c1 * c1)
                        * d.powi(6)
                        / 720.0);

        let lon = self.central_meridian * PI / 180.0
            + (d
                - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * e_prime2 + 24.0 * t1 * t1)
                    * d.powi(5)
                    / 120.0)
                / phi1.cos();

        (lat * 180.0 / PI, lon * 180.0 / PI)
    }
}

/// Convert a point between two coordinate reference systems.
///
/// Coordinates are (x, y) in the source system, where geographic systems
/// use (lon, lat) ordering to stay consistent with raster world coordinates.
pub fn reproject_point(from: Crs, to: Crs, x: f64, y: f64) -> (f64, f64) {
    if from == to {
        return (x, y);
    }

    // Route through geographic (lat, lon)
    let (lat, lon) = match from {
        Crs::Geographic => (y, x),
        Crs::Utm { zone, northern } => UtmProjection::new(zone, northern).xy_to_geo(x, y),
    };

    match to {
        Crs::Geographic => (lon, lat),
        Crs::Utm { zone, northern } => UtmProjection::new(zone, northern).geo_to_xy(lat, lon),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_utm_roundtrip() {
        let proj = UtmProjection::new(55, false);

        // Near Hobart (42.88°S, 147.33°E), UTM zone 55S
        let (x, y) = proj.geo_to_xy(-42.88, 147.33);
        assert!(x > 100_000.0 && x < 900_000.0, "easting {}", x);
        assert!(y > 0.0 && y < 10_000_000.0, "northing {}", y);

        let (lat, lon) = proj.xy_to_geo(x, y);
        assert_abs_diff_eq!(lat, -42.88, epsilon = 0.001);
        assert_abs_diff_eq!(lon, 147.33, epsilon = 0.001);
    }

    #[test]
    fn test_utm_central_meridian_easting() {
        // A point on the central meridian maps to the false easting
        let proj = UtmProjection::new(50, true);
        let (x, _y) = proj.geo_to_xy(20.0, 117.0);
        assert!((x - 500_000.0).abs() < 1.0, "easting {}", x);
    }

    #[test]
    fn test_reproject_identity() {
        let crs = Crs::Utm { zone: 50, northern: false };
        let (x, y) = reproject_point(crs, crs, 345_678.0, 7_654_321.0);
        assert_eq!(x, 345_678.0);
        assert_eq!(y, 7_654_321.0);
    }

    #[test]
    fn test_reproject_utm_to_geographic() {
        let from = Crs::Utm { zone: 55, northern: false };
        let proj = UtmProjection::new(55, false);
        let (x, y) = proj.geo_to_xy(-42.88, 147.33);

        let (lon, lat) = reproject_point(from, Crs::Geographic, x, y);
        assert!((lat - (-42.88)).abs() < 0.001);
        assert!((lon - 147.33).abs() < 0.001);
    }
}
