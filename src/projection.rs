// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Spatial Market Integration Engine - UTM / WGS84 Transverse Mercator

//! Transverse Mercator on the WGS84 ellipsoid (Snyder, USGS PP 1395, §8).
//! Accurate to well under a metre inside a zone, which is far below the
//! resolution of administrative boundaries.

use serde::Serialize;

use crate::config::UtmZone;
use crate::types::{Geometry, Position};

// ─── WGS84 constants ─────────────────────────────────────────────────────────

const SEMI_MAJOR: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_223_563;
const SCALE: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

fn e2() -> f64 {
    FLATTENING * (2.0 - FLATTENING)
}

fn ep2() -> f64 {
    let e2 = e2();
    e2 / (1.0 - e2)
}

/// Meridional arc length from the equator to latitude `phi` (radians).
fn meridional_arc(phi: f64) -> f64 {
    let e2 = e2();
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    SEMI_MAJOR
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

// ─── Point transforms ────────────────────────────────────────────────────────

/// Projected `(easting, northing)` in metres to `(lon, lat)` in degrees.
pub fn utm_to_geographic(easting: f64, northing: f64, zone: UtmZone) -> (f64, f64) {
    let e2 = e2();
    let ep2 = ep2();
    let x = easting - FALSE_EASTING;
    let y = if zone.northern {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let m = y / SCALE;
    let mu = m / (SEMI_MAJOR * (1.0 - e2 / 4.0 - 3.0 * e2 * e2 / 64.0 - 5.0 * e2 * e2 * e2 / 256.0));
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let (sin1, cos1) = phi1.sin_cos();
    let tan1 = phi1.tan();
    let n1 = SEMI_MAJOR / (1.0 - e2 * sin1 * sin1).sqrt();
    let t1 = tan1 * tan1;
    let c1 = ep2 * cos1 * cos1;
    let r1 = SEMI_MAJOR * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
    let d = x / (n1 * SCALE);

    let lat = phi1
        - (n1 * tan1 / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);
    let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d.powi(5)
            / 120.0)
        / cos1;

    (zone.central_meridian() + lon.to_degrees(), lat.to_degrees())
}

/// `(lon, lat)` in degrees to projected `(easting, northing)` in metres.
pub fn geographic_to_utm(lon: f64, lat: f64, zone: UtmZone) -> (f64, f64) {
    let e2 = e2();
    let ep2 = ep2();
    let phi = lat.to_radians();
    let (sin, cos) = phi.sin_cos();
    let tan = phi.tan();

    let n = SEMI_MAJOR / (1.0 - e2 * sin * sin).sqrt();
    let t = tan * tan;
    let c = ep2 * cos * cos;
    let a = cos * (lon - zone.central_meridian()).to_radians();
    let m = meridional_arc(phi);

    let easting = SCALE
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + FALSE_EASTING;
    let mut northing = SCALE
        * (m + n
            * tan
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if !zone.northern {
        northing += FALSE_NORTHING_SOUTH;
    }
    (easting, northing)
}

/// Heuristic: a position whose first two coordinates fit lon/lat ranges is
/// already geographic.
pub fn looks_geographic(x: f64, y: f64) -> bool {
    x.abs() <= 180.0 && y.abs() <= 90.0
}

// ─── Geometry reprojection ───────────────────────────────────────────────────

/// Position counts from one reprojection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReprojectionStats {
    pub projected: usize,
    pub passed_through: usize,
    /// Positions with fewer than two coordinates or non-finite values. Left
    /// untouched.
    pub invalid: usize,
}

impl ReprojectionStats {
    pub fn merge(&mut self, other: ReprojectionStats) {
        self.projected += other.projected;
        self.passed_through += other.passed_through;
        self.invalid += other.invalid;
    }
}

/// Reproject every position of `geometry` to WGS84 in place. Elevation and
/// any further ordinates are kept.
pub fn reproject(geometry: &mut Geometry, zone: UtmZone) -> ReprojectionStats {
    let mut stats = ReprojectionStats::default();
    geometry.map_positions(&mut |p: &mut Position| {
        let (x, y) = match p.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => (*x, *y),
            _ => {
                stats.invalid += 1;
                return;
            }
        };
        if looks_geographic(x, y) {
            stats.passed_through += 1;
            return;
        }
        let (lon, lat) = utm_to_geographic(x, y, zone);
        if lon.is_finite() && lat.is_finite() {
            p[0] = lon;
            p[1] = lat;
            stats.projected += 1;
        } else {
            stats.invalid += 1;
        }
    });
    stats
}

// ===========================================================================
// Tests
// ===========================================================================
