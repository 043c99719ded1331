//! Spatial math for route geometry: distances, bearings, turning angles and
//! nearest-point queries.

use serde::{Deserialize, Serialize};

use crate::models::Coordinate;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate distance between two points in meters using Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Great-circle distance between two coordinates in meters.
pub fn distance_m(a: &Coordinate, b: &Coordinate) -> f64 {
    haversine_distance(a.lat, a.lon, b.lat, b.lon)
}

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// Convert a north/south offset in meters to degrees latitude.
pub fn meters_to_lat(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lat(ref_lat_deg).max(1e-9)
}

/// Convert an east/west offset in meters to degrees longitude.
pub fn meters_to_lon(meters: f64, ref_lat_deg: f64) -> f64 {
    meters / meters_per_deg_lon(ref_lat_deg).max(1e-9)
}

/// Calculate bearing from point 1 to point 2 in radians.
/// Returns bearing in radians, 0 = north, π/2 = east.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    x.atan2(y)
}

/// Absolute heading change in degrees when travelling `a -> b -> c`, in `[0, 180]`.
pub fn turning_angle_deg(a: &Coordinate, b: &Coordinate, c: &Coordinate) -> f64 {
    let in_bearing = bearing(a.lat, a.lon, b.lat, b.lon).to_degrees();
    let out_bearing = bearing(b.lat, b.lon, c.lat, c.lon).to_degrees();
    let diff = (out_bearing - in_bearing).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Total length of a polyline in meters.
pub fn path_length_m(points: &[Coordinate]) -> f64 {
    points.windows(2).map(|pair| distance_m(&pair[0], &pair[1])).sum()
}

/// Calculate minimum distance from a point to a line segment (in meters).
///
/// Uses a local ENU projection anchored at the segment start, which is
/// accurate for the sub-kilometer edges found in road geometry.
pub fn distance_to_segment_m(
    point_lat: f64,
    point_lon: f64,
    seg_start_lat: f64,
    seg_start_lon: f64,
    seg_end_lat: f64,
    seg_end_lon: f64,
) -> f64 {
    let ref_lat = seg_start_lat;

    let px = (point_lon - seg_start_lon) * meters_per_deg_lon(ref_lat);
    let py = (point_lat - seg_start_lat) * meters_per_deg_lat(ref_lat);

    let sx = (seg_end_lon - seg_start_lon) * meters_per_deg_lon(ref_lat);
    let sy = (seg_end_lat - seg_start_lat) * meters_per_deg_lat(ref_lat);

    let seg_len_sq = sx * sx + sy * sy;
    if seg_len_sq < 0.0001 {
        return (px * px + py * py).sqrt();
    }

    // t = ((P-A) · (B-A)) / |B-A|²
    let t = ((px * sx + py * sy) / seg_len_sq).clamp(0.0, 1.0);
    let dx = px - t * sx;
    let dy = py - t * sy;

    (dx * dx + dy * dy).sqrt()
}

/// Minimum distance from a point to any edge of a polyline, in meters.
pub fn distance_to_polyline_m(point: &Coordinate, line: &[Coordinate]) -> f64 {
    match line {
        [] => f64::INFINITY,
        [only] => distance_m(point, only),
        _ => line
            .windows(2)
            .map(|pair| {
                distance_to_segment_m(
                    point.lat, point.lon, pair[0].lat, pair[0].lon, pair[1].lat, pair[1].lon,
                )
            })
            .fold(f64::INFINITY, f64::min),
    }
}

/// Index and distance of the vertex in `points` closest to `target`.
///
/// Ties resolve to the lowest index so results are stable.
pub fn closest_vertex(target: &Coordinate, points: &[Coordinate]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, point) in points.iter().enumerate() {
        let dist = distance_m(target, point);
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((idx, dist)),
        }
    }
    best
}

/// Ray-casting containment test against a closed ring given as lat/lon vertices.
pub fn point_in_polygon(point: &Coordinate, ring: &[Coordinate]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (a, b) = (&ring[i], &ring[j]);
        if (a.lat > point.lat) != (b.lat > point.lat) {
            let cross_lon = a.lon + (point.lat - a.lat) * (b.lon - a.lon) / (b.lat - a.lat);
            if point.lon < cross_lon {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Bounds of the finite points, or `None` when there are none.
    pub fn from_points(points: &[Coordinate]) -> Option<Self> {
        let mut min_lat = f64::INFINITY;
        let mut max_lat = f64::NEG_INFINITY;
        let mut min_lon = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;
        for point in points {
            if !point.lat.is_finite() || !point.lon.is_finite() {
                continue;
            }
            min_lat = min_lat.min(point.lat);
            max_lat = max_lat.max(point.lat);
            min_lon = min_lon.min(point.lon);
            max_lon = max_lon.max(point.lon);
        }
        if !min_lat.is_finite() || !min_lon.is_finite() {
            return None;
        }
        Some(Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        })
    }

    /// Square box of half-size `radius_m` around a center point.
    pub fn around(center: &Coordinate, radius_m: f64) -> Self {
        let dlat = meters_to_lat(radius_m, center.lat);
        let dlon = meters_to_lon(radius_m, center.lat);
        Self {
            min_lat: center.lat - dlat,
            min_lon: center.lon - dlon,
            max_lat: center.lat + dlat,
            max_lon: center.lon + dlon,
        }
    }

    /// Grow the box by `padding_m` on every side.
    pub fn expand_by_meters(&self, padding_m: f64) -> Self {
        let mid_lat = (self.min_lat + self.max_lat) / 2.0;
        let dlat = meters_to_lat(padding_m, mid_lat);
        let dlon = meters_to_lon(padding_m, mid_lat);
        Self {
            min_lat: self.min_lat - dlat,
            min_lon: self.min_lon - dlon,
            max_lat: self.max_lat + dlat,
            max_lon: self.max_lon + dlon,
        }
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}
