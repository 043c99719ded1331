//! Core data models for route planning.

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::osm::EnvironmentTag;
use crate::spatial;

/// A WGS84 position with optional elevation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation_m: Option<f64>,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            elevation_m: None,
        }
    }

    pub fn with_elevation(mut self, elevation_m: f64) -> Self {
        self.elevation_m = elevation_m.is_finite().then_some(elevation_m);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Same horizontal position, elevation ignored.
    pub fn same_position(&self, other: &Coordinate) -> bool {
        self.lat == other.lat && self.lon == other.lon
    }
}

/// Ordered travel geometry with at least two points and no consecutive
/// duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Coordinate>", into = "Vec<Coordinate>")]
pub struct RouteGeometry {
    points: Vec<Coordinate>,
    cumulative_m: Vec<f64>,
}

impl RouteGeometry {
    pub fn new(points: Vec<Coordinate>) -> Result<Self, PlanError> {
        Self::with_breaks(points, &[]).map(|(geometry, _)| geometry)
    }

    /// Build a geometry and remap point indices (e.g. way boundaries reported
    /// against the raw point list) onto the collapsed point list.
    pub fn with_breaks(
        points: Vec<Coordinate>,
        breaks: &[usize],
    ) -> Result<(Self, Vec<usize>), PlanError> {
        if let Some((index, bad)) = points.iter().enumerate().find(|(_, p)| !p.is_valid()) {
            return Err(PlanError::InvalidCoordinate {
                index,
                lat: bad.lat,
                lon: bad.lon,
            });
        }

        let mut collapsed: Vec<Coordinate> = Vec::with_capacity(points.len());
        let mut raw_to_collapsed = Vec::with_capacity(points.len());
        for point in points {
            match collapsed.last_mut() {
                Some(last) if last.same_position(&point) => {
                    if last.elevation_m.is_none() {
                        last.elevation_m = point.elevation_m;
                    }
                }
                _ => collapsed.push(point),
            }
            raw_to_collapsed.push(collapsed.len().saturating_sub(1));
        }

        if collapsed.len() < 2 {
            return Err(PlanError::InsufficientWaypoints(collapsed.len()));
        }

        let mut remapped: Vec<usize> = breaks
            .iter()
            .filter_map(|raw| raw_to_collapsed.get(*raw).copied())
            .filter(|idx| *idx > 0 && *idx < collapsed.len() - 1)
            .collect();
        remapped.sort_unstable();
        remapped.dedup();

        let cumulative_m = cumulative_distances(&collapsed);
        Ok((
            Self {
                points: collapsed,
                cumulative_m,
            },
            remapped,
        ))
    }

    pub fn points(&self) -> &[Coordinate] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false; a geometry holds at least two points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Coordinate {
        self.points[0]
    }

    pub fn last(&self) -> Coordinate {
        self.points[self.points.len() - 1]
    }

    pub fn length_m(&self) -> f64 {
        self.cumulative_m.last().copied().unwrap_or(0.0)
    }

    /// Distance along the route from the first point to each point.
    pub fn cumulative_m(&self) -> &[f64] {
        &self.cumulative_m
    }

    /// Along-route distance between two point indices.
    pub fn distance_between(&self, start: usize, end: usize) -> f64 {
        let last = self.points.len() - 1;
        let a = self.cumulative_m[start.min(last)];
        let b = self.cumulative_m[end.min(last)];
        (b - a).abs()
    }

    /// Position at `distance_m` along the route, linearly interpolated.
    pub fn point_at_distance(&self, distance_m: f64) -> Coordinate {
        let target = distance_m.clamp(0.0, self.length_m());
        let idx = self.cumulative_m.partition_point(|d| *d < target);
        if idx == 0 {
            return self.points[0];
        }
        if idx >= self.points.len() {
            return self.last();
        }
        let (a, b) = (&self.points[idx - 1], &self.points[idx]);
        let span = self.cumulative_m[idx] - self.cumulative_m[idx - 1];
        let t = if span > 0.0 {
            (target - self.cumulative_m[idx - 1]) / span
        } else {
            0.0
        };
        Coordinate::new(a.lat + (b.lat - a.lat) * t, a.lon + (b.lon - a.lon) * t)
    }

    pub fn has_elevation(&self) -> bool {
        self.points.iter().any(|p| p.elevation_m.is_some())
    }

    /// Copy of this geometry with elevations attached point by point.
    /// Non-finite samples are skipped; a length mismatch leaves the geometry
    /// untouched.
    pub fn with_elevations(&self, elevations: &[f64]) -> Self {
        if elevations.len() != self.points.len() {
            return self.clone();
        }
        let points = self
            .points
            .iter()
            .zip(elevations)
            .map(|(p, e)| if e.is_finite() { p.with_elevation(*e) } else { *p })
            .collect();
        Self {
            points,
            cumulative_m: self.cumulative_m.clone(),
        }
    }
}

fn cumulative_distances(points: &[Coordinate]) -> Vec<f64> {
    let mut out = Vec::with_capacity(points.len());
    let mut total = 0.0;
    out.push(0.0);
    for pair in points.windows(2) {
        total += spatial::distance_m(&pair[0], &pair[1]);
        out.push(total);
    }
    out
}

impl TryFrom<Vec<Coordinate>> for RouteGeometry {
    type Error = PlanError;

    fn try_from(points: Vec<Coordinate>) -> Result<Self, Self::Error> {
        RouteGeometry::new(points)
    }
}

impl From<RouteGeometry> for Vec<Coordinate> {
    fn from(geometry: RouteGeometry) -> Self {
        geometry.points
    }
}

/// Route returned by the routing engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRoute {
    pub geometry: RouteGeometry,
    pub distance_m: f64,
    pub duration_s: f64,
    /// Point indices where the engine reports a change of way.
    #[serde(default)]
    pub way_boundaries: Vec<usize>,
}

impl BaselineRoute {
    /// Fallback travel speed when the engine reports no usable duration.
    pub const DEFAULT_SPEED_MPS: f64 = 15.0;

    pub fn new(geometry: RouteGeometry, distance_m: f64, duration_s: f64) -> Self {
        Self {
            geometry,
            distance_m,
            duration_s,
            way_boundaries: Vec::new(),
        }
    }

    pub fn average_speed_mps(&self) -> f64 {
        if self.duration_s > 0.0 && self.distance_m > 0.0 {
            self.distance_m / self.duration_s
        } else {
            Self::DEFAULT_SPEED_MPS
        }
    }
}

/// Analysis slice over geometry edges `[start, end)`; its points are
/// `start..=end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn points<'a>(&self, geometry: &'a RouteGeometry) -> &'a [Coordinate] {
        &geometry.points()[self.start..=self.end]
    }

    pub fn length_m(&self, geometry: &RouteGeometry) -> f64 {
        geometry.distance_between(self.start, self.end)
    }

    pub fn midpoint(&self, geometry: &RouteGeometry) -> Coordinate {
        let start = geometry.cumulative_m()[self.start];
        geometry.point_at_distance(start + self.length_m(geometry) / 2.0)
    }

    pub fn to_ref(&self, geometry: &RouteGeometry) -> SegmentRef {
        SegmentRef {
            index: self.index,
            points: self.points(geometry).to_vec(),
            length_m: self.length_m(geometry),
        }
    }
}

/// Owned view of a segment handed to sources that score whole stretches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRef {
    pub index: usize,
    pub points: Vec<Coordinate>,
    pub length_m: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceClass {
    Paved,
    Gravel,
    Dirt,
    Sand,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessFlag {
    NoAccess,
    Private,
    NoMotorVehicle,
    Gate,
    Barrier,
    Seasonal,
    WinterClosure,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeasonalityHint {
    YearRound,
    Seasonal,
    SummerOnly,
    SpringFall,
    #[default]
    Unknown,
}

impl SeasonalityHint {
    pub fn is_restricted(&self) -> bool {
        matches!(
            self,
            SeasonalityHint::Seasonal | SeasonalityHint::SummerOnly | SeasonalityHint::SpringFall
        )
    }
}

/// OSM tags that drove the surface score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsmTagSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracktype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothness: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highway: Option<String>,
}

impl OsmTagSnapshot {
    pub fn is_empty(&self) -> bool {
        self.surface.is_none()
            && self.tracktype.is_none()
            && self.smoothness.is_none()
            && self.highway.is_none()
    }
}

/// Which signal categories contributed real data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCoverage {
    pub elevation: bool,
    pub osm: bool,
    pub imagery: bool,
    pub popularity: bool,
}

impl SourceCoverage {
    pub const CATEGORIES: usize = 4;

    pub fn count(&self) -> usize {
        [self.elevation, self.osm, self.imagery, self.popularity]
            .iter()
            .filter(|c| **c)
            .count()
    }

    pub fn fraction(&self) -> f64 {
        self.count() as f64 / Self::CATEGORIES as f64
    }
}

/// Per-segment analysis output. Composite scores are always populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentFeature {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub length_m: f64,

    /// Turning density normalised to [0, 1]
    pub curvature: f64,
    pub turning_deg_per_km: f64,

    /// Signed rise over run between the first and last elevation samples
    pub grade: f64,
    pub max_grade_abs: f64,
    pub pct_over_8_pct: f64,
    pub pct_over_12_pct: f64,
    pub pct_over_16_pct: f64,
    pub elevation_std_m: f64,
    pub ascent_m: f64,
    pub descent_m: f64,

    pub surface_class: SurfaceClass,
    pub osm_tags: OsmTagSnapshot,
    pub environment: Vec<EnvironmentTag>,
    pub access_flags: Vec<AccessFlag>,
    pub seasonality: SeasonalityHint,

    pub surface_score: f64,
    pub environment_score: f64,
    pub poi_proximity: f64,
    pub imagery_confidence: f64,
    pub popularity: f64,

    pub dirt: f64,
    pub scenic: f64,
    pub risk: f64,
    pub confidence: f64,
    pub coverage: SourceCoverage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfacePreference {
    Paved,
    #[default]
    Mixed,
    Gravel,
    Dirt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechnicalDifficulty {
    Easy,
    #[default]
    Moderate,
    Difficult,
}

/// Rider preferences for one planning request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningPreferences {
    pub surface: SurfacePreference,
    pub technical_difficulty: TechnicalDifficulty,
    pub avoid_highways: bool,
    pub avoid_tolls: bool,
    /// Explicit preset name; wins over the surface / difficulty mapping
    pub preset: Option<String>,
    pub max_detours: Option<usize>,
    pub detour_radius_m: Option<f64>,
    /// Desired total trip distance; the gap to the baseline is the detour budget
    pub trip_distance_km: Option<f64>,
    pub trip_duration_h: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(points: &[(f64, f64)]) -> Vec<Coordinate> {
        points.iter().map(|(lat, lon)| Coordinate::new(*lat, *lon)).collect()
    }

    #[test]
    fn geometry_collapses_consecutive_duplicates() {
        let geometry =
            RouteGeometry::new(line(&[(45.0, 6.0), (45.0, 6.0), (45.01, 6.0), (45.01, 6.0)]))
                .unwrap();
        assert_eq!(geometry.len(), 2);
        assert!(geometry.length_m() > 1_000.0);
    }

    #[test]
    fn geometry_rejects_single_distinct_point() {
        let err = RouteGeometry::new(line(&[(45.0, 6.0), (45.0, 6.0)])).unwrap_err();
        assert_eq!(err, PlanError::InsufficientWaypoints(1));
    }

    #[test]
    fn geometry_rejects_out_of_range_coordinate() {
        let err = RouteGeometry::new(line(&[(45.0, 6.0), (95.0, 6.0)])).unwrap_err();
        assert!(matches!(err, PlanError::InvalidCoordinate { index: 1, .. }));
    }

    #[test]
    fn breaks_follow_collapsed_indices() {
        let (geometry, breaks) = RouteGeometry::with_breaks(
            line(&[(45.0, 6.0), (45.0, 6.0), (45.01, 6.0), (45.02, 6.0), (45.03, 6.0)]),
            &[3],
        )
        .unwrap();
        assert_eq!(geometry.len(), 4);
        assert_eq!(breaks, vec![2]);
    }

    #[test]
    fn elevations_attach_only_where_finite() {
        let geometry =
            RouteGeometry::new(line(&[(45.0, 6.0), (45.01, 6.0), (45.02, 6.0)])).unwrap();
        assert!(!geometry.has_elevation());

        let with = geometry.with_elevations(&[410.0, f64::NAN, 430.0]);
        assert!(with.has_elevation());
        assert_eq!(with.points()[0].elevation_m, Some(410.0));
        assert_eq!(with.points()[1].elevation_m, None);
        assert_eq!(with.length_m(), geometry.length_m());

        assert_eq!(geometry.with_elevations(&[1.0]), geometry);
    }

    #[test]
    fn point_at_distance_interpolates() {
        let geometry = RouteGeometry::new(line(&[(45.0, 6.0), (45.02, 6.0)])).unwrap();
        let mid = geometry.point_at_distance(geometry.length_m() / 2.0);
        assert!((mid.lat - 45.01).abs() < 1e-6);
    }

    #[test]
    fn geometry_roundtrips_through_json_as_point_list() {
        let geometry = RouteGeometry::new(line(&[(45.0, 6.0), (45.01, 6.0)])).unwrap();
        let json = serde_json::to_value(&geometry).unwrap();
        assert!(json.is_array());
        let back: RouteGeometry = serde_json::from_value(json).unwrap();
        assert_eq!(back, geometry);
    }

    #[test]
    fn preferences_default_from_empty_object() {
        let prefs: PlanningPreferences = serde_json::from_str("{}").unwrap();
        assert_eq!(prefs, PlanningPreferences::default());
        assert_eq!(prefs.surface, SurfacePreference::Mixed);
    }
}
