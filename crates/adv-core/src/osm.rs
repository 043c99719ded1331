//! OSM records as returned by feature sources, plus the deterministic tag
//! vocabularies used for surface, environment and access scoring.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{AccessFlag, Coordinate, RouteGeometry, SeasonalityHint, SurfaceClass};
use crate::spatial::{self, BoundingBox};

/// Score used for tag values outside the vocabulary and for missing tags.
pub const NEUTRAL_SCORE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Node,
    Way,
}

/// A tagged node or way from the feature source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub id: i64,
    pub kind: FeatureKind,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Node position, or the way's full geometry
    #[serde(default)]
    pub geometry: Vec<Coordinate>,
}

impl FeatureRecord {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn name(&self) -> Option<&str> {
        self.tag("name")
    }

    pub fn is_closed(&self) -> bool {
        self.geometry.len() > 3
            && self
                .geometry
                .first()
                .zip(self.geometry.last())
                .is_some_and(|(a, b)| a.same_position(b))
    }

    /// Ways that carry travel surface information.
    pub fn is_road_like(&self) -> bool {
        self.kind == FeatureKind::Way
            && self.geometry.len() >= 2
            && ["highway", "surface", "tracktype"]
                .iter()
                .any(|k| self.tags.contains_key(*k))
    }

    pub fn length_m(&self) -> f64 {
        spatial::path_length_m(&self.geometry)
    }

    /// Distance from `point` to this record; zero inside closed areas.
    pub fn distance_to(&self, point: &Coordinate) -> f64 {
        match self.kind {
            FeatureKind::Node => self
                .geometry
                .first()
                .map(|p| spatial::distance_m(point, p))
                .unwrap_or(f64::INFINITY),
            FeatureKind::Way => {
                if self.is_closed() && spatial::point_in_polygon(point, &self.geometry) {
                    0.0
                } else {
                    spatial::distance_to_polyline_m(point, &self.geometry)
                }
            }
        }
    }
}

/// `key` present, optionally restricted to a value set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFilter {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

impl TagFilter {
    pub fn any(key: &str) -> Self {
        Self {
            key: key.to_string(),
            values: Vec::new(),
        }
    }

    pub fn one_of(key: &str, values: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryArea {
    BoundingBox(BoundingBox),
    Around { center: Coordinate, radius_m: f64 },
}

/// One group of filters; all filters in a group must match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSelector {
    pub kind: FeatureKind,
    pub filters: Vec<TagFilter>,
}

/// Request for tagged records inside an area. Records matching any
/// selector are returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureQuery {
    pub area: QueryArea,
    pub selectors: Vec<TagSelector>,
}

impl FeatureQuery {
    /// Roads, land cover and points of interest along a route corridor.
    pub fn corridor(bbox: BoundingBox) -> Self {
        let way = |filters| TagSelector {
            kind: FeatureKind::Way,
            filters,
        };
        let node = |filters| TagSelector {
            kind: FeatureKind::Node,
            filters,
        };
        Self {
            area: QueryArea::BoundingBox(bbox),
            selectors: vec![
                way(vec![TagFilter::any("highway")]),
                way(vec![TagFilter::one_of(
                    "landuse",
                    &[
                        "forest", "meadow", "farmland", "grass", "orchard", "vineyard",
                        "residential", "commercial", "retail", "industrial", "quarry",
                        "landfill", "reservoir",
                    ],
                )]),
                way(vec![TagFilter::one_of(
                    "natural",
                    &[
                        "wood", "water", "wetland", "beach", "coastline", "ridge", "arete",
                        "cliff", "grassland", "heath", "scrub",
                    ],
                )]),
                way(vec![TagFilter::any("waterway")]),
                way(vec![TagFilter::one_of("leisure", &["park", "nature_reserve"])]),
                node(vec![TagFilter::one_of(
                    "tourism",
                    &["viewpoint", "attraction"],
                )]),
                node(vec![TagFilter::one_of("natural", &["peak", "saddle"])]),
            ],
        }
    }

    /// Off-pavement ways and viewpoints around a detour anchor.
    pub fn detour_discovery(center: Coordinate, radius_m: f64) -> Self {
        Self {
            area: QueryArea::Around { center, radius_m },
            selectors: vec![
                TagSelector {
                    kind: FeatureKind::Way,
                    filters: vec![
                        TagFilter::one_of("highway", &["track", "path", "unclassified", "tertiary"]),
                        TagFilter::one_of(
                            "surface",
                            &["gravel", "dirt", "compacted", "ground", "unpaved", "fine_gravel"],
                        ),
                    ],
                },
                TagSelector {
                    kind: FeatureKind::Way,
                    filters: vec![
                        TagFilter::one_of("highway", &["track"]),
                        TagFilter::one_of(
                            "tracktype",
                            &["grade1", "grade2", "grade3", "grade4", "grade5"],
                        ),
                    ],
                },
                TagSelector {
                    kind: FeatureKind::Node,
                    filters: vec![TagFilter::one_of("tourism", &["viewpoint"])],
                },
            ],
        }
    }
}

/// Tiles shorter than this are not worth a request of their own.
pub const MIN_CORRIDOR_TILE_M: f64 = 1_000.0;

/// Padded boxes over consecutive stretches of about `tile_length_m` along the
/// route. Total query area grows with route length instead of with the area
/// of the whole route's bounding box. A non-positive length gives one tile.
pub fn corridor_tiles(geometry: &RouteGeometry, padding_m: f64, tile_length_m: f64) -> Vec<BoundingBox> {
    let points = geometry.points();
    let cumulative = geometry.cumulative_m();
    let last = points.len() - 1;
    let tile_length_m = if tile_length_m.is_finite() && tile_length_m > 0.0 {
        tile_length_m.max(MIN_CORRIDOR_TILE_M)
    } else {
        f64::INFINITY
    };

    let mut tiles = Vec::new();
    let mut start = 0;
    while start < last {
        let limit = cumulative[start] + tile_length_m;
        let mut end = start + 1;
        while end < last && cumulative[end + 1] <= limit {
            end += 1;
        }
        if let Some(bbox) = BoundingBox::from_points(&points[start..=end]) {
            tiles.push(bbox.expand_by_meters(padding_m));
        }
        start = end;
    }
    tiles
}

/// Dirt likelihood of a `surface` value.
pub fn surface_dirt_likelihood(value: &str) -> f64 {
    match value {
        "asphalt" | "paved" | "concrete" | "concrete:plates" | "concrete:lanes" => 0.0,
        "paving_stones" => 0.05,
        "cobblestone" | "sett" | "unhewn_cobblestone" => 0.1,
        "gravel" => 0.95,
        "fine_gravel" => 0.9,
        "compacted" => 0.85,
        "pebblestone" => 0.85,
        "unpaved" => 0.9,
        "grass" => 0.9,
        "ground" => 0.95,
        "dirt" | "earth" | "mud" | "sand" => 1.0,
        _ => NEUTRAL_SCORE,
    }
}

pub fn tracktype_dirt_likelihood(value: &str) -> f64 {
    match value {
        "grade1" => 0.3,
        "grade2" => 0.6,
        "grade3" => 0.8,
        "grade4" => 0.9,
        "grade5" => 1.0,
        _ => NEUTRAL_SCORE,
    }
}

pub fn highway_dirt_likelihood(value: &str) -> f64 {
    match value {
        "motorway" | "motorway_link" | "trunk" | "trunk_link" | "primary" | "primary_link" => 0.0,
        "secondary" | "secondary_link" => 0.05,
        "residential" | "living_street" => 0.1,
        "tertiary" | "tertiary_link" => 0.15,
        "service" => 0.35,
        "unclassified" => 0.4,
        "path" => 0.8,
        "track" => 0.85,
        _ => NEUTRAL_SCORE,
    }
}

/// Relative influence of each tag in the combined dirt likelihood.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TagWeights {
    pub surface: f64,
    pub tracktype: f64,
    pub highway: f64,
}

impl Default for TagWeights {
    fn default() -> Self {
        Self {
            surface: 0.6,
            tracktype: 0.25,
            highway: 0.15,
        }
    }
}

/// Weighted mean over the vocabulary tags that are present.
///
/// Returns `None` when none of `surface`, `tracktype` or `highway` is set.
pub fn dirt_likelihood(tags: &BTreeMap<String, String>, weights: &TagWeights) -> Option<f64> {
    type Lookup = fn(&str) -> f64;
    let parts: [(Option<&String>, f64, Lookup); 3] = [
        (tags.get("surface"), weights.surface, surface_dirt_likelihood),
        (tags.get("tracktype"), weights.tracktype, tracktype_dirt_likelihood),
        (tags.get("highway"), weights.highway, highway_dirt_likelihood),
    ];
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for (value, weight, lookup) in parts {
        if let Some(value) = value {
            total += lookup(&value.to_ascii_lowercase()) * weight;
            weight_sum += weight;
        }
    }
    (weight_sum > 0.0).then(|| (total / weight_sum).clamp(0.0, 1.0))
}

pub fn surface_class(tags: &BTreeMap<String, String>) -> SurfaceClass {
    if let Some(surface) = tags.get("surface") {
        match surface.to_ascii_lowercase().as_str() {
            "asphalt" | "paved" | "concrete" | "concrete:plates" | "concrete:lanes"
            | "paving_stones" | "cobblestone" | "sett" | "unhewn_cobblestone" => {
                return SurfaceClass::Paved
            }
            "gravel" | "fine_gravel" | "compacted" | "pebblestone" | "unpaved" => {
                return SurfaceClass::Gravel
            }
            "dirt" | "earth" | "ground" | "mud" | "grass" => return SurfaceClass::Dirt,
            "sand" => return SurfaceClass::Sand,
            _ => {}
        }
    }
    if let Some(tracktype) = tags.get("tracktype") {
        match tracktype.as_str() {
            "grade1" => return SurfaceClass::Paved,
            "grade2" | "grade3" => return SurfaceClass::Gravel,
            "grade4" | "grade5" => return SurfaceClass::Dirt,
            _ => {}
        }
    }
    match tags.get("highway").map(String::as_str) {
        Some(
            "motorway" | "motorway_link" | "trunk" | "trunk_link" | "primary" | "primary_link"
            | "secondary" | "secondary_link" | "tertiary" | "tertiary_link" | "residential"
            | "living_street",
        ) => SurfaceClass::Paved,
        Some("track") => SurfaceClass::Dirt,
        _ => SurfaceClass::Unknown,
    }
}

/// Difficulty of riding a way in [0, 1], from tracktype, smoothness and name hints.
pub fn technical_difficulty(tags: &BTreeMap<String, String>) -> f64 {
    let tracktype = match tags.get("tracktype").map(String::as_str) {
        Some("grade3") => 0.5,
        Some("grade4") => 0.75,
        Some("grade5") => 1.0,
        _ => 0.0,
    };
    let smoothness = match tags.get("smoothness").map(String::as_str) {
        Some("bad") => 0.4,
        Some("very_bad") => 0.6,
        Some("horrible") => 0.8,
        Some("very_horrible") => 0.9,
        Some("impassable") => 1.0,
        _ => 0.0,
    };
    let hint = if has_name_hint(tags, TECHNICAL_HINTS) {
        0.2
    } else {
        0.0
    };
    (f64::max(tracktype, smoothness) + hint).min(1.0)
}

pub const TECHNICAL_HINTS: &[&str] = &["technical", "difficult", "expert"];
pub const SCENIC_HINTS: &[&str] = &["scenic", "view", "loop", "circuit", "ridge", "mountain", "forest"];

pub fn has_name_hint(tags: &BTreeMap<String, String>, hints: &[&str]) -> bool {
    tags.get("name")
        .map(|name| name.to_lowercase())
        .is_some_and(|name| hints.iter().any(|hint| name.contains(hint)))
}

/// Land cover categories that shape the scenic score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentTag {
    Forest,
    Ridge,
    Water,
    Park,
    Meadow,
    Urban,
    Industrial,
}

impl EnvironmentTag {
    /// Contribution to the environment score around the neutral midpoint.
    pub fn delta(&self) -> f64 {
        match self {
            EnvironmentTag::Forest => 0.2,
            EnvironmentTag::Ridge => 0.25,
            EnvironmentTag::Water => 0.2,
            EnvironmentTag::Park => 0.1,
            EnvironmentTag::Meadow => 0.1,
            EnvironmentTag::Urban => -0.25,
            EnvironmentTag::Industrial => -0.35,
        }
    }

    pub fn classify(tags: &BTreeMap<String, String>) -> Option<Self> {
        let get = |k: &str| tags.get(k).map(String::as_str);
        if let Some(landuse) = get("landuse") {
            match landuse {
                "forest" => return Some(Self::Forest),
                "meadow" | "farmland" | "grass" | "orchard" | "vineyard" => {
                    return Some(Self::Meadow)
                }
                "residential" | "commercial" | "retail" => return Some(Self::Urban),
                "industrial" | "quarry" | "landfill" => return Some(Self::Industrial),
                "reservoir" => return Some(Self::Water),
                _ => {}
            }
        }
        if let Some(natural) = get("natural") {
            match natural {
                "wood" => return Some(Self::Forest),
                "water" | "wetland" | "beach" | "coastline" => return Some(Self::Water),
                "ridge" | "arete" | "cliff" | "peak" | "saddle" => return Some(Self::Ridge),
                "grassland" | "heath" | "scrub" => return Some(Self::Meadow),
                _ => {}
            }
        }
        if get("waterway").is_some() {
            return Some(Self::Water);
        }
        match get("leisure") {
            Some("park" | "nature_reserve") => Some(Self::Park),
            _ => None,
        }
    }
}

/// Sum of deltas over distinct tags, from the neutral midpoint, clipped.
pub fn environment_score(tags: &[EnvironmentTag]) -> f64 {
    let mut distinct = tags.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    (NEUTRAL_SCORE + distinct.iter().map(EnvironmentTag::delta).sum::<f64>()).clamp(0.0, 1.0)
}

/// Nodes that make a worthwhile stop.
pub fn is_point_of_interest(record: &FeatureRecord) -> bool {
    record.kind == FeatureKind::Node
        && (matches!(record.tag("tourism"), Some("viewpoint" | "attraction"))
            || matches!(record.tag("natural"), Some("peak" | "saddle")))
}

pub fn access_flags(tags: &BTreeMap<String, String>) -> Vec<AccessFlag> {
    let get = |k: &str| tags.get(k).map(|v| v.to_lowercase()).unwrap_or_default();
    let access = get("access");
    let barrier = get("barrier");
    let mut flags = Vec::new();

    if access == "no" {
        flags.push(AccessFlag::NoAccess);
    }
    if access == "private" {
        flags.push(AccessFlag::Private);
    }
    if get("motor_vehicle") == "no" {
        flags.push(AccessFlag::NoMotorVehicle);
    }
    if tags.contains_key("gate") || barrier == "gate" {
        flags.push(AccessFlag::Gate);
    }
    if matches!(barrier.as_str(), "bollard" | "fence" | "wall") {
        flags.push(AccessFlag::Barrier);
    }
    if access.contains("seasonal") {
        flags.push(AccessFlag::Seasonal);
    }
    if get("note").contains("winter") {
        flags.push(AccessFlag::WinterClosure);
    }
    flags
}

pub fn seasonality(tags: &BTreeMap<String, String>) -> SeasonalityHint {
    let get = |k: &str| tags.get(k).map(|v| v.to_lowercase()).unwrap_or_default();
    let access = get("access");
    if access.contains("seasonal") {
        return SeasonalityHint::Seasonal;
    }
    if access.contains("winter") || get("winter_service") == "no" {
        return SeasonalityHint::SummerOnly;
    }
    let note = get("note");
    if ["winter", "snow", "closed"].iter().any(|w| note.contains(w)) {
        return SeasonalityHint::SummerOnly;
    }
    if ["spring", "fall", "autumn"].iter().any(|w| note.contains(w)) {
        return SeasonalityHint::SpringFall;
    }
    SeasonalityHint::YearRound
}

/// Whether a motorcycle may legally use the way.
pub fn allows_motorcycles(tags: &BTreeMap<String, String>) -> bool {
    let denied = |k: &str| matches!(tags.get(k).map(String::as_str), Some("no" | "private"));
    let foot_only = matches!(
        tags.get("highway").map(String::as_str),
        Some("footway" | "cycleway" | "steps" | "pedestrian" | "bridleway")
    );
    !foot_only && !denied("access") && !denied("motor_vehicle") && !denied("motorcycle")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_routes_split_into_corridor_tiles() {
        // ~75 km eastbound
        let geometry = RouteGeometry::new(
            (0..100)
                .map(|i| Coordinate::new(47.0, 8.0 + i as f64 * 0.01))
                .collect(),
        )
        .unwrap();
        let tiles = corridor_tiles(&geometry, 300.0, 25_000.0);
        assert!(tiles.len() >= 3, "got {} tiles", tiles.len());
        for pair in tiles.windows(2) {
            // consecutive tiles share their boundary vertex
            assert!(pair[0].max_lon >= pair[1].min_lon);
        }
        assert!(tiles[0].min_lon < 8.0);
        assert!(tiles[tiles.len() - 1].max_lon > 8.99);
        for point in geometry.points() {
            assert!(tiles.iter().any(|t| {
                (t.min_lat..=t.max_lat).contains(&point.lat)
                    && (t.min_lon..=t.max_lon).contains(&point.lon)
            }));
        }

        assert_eq!(corridor_tiles(&geometry, 300.0, 0.0).len(), 1);
        let short = RouteGeometry::new(vec![
            Coordinate::new(47.0, 8.0),
            Coordinate::new(47.0, 8.01),
        ])
        .unwrap();
        assert_eq!(corridor_tiles(&short, 300.0, 25_000.0).len(), 1);
    }

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn lone_gravel_tag_scores_table_value() {
        let score = dirt_likelihood(&tags(&[("surface", "gravel")]), &TagWeights::default());
        assert!((score.unwrap() - 0.95).abs() < 1e-9);
    }

    #[test]
    fn asphalt_is_not_dirt() {
        let score = dirt_likelihood(&tags(&[("surface", "asphalt")]), &TagWeights::default());
        assert_eq!(score, Some(0.0));
    }

    #[test]
    fn unknown_values_are_neutral() {
        let score = dirt_likelihood(&tags(&[("surface", "moon_dust")]), &TagWeights::default());
        assert!((score.unwrap() - NEUTRAL_SCORE).abs() < 1e-9);
        assert_eq!(dirt_likelihood(&tags(&[("name", "x")]), &TagWeights::default()), None);
    }

    #[test]
    fn mixed_tags_use_weighted_mean() {
        let score = dirt_likelihood(
            &tags(&[("surface", "gravel"), ("highway", "track")]),
            &TagWeights::default(),
        )
        .unwrap();
        let expected = (0.95 * 0.6 + 0.85 * 0.15) / 0.75;
        assert!((score - expected).abs() < 1e-12);
    }

    #[test]
    fn environment_score_clips_and_dedups() {
        let score = environment_score(&[
            EnvironmentTag::Forest,
            EnvironmentTag::Forest,
            EnvironmentTag::Ridge,
            EnvironmentTag::Water,
        ]);
        assert_eq!(score, 1.0);
        let score = environment_score(&[EnvironmentTag::Industrial, EnvironmentTag::Urban]);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn access_and_seasonality_from_tags() {
        let t = tags(&[("access", "seasonal"), ("barrier", "gate")]);
        assert_eq!(access_flags(&t), vec![AccessFlag::Gate, AccessFlag::Seasonal]);
        assert_eq!(seasonality(&t), SeasonalityHint::Seasonal);
        assert_eq!(
            seasonality(&tags(&[("note", "Closed in snow")])),
            SeasonalityHint::SummerOnly
        );
    }

    #[test]
    fn motorcycle_access_rules() {
        assert!(allows_motorcycles(&tags(&[("highway", "track")])));
        assert!(!allows_motorcycles(&tags(&[("highway", "track"), ("motorcycle", "no")])));
        assert!(!allows_motorcycles(&tags(&[("highway", "footway")])));
    }
}
