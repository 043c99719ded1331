//! Planning output and diagnostics.

use adv_core::{
    BaselineRoute, Coordinate, DetourCandidate, DetourPhase, FeatureSummary, RejectReason,
    RouteGeometry, RoutingModel, SegmentFeature,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Fan-out slots, in the fixed order they are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Routing,
    Elevation,
    Features,
    Imagery,
    Popularity,
    Discovery,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Routing => "routing",
            SourceKind::Elevation => "elevation",
            SourceKind::Features => "features",
            SourceKind::Imagery => "imagery",
            SourceKind::Popularity => "popularity",
            SourceKind::Discovery => "discovery",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    /// Some of several requests failed
    Partial,
    Failed,
    TimedOut,
    Unconfigured,
    Skipped,
}

impl SourceStatus {
    pub fn contributed(&self) -> bool {
        matches!(self, SourceStatus::Ok | SourceStatus::Partial)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub source: SourceKind,
    pub status: SourceStatus,
    pub elapsed_ms: u64,
    pub requests: usize,
    pub succeeded: usize,
    pub cache_hits: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SourceReport {
    pub fn new(source: SourceKind, status: SourceStatus) -> Self {
        Self {
            source,
            status,
            elapsed_ms: 0,
            requests: 0,
            succeeded: 0,
            cache_hits: 0,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetourDiagnostics {
    pub phase: DetourPhase,
    pub anchors: usize,
    pub failed_anchors: usize,
    pub candidates: usize,
    pub rejected: Vec<(String, RejectReason)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub sources: Vec<SourceReport>,
    pub contributing_sources: Vec<SourceKind>,
    pub cache_hits: usize,
    pub detours: DetourDiagnostics,
    /// Length-weighted mean of segment confidence
    pub confidence: f64,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl Diagnostics {
    pub fn report(&self, source: SourceKind) -> Option<&SourceReport> {
        self.sources.iter().find(|r| r.source == source)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSummary {
    pub distance_m: f64,
    pub duration_s: f64,
    pub baseline_distance_m: f64,
    pub baseline_duration_s: f64,
    pub extra_distance_m: f64,
    pub extra_duration_s: f64,
    pub detour_count: usize,
    #[serde(flatten)]
    pub features: FeatureSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningResult {
    /// Baseline with accepted detours spliced in
    pub geometry: RouteGeometry,
    pub baseline: BaselineRoute,
    pub segments: Vec<SegmentFeature>,
    pub detours: Vec<DetourCandidate>,
    pub model: RoutingModel,
    pub summary: RouteSummary,
    pub diagnostics: Diagnostics,
}

fn position(point: &Coordinate) -> Value {
    match point.elevation_m {
        Some(ele) => json!([point.lon, point.lat, ele]),
        None => json!([point.lon, point.lat]),
    }
}

fn line(points: &[Coordinate]) -> Value {
    json!({
        "type": "LineString",
        "coordinates": points.iter().map(position).collect::<Vec<_>>(),
    })
}

impl PlanningResult {
    /// GeoJSON `FeatureCollection`: the chosen route, the baseline, one
    /// feature per segment and one per accepted detour.
    pub fn to_geojson(&self) -> Value {
        let mut features = Vec::with_capacity(2 + self.segments.len() + self.detours.len());

        features.push(json!({
            "type": "Feature",
            "geometry": line(self.geometry.points()),
            "properties": {
                "kind": "route",
                "preset": self.model.preset,
                "distance_m": self.summary.distance_m,
                "duration_s": self.summary.duration_s,
                "detour_count": self.summary.detour_count,
                "confidence": self.diagnostics.confidence,
            },
        }));
        features.push(json!({
            "type": "Feature",
            "geometry": line(self.baseline.geometry.points()),
            "properties": {
                "kind": "baseline",
                "distance_m": self.baseline.distance_m,
                "duration_s": self.baseline.duration_s,
            },
        }));

        let baseline = self.baseline.geometry.points();
        for segment in &self.segments {
            let end = segment.end.min(baseline.len().saturating_sub(1));
            let start = segment.start.min(end);
            features.push(json!({
                "type": "Feature",
                "geometry": line(&baseline[start..=end]),
                "properties": {
                    "kind": "segment",
                    "index": segment.index,
                    "length_m": segment.length_m,
                    "surface": segment.surface_class,
                    "dirt": segment.dirt,
                    "scenic": segment.scenic,
                    "risk": segment.risk,
                    "confidence": segment.confidence,
                },
            }));
        }

        for detour in &self.detours {
            features.push(json!({
                "type": "Feature",
                "geometry": line(&detour.geometry),
                "properties": {
                    "kind": "detour",
                    "id": detour.id,
                    "detour_type": detour.detour_type,
                    "name": detour.name,
                    "extra_distance_m": detour.extra_distance_m,
                    "extra_duration_s": detour.extra_duration_s,
                    "efficiency": detour.efficiency,
                },
            }));
        }

        json!({
            "type": "FeatureCollection",
            "features": features,
        })
    }
}
