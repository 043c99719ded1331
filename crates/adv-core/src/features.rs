//! Segment feature extraction: cuts a route into analysis segments and fuses
//! elevation, OSM, imagery and popularity signals into per-segment scores.
//!
//! Extraction never fails. A missing signal substitutes its neutral default
//! and lowers the segment's confidence.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::{
    Coordinate, RouteGeometry, Segment, SegmentFeature, SourceCoverage, SurfaceClass,
    SeasonalityHint,
};
use crate::osm::{self, EnvironmentTag, FeatureRecord, NEUTRAL_SCORE};
use crate::signal::Signal;
use crate::spatial;
use crate::weights::{clip01, CompositeInputs, ScoringWeights};

pub const DEFAULT_SEGMENT_LENGTH_M: f64 = 500.0;

/// Everything the sources produced for one route.
///
/// `elevations` is aligned with the geometry points. `imagery` and
/// `popularity` are indexed by segment; short vectors mean the trailing
/// segments had no data.
#[derive(Debug, Clone, Default)]
pub struct RouteSignals {
    pub elevations: Signal<Vec<f64>>,
    pub osm: Signal<Vec<FeatureRecord>>,
    pub imagery: Vec<Signal<f64>>,
    pub popularity: Vec<Signal<f64>>,
}

impl RouteSignals {
    pub fn absent() -> Self {
        Self::default()
    }
}

/// Split a route into segments, cutting at geometry vertices whenever the
/// target length is reached or a way boundary is crossed.
pub fn segment_route(
    geometry: &RouteGeometry,
    target_length_m: f64,
    way_boundaries: &[usize],
) -> Vec<Segment> {
    let cumulative = geometry.cumulative_m();
    let last = geometry.len() - 1;
    let boundaries: BTreeSet<usize> = way_boundaries.iter().copied().collect();
    let target = if target_length_m > 0.0 {
        target_length_m
    } else {
        DEFAULT_SEGMENT_LENGTH_M
    };

    let mut segments = Vec::new();
    let mut start = 0;
    for idx in 1..last {
        let reached = cumulative[idx] - cumulative[start] >= target;
        if reached || boundaries.contains(&idx) {
            segments.push(Segment {
                index: segments.len(),
                start,
                end: idx,
            });
            start = idx;
        }
    }
    segments.push(Segment {
        index: segments.len(),
        start,
        end: last,
    });
    segments
}

/// Produce one feature per segment.
pub fn extract(
    geometry: &RouteGeometry,
    segments: &[Segment],
    signals: &RouteSignals,
    weights: &ScoringWeights,
) -> Vec<SegmentFeature> {
    let elevations = signals
        .elevations
        .real_value()
        .filter(|values| values.len() == geometry.len());
    let records = signals.osm.real_value().map(Vec::as_slice);

    segments
        .iter()
        .map(|segment| {
            let imagery = signals.imagery.get(segment.index).and_then(|s| s.real_value().copied());
            let popularity = signals
                .popularity
                .get(segment.index)
                .and_then(|s| s.real_value().copied());
            extract_segment(
                geometry, segment, elevations, records, imagery, popularity, weights,
            )
        })
        .collect()
}

fn extract_segment(
    geometry: &RouteGeometry,
    segment: &Segment,
    elevations: Option<&Vec<f64>>,
    records: Option<&[FeatureRecord]>,
    imagery: Option<f64>,
    popularity: Option<f64>,
    weights: &ScoringWeights,
) -> SegmentFeature {
    let points = segment.points(geometry);
    let length_m = segment.length_m(geometry);
    let turning_deg_per_km = turning_density(points, length_m);
    let curvature = weights.normalise_curvature(turning_deg_per_km);

    let elevation = elevations.and_then(|values| elevation_stats(geometry, segment, values));
    let osm_context = records.map(|records| {
        match_osm(records, &segment.midpoint(geometry), weights)
    });

    let coverage = SourceCoverage {
        elevation: elevation.is_some(),
        // an answer with nothing near this stretch is not coverage
        osm: osm_context.as_ref().is_some_and(OsmContext::matched),
        imagery: imagery.is_some(),
        popularity: popularity.is_some(),
    };
    let osm_context = osm_context.unwrap_or_default();
    let road_tags = osm_context.road.map(|r| &r.tags);
    let surface_score = road_tags
        .and_then(|tags| osm::dirt_likelihood(tags, &weights.tags))
        .unwrap_or(NEUTRAL_SCORE);
    let surface_class = road_tags.map(osm::surface_class).unwrap_or(SurfaceClass::Unknown);
    let access_flags = road_tags.map(osm::access_flags).unwrap_or_default();
    let seasonality = road_tags
        .map(osm::seasonality)
        .unwrap_or(SeasonalityHint::Unknown);
    let environment_score = if osm_context.environment.is_empty() {
        NEUTRAL_SCORE
    } else {
        osm::environment_score(&osm_context.environment)
    };
    let poi_proximity = osm_context
        .poi_distance_m
        .map(|d| clip01(1.0 - d / weights.poi_radius_m.max(1.0)))
        .unwrap_or(0.0);

    // Imagery sharpens or flattens the surface evidence around the midpoint.
    let surface_input = match imagery {
        Some(img) => clip01(NEUTRAL_SCORE + (surface_score - NEUTRAL_SCORE) * (0.5 + 0.5 * img)),
        None => surface_score,
    };

    let stats = elevation.unwrap_or_default();
    let scores = weights.composite(&CompositeInputs {
        surface: surface_input,
        grade: weights.normalise_grade(stats.grade),
        curvature,
        environment: environment_score,
        elevation_variance: weights.normalise_elevation_std(stats.std_m),
        poi: poi_proximity,
        access_flags: access_flags.len(),
        seasonal: seasonality.is_restricted(),
    });

    SegmentFeature {
        index: segment.index,
        start: segment.start,
        end: segment.end,
        length_m,
        curvature,
        turning_deg_per_km,
        grade: stats.grade,
        max_grade_abs: stats.max_grade_abs,
        pct_over_8_pct: stats.pct_over[0],
        pct_over_12_pct: stats.pct_over[1],
        pct_over_16_pct: stats.pct_over[2],
        elevation_std_m: stats.std_m,
        ascent_m: stats.ascent_m,
        descent_m: stats.descent_m,
        surface_class,
        osm_tags: osm_context.snapshot(),
        environment: osm_context.environment,
        access_flags,
        seasonality,
        surface_score,
        environment_score,
        poi_proximity,
        imagery_confidence: imagery.unwrap_or(0.0),
        popularity: popularity.unwrap_or(0.0),
        dirt: scores.dirt,
        scenic: scores.scenic,
        risk: scores.risk,
        confidence: coverage.fraction(),
        coverage,
    }
}

/// Sum of absolute heading changes (degrees) per kilometer.
pub fn turning_density(points: &[Coordinate], length_m: f64) -> f64 {
    if points.len() < 3 || length_m < 1.0 {
        return 0.0;
    }
    let total_deg: f64 = points
        .windows(3)
        .map(|w| spatial::turning_angle_deg(&w[0], &w[1], &w[2]))
        .sum();
    total_deg / (length_m / 1000.0)
}

const GRADE_THRESHOLDS: [f64; 3] = [0.08, 0.12, 0.16];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ElevationStats {
    grade: f64,
    max_grade_abs: f64,
    /// Percent of sampled length steeper than 8 / 12 / 16 %
    pct_over: [f64; 3],
    std_m: f64,
    ascent_m: f64,
    descent_m: f64,
}

fn elevation_stats(
    geometry: &RouteGeometry,
    segment: &Segment,
    elevations: &[f64],
) -> Option<ElevationStats> {
    let cumulative = geometry.cumulative_m();
    let samples: Vec<(f64, f64)> = (segment.start..=segment.end)
        .filter_map(|i| {
            let e = *elevations.get(i)?;
            e.is_finite().then_some((cumulative[i], e))
        })
        .collect();
    if samples.len() < 2 {
        return None;
    }

    let (first, last) = (samples[0], samples[samples.len() - 1]);
    let run = last.0 - first.0;
    let grade = if run > 0.0 { (last.1 - first.1) / run } else { 0.0 };

    let mut stats = ElevationStats {
        grade,
        ..Default::default()
    };
    let mut sampled_length = 0.0;
    let mut over = [0.0; 3];
    for pair in samples.windows(2) {
        let dd = pair[1].0 - pair[0].0;
        let dz = pair[1].1 - pair[0].1;
        if dz > 0.0 {
            stats.ascent_m += dz;
        } else {
            stats.descent_m -= dz;
        }
        if dd < 1.0 {
            continue;
        }
        let g = (dz / dd).abs();
        stats.max_grade_abs = stats.max_grade_abs.max(g);
        sampled_length += dd;
        for (slot, threshold) in over.iter_mut().zip(GRADE_THRESHOLDS) {
            if g > threshold {
                *slot += dd;
            }
        }
    }
    if sampled_length > 0.0 {
        for (pct, length) in stats.pct_over.iter_mut().zip(over) {
            *pct = length / sampled_length * 100.0;
        }
    }

    let n = samples.len() as f64;
    let mean = samples.iter().map(|s| s.1).sum::<f64>() / n;
    let variance = samples.iter().map(|s| (s.1 - mean).powi(2)).sum::<f64>() / n;
    stats.std_m = variance.sqrt();
    Some(stats)
}

#[derive(Debug, Default)]
struct OsmContext<'a> {
    road: Option<&'a FeatureRecord>,
    environment: Vec<EnvironmentTag>,
    poi_distance_m: Option<f64>,
}

impl OsmContext<'_> {
    fn matched(&self) -> bool {
        self.road.is_some() || !self.environment.is_empty() || self.poi_distance_m.is_some()
    }

    fn snapshot(&self) -> crate::models::OsmTagSnapshot {
        let get = |key: &str| self.road.and_then(|r| r.tag(key)).map(str::to_string);
        crate::models::OsmTagSnapshot {
            surface: get("surface"),
            tracktype: get("tracktype"),
            smoothness: get("smoothness"),
            highway: get("highway"),
        }
    }
}

fn match_osm<'a>(
    records: &'a [FeatureRecord],
    midpoint: &Coordinate,
    weights: &ScoringWeights,
) -> OsmContext<'a> {
    let mut road: Option<(&FeatureRecord, f64)> = None;
    let mut environment = Vec::new();
    let mut poi_distance_m: Option<f64> = None;

    for record in records {
        if record.is_road_like() {
            let d = record.distance_to(midpoint);
            if d <= weights.way_match_radius_m {
                let better = match road {
                    None => true,
                    Some((best, best_d)) => d < best_d || (d == best_d && record.id < best.id),
                };
                if better {
                    road = Some((record, d));
                }
            }
            continue;
        }
        if osm::is_point_of_interest(record) {
            let d = record.distance_to(midpoint);
            if d <= weights.poi_radius_m {
                poi_distance_m = Some(poi_distance_m.map_or(d, |best| best.min(d)));
            }
        }
        if let Some(tag) = EnvironmentTag::classify(&record.tags) {
            if record.distance_to(midpoint) <= weights.environment_radius_m {
                environment.push(tag);
            }
        }
    }

    environment.sort_unstable();
    environment.dedup();
    OsmContext {
        road: road.map(|(r, _)| r),
        environment,
        poi_distance_m,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteFlag {
    ChallengingGrades,
    ConfirmedDirt,
    PopularWithRiders,
    UnchartedTerritory,
    AccessCheckNeeded,
}

/// Route-level roll-up of segment features, length weighted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub segment_count: usize,
    pub mean_dirt: f64,
    pub mean_scenic: f64,
    pub mean_risk: f64,
    pub mean_confidence: f64,
    /// Share of length on gravel, dirt or sand
    pub off_pavement_share: f64,
    pub ascent_m: f64,
    pub descent_m: f64,
    pub flags: Vec<RouteFlag>,
}

pub fn summarize(features: &[SegmentFeature]) -> FeatureSummary {
    let total_length: f64 = features.iter().map(|f| f.length_m).sum();
    if features.is_empty() || total_length <= 0.0 {
        return FeatureSummary {
            segment_count: features.len(),
            ..Default::default()
        };
    }
    let weighted = |value: fn(&SegmentFeature) -> f64| {
        features.iter().map(|f| value(f) * f.length_m).sum::<f64>() / total_length
    };
    let off_pavement: f64 = features
        .iter()
        .filter(|f| {
            matches!(
                f.surface_class,
                SurfaceClass::Gravel | SurfaceClass::Dirt | SurfaceClass::Sand
            )
        })
        .map(|f| f.length_m)
        .sum();

    let mut flags = Vec::new();
    if features.iter().any(|f| f.max_grade_abs > GRADE_THRESHOLDS[2]) {
        flags.push(RouteFlag::ChallengingGrades);
    }
    if features.iter().any(|f| {
        f.coverage.imagery
            && f.imagery_confidence >= 0.7
            && !matches!(f.surface_class, SurfaceClass::Paved | SurfaceClass::Unknown)
    }) {
        flags.push(RouteFlag::ConfirmedDirt);
    }
    let popular: Vec<f64> = features
        .iter()
        .filter(|f| f.coverage.popularity)
        .map(|f| f.popularity)
        .collect();
    if !popular.is_empty() {
        let mean = popular.iter().sum::<f64>() / popular.len() as f64;
        if mean >= 0.5 {
            flags.push(RouteFlag::PopularWithRiders);
        } else if popular.iter().all(|p| *p == 0.0) {
            flags.push(RouteFlag::UnchartedTerritory);
        }
    }
    if features.iter().any(|f| !f.access_flags.is_empty()) {
        flags.push(RouteFlag::AccessCheckNeeded);
    }

    FeatureSummary {
        segment_count: features.len(),
        mean_dirt: weighted(|f| f.dirt),
        mean_scenic: weighted(|f| f.scenic),
        mean_risk: weighted(|f| f.risk),
        mean_confidence: weighted(|f| f.confidence),
        off_pavement_share: off_pavement / total_length,
        ascent_m: features.iter().map(|f| f.ascent_m).sum(),
        descent_m: features.iter().map(|f| f.descent_m).sum(),
        flags,
    }
}
