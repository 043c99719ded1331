//! Detour scoring, constrained selection and splicing.
//!
//! Discovery (the part that talks to a feature source) lives in the planner;
//! everything here is deterministic given the discovered records.

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::models::{BaselineRoute, Coordinate, PlanningPreferences, RouteGeometry, SegmentFeature};
use crate::osm::{self, FeatureKind, FeatureRecord, TagWeights, NEUTRAL_SCORE};
use crate::routing_model::PreferenceWeights;
use crate::spatial;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetourType {
    DirtSegment,
    ScenicLoop,
    PointOfInterest,
    TechnicalChallenge,
}

/// Where the optimizer ended up for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetourPhase {
    #[default]
    Discover,
    Score,
    Select,
    Splice,
    Done,
    /// Terminal; some anchors failed discovery and contributed nothing
    Degraded,
}

/// Sampled point on the baseline from which detours are searched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Position in sampling order
    pub order: usize,
    pub point_index: usize,
    pub coordinate: Coordinate,
    pub distance_along_m: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetourConstraints {
    pub max_count: usize,
    /// Search radius around each anchor
    pub max_radius_m: f64,
    /// Minimum distance between accepted anchors
    pub min_spacing_m: f64,
    /// Total extra distance budget over all accepted detours
    pub max_extra_distance_m: f64,
    pub max_extra_duration_s: f64,
    pub anchor_spacing_m: f64,
    /// Gain per extra km below which candidates are dropped
    pub min_efficiency: f64,
    pub min_way_length_m: f64,
    pub max_way_length_m: f64,
    /// Assumed speed on detour geometry
    pub off_road_speed_mps: f64,
}

impl Default for DetourConstraints {
    fn default() -> Self {
        Self {
            max_count: 3,
            max_radius_m: 5_000.0,
            min_spacing_m: 10_000.0,
            max_extra_distance_m: 30_000.0,
            max_extra_duration_s: 3_600.0,
            anchor_spacing_m: 5_000.0,
            min_efficiency: 0.02,
            min_way_length_m: 500.0,
            max_way_length_m: 20_000.0,
            off_road_speed_mps: 8.0,
        }
    }
}

impl DetourConstraints {
    /// Apply request-level overrides. Trip hints longer than the baseline set
    /// the extra budgets to the gap; hints at or below it leave no budget.
    pub fn with_preferences(mut self, prefs: &PlanningPreferences, baseline: &BaselineRoute) -> Self {
        if let Some(max) = prefs.max_detours {
            self.max_count = max;
        }
        if let Some(radius) = prefs.detour_radius_m.filter(|r| r.is_finite() && *r > 0.0) {
            self.max_radius_m = radius;
        }
        if let Some(km) = prefs.trip_distance_km.filter(|v| v.is_finite()) {
            self.max_extra_distance_m = (km * 1000.0 - baseline.distance_m).max(0.0);
        }
        if let Some(hours) = prefs.trip_duration_h.filter(|v| v.is_finite()) {
            self.max_extra_duration_s = (hours * 3600.0 - baseline.duration_s).max(0.0);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetourCandidate {
    pub id: String,
    pub anchor: Anchor,
    pub detour_type: DetourType,
    pub record_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Starts at the baseline entry point and ends at the exit point
    pub geometry: Vec<Coordinate>,
    pub entry_index: usize,
    pub exit_index: usize,
    pub extra_distance_m: f64,
    pub extra_duration_s: f64,
    pub gain: f64,
    /// Gain per extra km
    pub efficiency: f64,
    pub discovery_order: usize,
}

impl DetourCandidate {
    fn overlaps(&self, other: &DetourCandidate) -> bool {
        self.entry_index < other.exit_index && other.entry_index < self.exit_index
    }
}

/// Records returned by discovery for one anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorRecords {
    pub anchor: Anchor,
    pub records: Vec<FeatureRecord>,
}

/// Closest anchor spacing honoured; smaller requests are raised to it.
pub const MIN_ANCHOR_SPACING_M: f64 = 500.0;

/// Evenly spaced anchors along the route, snapped to vertices. Routes shorter
/// than one spacing get a single anchor at the midpoint.
pub fn sample_anchors(geometry: &RouteGeometry, spacing_m: f64) -> Vec<Anchor> {
    let cumulative = geometry.cumulative_m();
    let length = geometry.length_m();
    let last = geometry.len() - 1;
    let mut targets = Vec::new();
    if spacing_m.is_finite() && spacing_m > 0.0 {
        let spacing_m = spacing_m.max(MIN_ANCHOR_SPACING_M);
        let mut d = spacing_m;
        while d < length {
            targets.push(d);
            d += spacing_m;
        }
    }
    if targets.is_empty() {
        targets.push(length / 2.0);
    }

    let mut anchors: Vec<Anchor> = Vec::new();
    for target in targets {
        let idx = cumulative.partition_point(|c| *c < target).clamp(1, last);
        if anchors.last().is_some_and(|a| a.point_index == idx) {
            continue;
        }
        anchors.push(Anchor {
            order: anchors.len(),
            point_index: idx,
            coordinate: geometry.points()[idx],
            distance_along_m: cumulative[idx],
        });
    }
    anchors
}

pub fn classify(record: &FeatureRecord) -> DetourType {
    if record.kind == FeatureKind::Node {
        return DetourType::PointOfInterest;
    }
    if osm::has_name_hint(&record.tags, osm::TECHNICAL_HINTS)
        || osm::technical_difficulty(&record.tags) >= 0.75
    {
        return DetourType::TechnicalChallenge;
    }
    if record.is_closed() || osm::has_name_hint(&record.tags, osm::SCENIC_HINTS) {
        return DetourType::ScenicLoop;
    }
    DetourType::DirtSegment
}

/// Whether a way is worth considering at all.
pub fn is_suitable(record: &FeatureRecord, constraints: &DetourConstraints) -> bool {
    if !osm::allows_motorcycles(&record.tags) {
        return false;
    }
    match record.kind {
        FeatureKind::Node => !record.geometry.is_empty(),
        FeatureKind::Way => {
            let length = record.length_m();
            record.geometry.len() >= 2
                && length >= constraints.min_way_length_m
                && length <= constraints.max_way_length_m
        }
    }
}

/// Mean of a per-segment value over the segments touching `[entry, exit]`.
fn baseline_mean(
    features: &[SegmentFeature],
    entry: usize,
    exit: usize,
    value: fn(&SegmentFeature) -> f64,
) -> f64 {
    let touching: Vec<f64> = features
        .iter()
        .filter(|f| {
            if entry == exit {
                f.start <= entry && entry <= f.end
            } else {
                f.start < exit && f.end > entry
            }
        })
        .map(value)
        .collect();
    if touching.is_empty() {
        return NEUTRAL_SCORE;
    }
    touching.iter().sum::<f64>() / touching.len() as f64
}

/// Per-objective gains of one record before the rider's weights apply.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct GainParts {
    dirt: f64,
    scenic: f64,
    /// Difficulty a risk-seeking rider is after
    challenge: f64,
    risk: f64,
}

impl GainParts {
    /// Positive weights reward their objective; a negative risk weight turns
    /// risk into a penalty.
    fn weighted(&self, preference: &PreferenceWeights) -> f64 {
        self.dirt * preference.dirt.max(0.0)
            + self.scenic * preference.scenic.max(0.0)
            + self.challenge * preference.risk.max(0.0)
            - self.risk * (-preference.risk).max(0.0)
    }
}

fn gain_parts(
    detour_type: DetourType,
    record: &FeatureRecord,
    features: &[SegmentFeature],
    entry: usize,
    exit: usize,
    poi_distance_m: f64,
    tag_weights: &TagWeights,
) -> GainParts {
    let difficulty = osm::technical_difficulty(&record.tags);
    let dirt_delta = || {
        osm::dirt_likelihood(&record.tags, tag_weights).unwrap_or(NEUTRAL_SCORE)
            - baseline_mean(features, entry, exit, |f| f.surface_score)
    };
    match detour_type {
        DetourType::DirtSegment => GainParts {
            dirt: dirt_delta(),
            risk: difficulty,
            ..Default::default()
        },
        DetourType::PointOfInterest => GainParts {
            scenic: 1.0 / (1.0 + poi_distance_m / 1000.0),
            ..Default::default()
        },
        DetourType::TechnicalChallenge => GainParts {
            dirt: dirt_delta(),
            challenge: difficulty,
            risk: difficulty,
            ..Default::default()
        },
        DetourType::ScenicLoop => {
            let mut scenic = NEUTRAL_SCORE;
            if osm::has_name_hint(&record.tags, osm::SCENIC_HINTS) {
                scenic += 0.2;
            }
            scenic += 0.1 * osm::dirt_likelihood(&record.tags, tag_weights).unwrap_or(0.0);
            GainParts {
                scenic: scenic.min(1.0) - baseline_mean(features, entry, exit, |f| f.scenic),
                risk: difficulty,
                ..Default::default()
            }
        }
    }
}

/// What discovered records are scored against.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub baseline: &'a BaselineRoute,
    pub features: &'a [SegmentFeature],
    pub constraints: &'a DetourConstraints,
    pub tag_weights: &'a TagWeights,
    /// Rider objective weights from the routing model
    pub preference: &'a PreferenceWeights,
}

/// Turn one discovered record into a candidate, or `None` when it is
/// unsuitable, out of range or not worth the extra distance for this rider.
pub fn score_record(
    record: &FeatureRecord,
    anchor: &Anchor,
    ctx: &ScoringContext<'_>,
    discovery_order: usize,
) -> Option<DetourCandidate> {
    let constraints = ctx.constraints;
    if !is_suitable(record, constraints) {
        return None;
    }
    let baseline = ctx.baseline;
    let route = baseline.geometry.points();
    let detour_type = classify(record);

    let (geometry, entry, exit, poi_distance_m) = match record.kind {
        FeatureKind::Node => {
            let poi = *record.geometry.first()?;
            let (entry, d) = spatial::closest_vertex(&poi, route)?;
            (vec![route[entry], poi, route[entry]], entry, entry, d)
        }
        FeatureKind::Way => {
            let first = record.geometry.first()?;
            let last = record.geometry.last()?;
            let (a, _) = spatial::closest_vertex(first, route)?;
            let (b, _) = spatial::closest_vertex(last, route)?;
            let mut way = record.geometry.clone();
            let (entry, exit) = if a <= b {
                (a, b)
            } else {
                way.reverse();
                (b, a)
            };
            let mut geometry = Vec::with_capacity(way.len() + 2);
            geometry.push(route[entry]);
            geometry.extend(way);
            geometry.push(route[exit]);
            geometry.dedup_by(|x, y| x.same_position(y));
            (geometry, entry, exit, 0.0)
        }
    };

    if spatial::distance_m(&anchor.coordinate, &geometry[0]) > constraints.max_radius_m {
        return None;
    }

    let detour_length = spatial::path_length_m(&geometry);
    let replaced_length = baseline.geometry.distance_between(entry, exit);
    let extra_distance_m = (detour_length - replaced_length).max(0.0);
    let extra_duration_s = (detour_length / constraints.off_road_speed_mps.max(0.1)
        - replaced_length / baseline.average_speed_mps())
    .max(0.0);

    let gain = gain_parts(
        detour_type,
        record,
        ctx.features,
        entry,
        exit,
        poi_distance_m,
        ctx.tag_weights,
    )
    .weighted(ctx.preference);
    if gain.is_nan() || gain <= 0.0 {
        return None;
    }
    let efficiency = gain / (extra_distance_m / 1000.0).max(0.1);
    if efficiency < constraints.min_efficiency {
        return None;
    }

    Some(DetourCandidate {
        id: format!("{}-{}", anchor.order, record.id),
        anchor: *anchor,
        detour_type,
        record_id: record.id,
        name: record.name().map(str::to_string),
        geometry,
        entry_index: entry,
        exit_index: exit,
        extra_distance_m,
        extra_duration_s,
        gain,
        efficiency,
        discovery_order,
    })
}

/// Score every discovered record. Discovery order is anchor order, then
/// distance from the anchor; a record seen from several anchors is kept once.
pub fn score_candidates(discovered: &[AnchorRecords], ctx: &ScoringContext<'_>) -> Vec<DetourCandidate> {
    let mut seen = std::collections::HashSet::new();
    let mut order = 0;
    let mut candidates = Vec::new();

    for batch in discovered {
        let mut records: Vec<(&FeatureRecord, f64)> = batch
            .records
            .iter()
            .map(|r| (r, r.distance_to(&batch.anchor.coordinate)))
            .collect();
        records.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.id.cmp(&b.0.id)));

        for (record, _) in records {
            if !seen.insert((record.kind == FeatureKind::Way, record.id)) {
                continue;
            }
            let discovery_order = order;
            order += 1;
            if let Some(candidate) = score_record(record, &batch.anchor, ctx, discovery_order) {
                candidates.push(candidate);
            }
        }
    }
    tracing::debug!(
        "Scored {} detour candidates from {} discovered records",
        candidates.len(),
        order
    );
    candidates
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    CountLimit,
    DistanceBudget,
    DurationBudget,
    TooClose,
    OverlappingRange,
}

/// Outcome of selection as indices into the candidate slice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// Accepted candidates in acceptance order
    pub accepted: Vec<usize>,
    pub rejected: Vec<(usize, RejectReason)>,
}

/// Greedy selection by descending efficiency; ties keep discovery order.
/// Candidates are never modified.
pub fn select(candidates: &[DetourCandidate], constraints: &DetourConstraints) -> Selection {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|a, b| {
        let (ca, cb) = (&candidates[*a], &candidates[*b]);
        cb.efficiency
            .total_cmp(&ca.efficiency)
            .then(ca.discovery_order.cmp(&cb.discovery_order))
    });

    let mut selection = Selection::default();
    let mut extra_distance = 0.0;
    let mut extra_duration = 0.0;

    for idx in order {
        let candidate = &candidates[idx];
        let reject = if selection.accepted.len() >= constraints.max_count {
            Some(RejectReason::CountLimit)
        } else if extra_distance + candidate.extra_distance_m > constraints.max_extra_distance_m {
            Some(RejectReason::DistanceBudget)
        } else if extra_duration + candidate.extra_duration_s > constraints.max_extra_duration_s {
            Some(RejectReason::DurationBudget)
        } else if selection.accepted.iter().any(|a| {
            spatial::distance_m(&candidates[*a].anchor.coordinate, &candidate.anchor.coordinate)
                < constraints.min_spacing_m
        }) {
            Some(RejectReason::TooClose)
        } else if selection
            .accepted
            .iter()
            .any(|a| candidates[*a].overlaps(candidate))
        {
            Some(RejectReason::OverlappingRange)
        } else {
            None
        };

        match reject {
            Some(reason) => selection.rejected.push((idx, reason)),
            None => {
                extra_distance += candidate.extra_distance_m;
                extra_duration += candidate.extra_duration_s;
                selection.accepted.push(idx);
            }
        }
    }
    tracing::debug!(
        "Selected {} of {} detours ({:.0} m extra)",
        selection.accepted.len(),
        candidates.len(),
        extra_distance
    );
    selection
}

/// Replace each detour's `[entry, exit]` stretch of the baseline with its
/// own geometry.
pub fn splice(
    baseline: &RouteGeometry,
    detours: &[&DetourCandidate],
) -> Result<RouteGeometry, PlanError> {
    let mut ordered: Vec<&DetourCandidate> = detours.to_vec();
    ordered.sort_by_key(|d| (d.entry_index, d.exit_index));

    for (i, a) in ordered.iter().enumerate() {
        for b in &ordered[i + 1..] {
            if a.overlaps(b) {
                return Err(PlanError::DetourSpliceConflict {
                    first: a.id.clone(),
                    second: b.id.clone(),
                });
            }
        }
    }

    let route = baseline.points();
    let mut points = Vec::with_capacity(route.len());
    let mut cursor = 0;
    for detour in ordered {
        if cursor > detour.entry_index || detour.exit_index >= route.len() {
            return Err(PlanError::DetourSpliceConflict {
                first: detour.id.clone(),
                second: "baseline".to_string(),
            });
        }
        points.extend_from_slice(&route[cursor..=detour.entry_index]);
        if detour.geometry.len() > 2 {
            points.extend_from_slice(&detour.geometry[1..detour.geometry.len() - 1]);
        }
        cursor = detour.exit_index;
    }
    points.extend_from_slice(&route[cursor..]);
    RouteGeometry::new(points)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn straight_baseline(n: usize, step_deg: f64) -> BaselineRoute {
        let points = (0..n)
            .map(|i| Coordinate::new(45.0 + i as f64 * step_deg, 6.0))
            .collect();
        let geometry = RouteGeometry::new(points).unwrap();
        let distance = geometry.length_m();
        BaselineRoute::new(geometry, distance, distance / 20.0)
    }

    fn candidate(id: &str, efficiency: f64, order: usize, lat: f64, range: (usize, usize)) -> DetourCandidate {
        DetourCandidate {
            id: id.to_string(),
            anchor: Anchor {
                order,
                point_index: range.0,
                coordinate: Coordinate::new(lat, 6.0),
                distance_along_m: 0.0,
            },
            detour_type: DetourType::DirtSegment,
            record_id: order as i64,
            name: None,
            geometry: vec![],
            entry_index: range.0,
            exit_index: range.1,
            extra_distance_m: 1_000.0,
            extra_duration_s: 120.0,
            gain: efficiency,
            efficiency,
            discovery_order: order,
        }
    }

    #[test]
    fn selects_top_two_by_efficiency() {
        let effs = [0.9, 0.7, 0.5, 0.3, 0.1];
        let candidates: Vec<_> = effs
            .iter()
            .enumerate()
            .map(|(i, e)| candidate(&format!("c{i}"), *e, i, 45.0 + i as f64, (i * 10, i * 10 + 5)))
            .collect();
        let constraints = DetourConstraints {
            max_count: 2,
            ..Default::default()
        };
        let selection = select(&candidates, &constraints);
        assert_eq!(selection.accepted, vec![0, 1]);
        assert!(selection
            .rejected
            .iter()
            .all(|(_, r)| *r == RejectReason::CountLimit));
    }

    #[test]
    fn close_anchors_keep_only_the_better() {
        let candidates = vec![
            candidate("weak", 0.4, 0, 45.0, (0, 2)),
            candidate("strong", 0.8, 1, 45.001, (10, 12)),
        ];
        let selection = select(&candidates, &DetourConstraints::default());
        assert_eq!(selection.accepted, vec![1]);
        assert_eq!(selection.rejected, vec![(0, RejectReason::TooClose)]);
    }

    #[test]
    fn distance_budget_is_never_exceeded() {
        let candidates: Vec<_> = (0..4)
            .map(|i| candidate(&format!("c{i}"), 1.0 - i as f64 * 0.1, i, 45.0 + i as f64, (i * 10, i * 10 + 1)))
            .collect();
        let constraints = DetourConstraints {
            max_count: 10,
            max_extra_distance_m: 2_500.0,
            ..Default::default()
        };
        let selection = select(&candidates, &constraints);
        let used: f64 = selection
            .accepted
            .iter()
            .map(|i| candidates[*i].extra_distance_m)
            .sum();
        assert_eq!(selection.accepted.len(), 2);
        assert!(used <= constraints.max_extra_distance_m);
    }

    #[test]
    fn ties_break_by_discovery_order() {
        let candidates = vec![
            candidate("late", 0.5, 3, 46.0, (20, 22)),
            candidate("early", 0.5, 1, 45.0, (0, 2)),
        ];
        let constraints = DetourConstraints {
            max_count: 1,
            ..Default::default()
        };
        assert_eq!(select(&candidates, &constraints).accepted, vec![1]);
    }

    #[test]
    fn duration_budget_rejects_the_overflowing_detour() {
        let mut first = candidate("first", 0.9, 0, 45.0, (0, 2));
        first.extra_duration_s = 1_500.0;
        let mut second = candidate("second", 0.8, 1, 46.0, (10, 12));
        second.extra_duration_s = 1_000.0;
        let constraints = DetourConstraints {
            max_extra_duration_s: 2_000.0,
            ..Default::default()
        };
        let selection = select(&[first, second], &constraints);
        assert_eq!(selection.accepted, vec![0]);
        assert_eq!(selection.rejected, vec![(1, RejectReason::DurationBudget)]);
    }

    #[test]
    fn tiny_anchor_spacing_is_raised_to_the_minimum() {
        let baseline = straight_baseline(101, 0.001);
        let anchors = sample_anchors(&baseline.geometry, 0.01);
        let expected = (baseline.geometry.length_m() / MIN_ANCHOR_SPACING_M) as usize;
        assert!(anchors.len() <= expected);
        assert!(anchors.len() >= expected - 1);
    }

    /// Rough grade-5 track leaving the route near 45.002 and rejoining near 45.018.
    fn rough_track() -> FeatureRecord {
        FeatureRecord {
            id: 500,
            kind: FeatureKind::Way,
            tags: BTreeMap::from([
                ("highway".to_string(), "track".to_string()),
                ("tracktype".to_string(), "grade5".to_string()),
                ("smoothness".to_string(), "impassable".to_string()),
            ]),
            geometry: vec![
                Coordinate::new(45.002, 6.0005),
                Coordinate::new(45.006, 6.006),
                Coordinate::new(45.012, 6.006),
                Coordinate::new(45.018, 6.0005),
            ],
        }
    }

    fn score_for(preset: crate::routing_model::Preset) -> Vec<DetourCandidate> {
        let baseline = straight_baseline(21, 0.001);
        let anchors = sample_anchors(&baseline.geometry, 1_000.0);
        let model = crate::routing_model::build(preset);
        score_candidates(
            &[AnchorRecords {
                anchor: anchors[0],
                records: vec![rough_track()],
            }],
            &ScoringContext {
                baseline: &baseline,
                features: &[],
                constraints: &DetourConstraints::default(),
                tag_weights: &TagWeights::default(),
                preference: &model.preference,
            },
        )
    }

    #[test]
    fn technical_detours_follow_rider_preference() {
        use crate::routing_model::Preset;

        assert!(score_for(Preset::Easy).is_empty());

        let tech = score_for(Preset::Tech);
        assert_eq!(tech.len(), 1);
        assert_eq!(tech[0].detour_type, DetourType::TechnicalChallenge);
        assert!(tech[0].gain > 0.0);

        let mixed = score_for(Preset::Mixed);
        if let Some(c) = mixed.first() {
            assert!(c.gain < tech[0].gain);
        }
    }

    #[test]
    fn anchors_are_spaced_and_snapped() {
        let baseline = straight_baseline(101, 0.001);
        let anchors = sample_anchors(&baseline.geometry, 2_000.0);
        assert_eq!(anchors.len(), 5);
        for pair in anchors.windows(2) {
            assert!(pair[1].distance_along_m - pair[0].distance_along_m >= 1_900.0);
        }
        let short = sample_anchors(&straight_baseline(4, 0.001).geometry, 5_000.0);
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].point_index, 2);
    }

    #[test]
    fn splice_replaces_range_with_detour() {
        let baseline = straight_baseline(6, 0.001);
        let route = baseline.geometry.points();
        let mut detour = candidate("d", 1.0, 0, 45.0, (1, 3));
        detour.geometry = vec![route[1], Coordinate::new(45.002, 6.002), route[3]];
        let spliced = splice(&baseline.geometry, &[&detour]).unwrap();
        assert_eq!(spliced.len(), 6);
        assert_eq!(spliced.points()[2], Coordinate::new(45.002, 6.002));
        assert_eq!(spliced.points()[3], route[3]);
    }

    #[test]
    fn splice_rejects_overlapping_ranges() {
        let baseline = straight_baseline(10, 0.001);
        let a = candidate("a", 1.0, 0, 45.0, (1, 5));
        let b = candidate("b", 1.0, 1, 45.0, (4, 8));
        let err = splice(&baseline.geometry, &[&a, &b]).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn poi_out_and_back_is_scored() {
        let baseline = straight_baseline(21, 0.001);
        let anchors = sample_anchors(&baseline.geometry, 1_000.0);
        let viewpoint = FeatureRecord {
            id: 99,
            kind: FeatureKind::Node,
            tags: BTreeMap::from([("tourism".to_string(), "viewpoint".to_string())]),
            geometry: vec![Coordinate::new(45.005, 6.003)],
        };
        let scenic_only = PreferenceWeights {
            dirt: 0.0,
            scenic: 1.0,
            risk: 0.0,
            popularity: 0.0,
        };
        let candidates = score_candidates(
            &[AnchorRecords {
                anchor: anchors[0],
                records: vec![viewpoint],
            }],
            &ScoringContext {
                baseline: &baseline,
                features: &[],
                constraints: &DetourConstraints::default(),
                tag_weights: &TagWeights::default(),
                preference: &scenic_only,
            },
        );
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.detour_type, DetourType::PointOfInterest);
        assert_eq!(c.entry_index, c.exit_index);
        assert!(c.extra_distance_m > 400.0);
        assert!(c.gain > 0.7 && c.gain < 1.0);
    }

    #[test]
    fn unsuitable_ways_are_filtered() {
        let tags = BTreeMap::from([("highway".to_string(), "track".to_string())]);
        let short = FeatureRecord {
            id: 1,
            kind: FeatureKind::Way,
            tags: tags.clone(),
            geometry: vec![Coordinate::new(45.0, 6.0), Coordinate::new(45.001, 6.0)],
        };
        assert!(!is_suitable(&short, &DetourConstraints::default()));
        let mut longer = short.clone();
        longer.geometry.push(Coordinate::new(45.01, 6.0));
        assert!(is_suitable(&longer, &DetourConstraints::default()));
        longer.tags.insert("motorcycle".into(), "no".into());
        assert!(!is_suitable(&longer, &DetourConstraints::default()));
    }
}
