//! Rider popularity from an in-memory ride-trace store.

use std::path::Path;

use adv_core::spatial::distance_to_polyline_m;
use adv_core::{BoundingBox, Coordinate, SegmentRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;
use crate::traits::PopularitySource;

/// Trace points within this distance of a segment count as a ride over it.
const SNAP_TOLERANCE_M: f64 = 50.0;
/// Traces uploaded within this many days count as recent.
const RECENT_DAYS: i64 = 730;
/// Hit count that saturates the base score.
const SATURATING_HITS: f64 = 10.0;
/// Upper bound on sampled points per trace when matching.
const MAX_SAMPLED_POINTS: usize = 100;

const MOTORCYCLE_ACTIVITIES: &[&str] = &["motorcycle", "motorbike", "enduro", "adv"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceSignals {
    #[serde(default)]
    pub views: f64,
    #[serde(default)]
    pub likes: f64,
    #[serde(default)]
    pub downloads: f64,
}

/// One recorded ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideTrace {
    pub id: String,
    #[serde(default)]
    pub source: String,
    pub activity: String,
    pub uploaded_at: DateTime<Utc>,
    pub points: Vec<Coordinate>,
    #[serde(default)]
    pub signals: TraceSignals,
}

impl RideTrace {
    pub fn is_motorcycle(&self) -> bool {
        let activity = self.activity.to_ascii_lowercase();
        MOTORCYCLE_ACTIVITIES.contains(&activity.as_str())
    }

    pub fn is_recent(&self, now: DateTime<Utc>) -> bool {
        (now - self.uploaded_at).num_days() <= RECENT_DAYS
    }

    fn matches(&self, segment: &SegmentRef, bounds: &BoundingBox) -> bool {
        let step = (self.points.len() / MAX_SAMPLED_POINTS).max(1);
        self.points.iter().step_by(step).any(|point| {
            point.lat >= bounds.min_lat
                && point.lat <= bounds.max_lat
                && point.lon >= bounds.min_lon
                && point.lon <= bounds.max_lon
                && distance_to_polyline_m(point, &segment.points) <= SNAP_TOLERANCE_M
        })
    }
}

/// Hit counters for one segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentHits {
    pub total: usize,
    pub motorcycle: usize,
    pub recent: usize,
    pub views: f64,
    pub likes: f64,
}

impl SegmentHits {
    /// Normalised popularity in [0, 1].
    pub fn score(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let total = self.total as f64;
        let base = (total / SATURATING_HITS).min(1.0);
        let moto_bonus = self.motorcycle as f64 / total * 0.3;
        let recent_bonus = self.recent as f64 / total * 0.2;
        let signals_bonus = ((self.views / total / 5000.0 + self.likes / total / 500.0) / 2.0).min(0.2);
        (base + moto_bonus + recent_bonus + signals_bonus).clamp(0.0, 1.0)
    }
}

/// Trace store keyed by trace id.
#[derive(Default)]
pub struct TracePopularity {
    traces: DashMap<String, RideTrace>,
}

impl TracePopularity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_traces(traces: impl IntoIterator<Item = RideTrace>) -> Self {
        let store = Self::new();
        for trace in traces {
            store.insert(trace);
        }
        store
    }

    pub fn from_json(raw: &str) -> Result<Self, SourceError> {
        let traces: Vec<RideTrace> = serde_json::from_str(raw)
            .map_err(|err| SourceError::PopularityUnavailable(format!("invalid traces: {}", err)))?;
        Ok(Self::from_traces(traces))
    }

    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            SourceError::PopularityUnavailable(format!("{}: {}", path.display(), err))
        })?;
        let store = Self::from_json(&raw)?;
        tracing::info!("Loaded {} ride traces from {}", store.len(), path.display());
        Ok(store)
    }

    /// Insert or replace a trace.
    pub fn insert(&self, trace: RideTrace) {
        self.traces.insert(trace.id.clone(), trace);
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn hits(&self, segment: &SegmentRef, now: DateTime<Utc>) -> SegmentHits {
        let mut hits = SegmentHits::default();
        let Some(bounds) = BoundingBox::from_points(&segment.points) else {
            return hits;
        };
        let bounds = bounds.expand_by_meters(SNAP_TOLERANCE_M);

        for entry in self.traces.iter() {
            let trace = entry.value();
            if !trace.matches(segment, &bounds) {
                continue;
            }
            hits.total += 1;
            if trace.is_motorcycle() {
                hits.motorcycle += 1;
            }
            if trace.is_recent(now) {
                hits.recent += 1;
            }
            hits.views += trace.signals.views;
            hits.likes += trace.signals.likes;
        }
        hits
    }
}

#[async_trait]
impl PopularitySource for TracePopularity {
    async fn popularity(&self, segment: &SegmentRef) -> Result<f64, SourceError> {
        if self.is_empty() {
            return Err(SourceError::PopularityUnavailable("no ride traces loaded".to_string()));
        }
        Ok(self.hits(segment, Utc::now()).score())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn segment() -> SegmentRef {
        SegmentRef {
            index: 0,
            points: vec![Coordinate::new(47.0, 8.0), Coordinate::new(47.0, 8.01)],
            length_m: 760.0,
        }
    }

    fn trace(id: &str, activity: &str, lat: f64, uploaded_at: DateTime<Utc>) -> RideTrace {
        RideTrace {
            id: id.to_string(),
            source: "manual".to_string(),
            activity: activity.to_string(),
            uploaded_at,
            points: vec![Coordinate::new(lat, 8.002), Coordinate::new(lat, 8.008)],
            signals: TraceSignals::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn only_nearby_traces_count() {
        let now = now();
        let store = TracePopularity::from_traces(vec![
            trace("a", "motorcycle", 47.0002, now),
            trace("b", "hiking", 47.0001, now - chrono::Duration::days(1500)),
            trace("far", "motorcycle", 47.05, now),
        ]);

        let hits = store.hits(&segment(), now);
        assert_eq!(hits.total, 2);
        assert_eq!(hits.motorcycle, 1);
        assert_eq!(hits.recent, 1);
    }

    #[test]
    fn score_combines_hits_and_shares() {
        let hits = SegmentHits {
            total: 5,
            motorcycle: 5,
            recent: 0,
            views: 0.0,
            likes: 0.0,
        };
        assert!((hits.score() - 0.8).abs() < 1e-9);
        assert_eq!(SegmentHits::default().score(), 0.0);
    }

    #[test]
    fn traces_parse_from_json() {
        let raw = r#"[{
            "id": "t1",
            "activity": "Enduro",
            "uploaded_at": "2024-01-01T00:00:00Z",
            "points": [{"lat": 47.0, "lon": 8.0}, {"lat": 47.0, "lon": 8.01}],
            "signals": {"views": 1200}
        }]"#;
        let store = TracePopularity::from_json(raw).unwrap();
        assert_eq!(store.len(), 1);
        let hits = store.hits(&segment(), now());
        assert_eq!(hits.motorcycle, 1);
    }

    #[tokio::test]
    async fn empty_store_is_unavailable() {
        let store = TracePopularity::new();
        let err = store.popularity(&segment()).await.unwrap_err();
        assert!(matches!(err, SourceError::PopularityUnavailable(_)));
    }
}
