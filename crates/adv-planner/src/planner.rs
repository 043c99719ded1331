//! Orchestration planner: baseline route, concurrent source fan-out under one
//! deadline, then deterministic scoring and detour selection.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use adv_core::osm::corridor_tiles;
use adv_core::routing_model::{self, RoutingModel};
use adv_core::{
    extract, segment_route, summarize, BaselineRoute, Coordinate, DetourConstraints,
    FeatureQuery, FeatureRecord, PlanError, PlanningPreferences, RouteGeometry, RouteSignals,
    ScoringWeights, Segment, Signal,
};
use adv_sources::{
    ElevationSource, FeatureSource, ImagerySource, PopularitySource, RoutingEngine, SourceError,
};
use futures::stream::{self, StreamExt};
use tokio::time::{timeout, Instant};

use crate::cache::{fingerprint, FingerprintCache, PlannerCache};
use crate::detour;
use crate::result::{
    Diagnostics, PlanningResult, RouteSummary, SourceKind, SourceReport, SourceStatus,
};

/// Per-source timeouts and the overall request deadline. Every source call
/// is bounded by the smaller of its own timeout and the time left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanningBudget {
    pub deadline: Duration,
    pub routing: Duration,
    pub elevation: Duration,
    pub features: Duration,
    pub imagery: Duration,
    pub popularity: Duration,
    pub discovery: Duration,
}

impl Default for PlanningBudget {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(15),
            routing: Duration::from_secs(8),
            elevation: Duration::from_secs(4),
            features: Duration::from_secs(6),
            imagery: Duration::from_secs(3),
            popularity: Duration::from_secs(2),
            discovery: Duration::from_secs(4),
        }
    }
}

impl PlanningBudget {
    /// Same per-source timeouts with a different overall deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Configured collaborators. Any of them may be absent.
#[derive(Clone, Default)]
pub struct Sources {
    pub engine: Option<Arc<dyn RoutingEngine>>,
    pub elevation: Option<Arc<dyn ElevationSource>>,
    pub features: Option<Arc<dyn FeatureSource>>,
    pub imagery: Option<Arc<dyn ImagerySource>>,
    pub popularity: Option<Arc<dyn PopularitySource>>,
}

impl Sources {
    pub fn with_engine(mut self, engine: Arc<dyn RoutingEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_elevation(mut self, elevation: Arc<dyn ElevationSource>) -> Self {
        self.elevation = Some(elevation);
        self
    }

    pub fn with_features(mut self, features: Arc<dyn FeatureSource>) -> Self {
        self.features = Some(features);
        self
    }

    pub fn with_imagery(mut self, imagery: Arc<dyn ImagerySource>) -> Self {
        self.imagery = Some(imagery);
        self
    }

    pub fn with_popularity(mut self, popularity: Arc<dyn PopularitySource>) -> Self {
        self.popularity = Some(popularity);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannerSettings {
    pub segment_length_m: f64,
    /// Route length covered by one corridor feature query
    pub corridor_tile_m: f64,
    /// Upper bound on in-flight requests per fan-out slot
    pub max_concurrent_requests: usize,
    pub weights: ScoringWeights,
    pub constraints: DetourConstraints,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            segment_length_m: adv_core::features::DEFAULT_SEGMENT_LENGTH_M,
            corridor_tile_m: 25_000.0,
            max_concurrent_requests: 8,
            weights: ScoringWeights::default(),
            constraints: DetourConstraints::default(),
        }
    }
}

/// Outcome of one bounded source call.
pub(crate) enum Fetched<V> {
    Value { value: V, cache_hit: bool },
    Failed(SourceError),
    TimedOut,
}

/// Run a source call through the optional cache, bounded by
/// `min(limit, deadline - now)`.
pub(crate) async fn fetch_bounded<V, F, Fut>(
    cache: Option<&FingerprintCache<V>>,
    key: &str,
    limit: Duration,
    deadline: Instant,
    fetch: F,
) -> Fetched<V>
where
    V: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<V, SourceError>>,
{
    let limit = limit.min(deadline.saturating_duration_since(Instant::now()));
    if limit.is_zero() {
        return Fetched::TimedOut;
    }

    let call = async {
        match cache {
            Some(cache) => cache.get_or_fetch(key, fetch).await,
            None => fetch().await.map(|value| (value, false)),
        }
    };

    match timeout(limit, call).await {
        Ok(Ok((value, cache_hit))) => Fetched::Value { value, cache_hit },
        Ok(Err(SourceError::FeatureSourceTimeout)) | Err(_) => Fetched::TimedOut,
        Ok(Err(err)) => Fetched::Failed(err),
    }
}

/// Running counts for a slot that issues several requests.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub requests: usize,
    pub succeeded: usize,
    pub cache_hits: usize,
    pub timeouts: usize,
    pub last_error: Option<String>,
}

impl Tally {
    /// Record one outcome and return its value, if any.
    pub fn record<V>(&mut self, fetched: Fetched<V>) -> Option<V> {
        self.requests += 1;
        match fetched {
            Fetched::Value { value, cache_hit } => {
                self.succeeded += 1;
                if cache_hit {
                    self.cache_hits += 1;
                }
                Some(value)
            }
            Fetched::Failed(err) => {
                self.last_error = Some(err.to_string());
                None
            }
            Fetched::TimedOut => {
                self.timeouts += 1;
                None
            }
        }
    }

    pub fn into_report(self, source: SourceKind, started: Instant) -> SourceReport {
        let status = if self.requests == 0 {
            SourceStatus::Skipped
        } else if self.succeeded == self.requests {
            SourceStatus::Ok
        } else if self.succeeded > 0 {
            SourceStatus::Partial
        } else if self.timeouts == self.requests {
            SourceStatus::TimedOut
        } else {
            SourceStatus::Failed
        };
        SourceReport {
            source,
            status,
            elapsed_ms: started.elapsed().as_millis() as u64,
            requests: self.requests,
            succeeded: self.succeeded,
            cache_hits: self.cache_hits,
            message: self.last_error,
        }
    }
}

pub struct Planner {
    sources: Sources,
    settings: PlannerSettings,
    cache: Option<Arc<PlannerCache>>,
}

impl Planner {
    pub fn new(sources: Sources, settings: PlannerSettings) -> Self {
        Self {
            sources,
            settings,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<PlannerCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Plan a route through `waypoints`.
    ///
    /// Fails only on invalid input, when the baseline route cannot be
    /// obtained, or on an internal splice conflict. Every other source
    /// problem lowers confidence and shows up in the diagnostics.
    pub async fn plan(
        &self,
        waypoints: &[Coordinate],
        preferences: &PlanningPreferences,
        budget: &PlanningBudget,
    ) -> Result<PlanningResult, PlanError> {
        let started = Instant::now();
        let deadline = started + budget.deadline;
        let mut notes = Vec::new();

        let request = RouteGeometry::new(waypoints.to_vec())?;
        tracing::info!("Planning route through {} waypoints", request.len());

        let model = self.resolve_model(preferences, &mut notes);
        let (mut baseline, routing_report) = self
            .baseline(request.points(), &model, budget.routing, deadline)
            .await?;
        tracing::debug!(
            "Baseline route: {} points, {:.0} m, {:.0} s",
            baseline.geometry.len(),
            baseline.distance_m,
            baseline.duration_s
        );

        let geometry = &baseline.geometry;
        let segments = segment_route(
            geometry,
            self.settings.segment_length_m,
            &baseline.way_boundaries,
        );
        let constraints = self
            .settings
            .constraints
            .clone()
            .with_preferences(preferences, &baseline);
        let anchors = if constraints.max_count == 0 {
            Vec::new()
        } else {
            adv_core::sample_anchors(geometry, constraints.anchor_spacing_m)
        };

        let (
            (elevations, elevation_report),
            (corridor, features_report),
            (imagery, imagery_report),
            (popularity, popularity_report),
            discovery,
        ) = futures::join!(
            self.elevation_slot(geometry, budget.elevation, deadline),
            self.corridor_slot(geometry, budget.features, deadline),
            self.imagery_slot(geometry, &segments, budget.imagery, deadline),
            self.popularity_slot(geometry, &segments, budget.popularity, deadline),
            detour::discover(
                self.sources.features.as_deref(),
                self.cache.as_deref(),
                &anchors,
                constraints.max_radius_m,
                budget.discovery,
                deadline,
                self.settings.max_concurrent_requests,
            ),
        );

        // Aggregation runs in fixed slot order, independent of completion order.
        let signals = RouteSignals {
            elevations,
            osm: corridor,
            imagery,
            popularity,
        };
        let features = extract(geometry, &segments, &signals, &self.settings.weights);
        if let Some(values) = signals.elevations.real_value() {
            baseline.geometry = baseline.geometry.with_elevations(values);
        }
        let outcome = detour::optimize(
            &discovery,
            &baseline,
            &features,
            &constraints,
            &self.settings.weights,
            &model.preference,
        )?;

        let feature_summary = summarize(&features);
        let extra_distance_m: f64 = outcome.accepted.iter().map(|d| d.extra_distance_m).sum();
        let extra_duration_s: f64 = outcome.accepted.iter().map(|d| d.extra_duration_s).sum();
        let summary = RouteSummary {
            distance_m: baseline.distance_m + extra_distance_m,
            duration_s: baseline.duration_s + extra_duration_s,
            baseline_distance_m: baseline.distance_m,
            baseline_duration_s: baseline.duration_s,
            extra_distance_m,
            extra_duration_s,
            detour_count: outcome.accepted.len(),
            features: feature_summary,
        };

        let sources = vec![
            routing_report,
            elevation_report,
            features_report,
            imagery_report,
            popularity_report,
            discovery.report.clone(),
        ];
        for report in &sources {
            if !report.status.contributed() && report.status != SourceStatus::Skipped {
                tracing::warn!(
                    "Source {} degraded ({:?}): {}",
                    report.source.as_str(),
                    report.status,
                    report.message.as_deref().unwrap_or("no detail")
                );
            }
        }
        let diagnostics = Diagnostics {
            contributing_sources: sources
                .iter()
                .filter(|r| r.status.contributed())
                .map(|r| r.source)
                .collect(),
            cache_hits: sources.iter().map(|r| r.cache_hits).sum(),
            sources,
            detours: outcome.diagnostics,
            confidence: summary.features.mean_confidence,
            elapsed_ms: started.elapsed().as_millis() as u64,
            notes,
        };

        tracing::info!(
            "Planned {:.0} m with {} detours, confidence {:.2}",
            summary.distance_m,
            summary.detour_count,
            diagnostics.confidence
        );

        Ok(PlanningResult {
            geometry: outcome.geometry,
            baseline,
            segments: features,
            detours: outcome.accepted,
            model,
            summary,
            diagnostics,
        })
    }

    /// An unknown preset name falls back to the preset the other preferences
    /// imply.
    fn resolve_model(&self, preferences: &PlanningPreferences, notes: &mut Vec<String>) -> RoutingModel {
        match routing_model::build_for(preferences) {
            Ok(model) => model,
            Err(err) => {
                tracing::warn!("{}; using preferences instead", err);
                notes.push(err.to_string());
                let fallback = PlanningPreferences {
                    preset: None,
                    ..preferences.clone()
                };
                routing_model::build_for(&fallback)
                    .unwrap_or_else(|_| routing_model::build(routing_model::preset_for(&fallback)))
            }
        }
    }

    async fn baseline(
        &self,
        waypoints: &[Coordinate],
        model: &RoutingModel,
        limit: Duration,
        deadline: Instant,
    ) -> Result<(BaselineRoute, SourceReport), PlanError> {
        let started = Instant::now();
        let Some(engine) = self.sources.engine.as_deref() else {
            return Err(PlanError::BaselineRouteUnavailable(
                "no routing engine configured".to_string(),
            ));
        };

        let engine_model = model.export();
        let key = fingerprint("route", &(waypoints, &engine_model));
        let fetched = fetch_bounded(
            self.cache.as_deref().map(|c| &c.routes),
            &key,
            limit,
            deadline,
            || engine.route(waypoints, &engine_model),
        )
        .await;

        let mut tally = Tally::default();
        let route = tally.record(fetched);
        let report = tally.into_report(SourceKind::Routing, started);
        match route {
            Some(route) => Ok((route, report)),
            None => Err(PlanError::BaselineRouteUnavailable(
                report
                    .message
                    .unwrap_or_else(|| "routing engine timed out".to_string()),
            )),
        }
    }

    async fn elevation_slot(
        &self,
        geometry: &RouteGeometry,
        limit: Duration,
        deadline: Instant,
    ) -> (Signal<Vec<f64>>, SourceReport) {
        let started = Instant::now();
        let Some(source) = self.sources.elevation.as_deref() else {
            return (Signal::absent(), SourceReport::new(SourceKind::Elevation, SourceStatus::Unconfigured));
        };

        let points = geometry.points();
        let key = fingerprint("elevation", points);
        let fetched = fetch_bounded(
            self.cache.as_deref().map(|c| &c.elevations),
            &key,
            limit,
            deadline,
            || source.elevations(points),
        )
        .await;

        let mut tally = Tally::default();
        let signal = match tally.record(fetched) {
            Some(values) if values.len() == points.len() => Signal::real(values),
            Some(values) => {
                tally.succeeded -= 1;
                tally.last_error = Some(format!(
                    "{} elevations for {} points",
                    values.len(),
                    points.len()
                ));
                Signal::absent()
            }
            None => Signal::absent(),
        };
        (signal, tally.into_report(SourceKind::Elevation, started))
    }

    /// Corridor features fetched tile by tile along the route and merged.
    /// Records seen in several tiles are kept once, in tile order.
    async fn corridor_slot(
        &self,
        geometry: &RouteGeometry,
        limit: Duration,
        deadline: Instant,
    ) -> (Signal<Vec<FeatureRecord>>, SourceReport) {
        let started = Instant::now();
        let Some(source) = self.sources.features.as_deref() else {
            return (Signal::absent(), SourceReport::new(SourceKind::Features, SourceStatus::Unconfigured));
        };
        let weights = &self.settings.weights;
        let padding = weights.environment_radius_m.max(weights.poi_radius_m);
        let tiles = corridor_tiles(geometry, padding, self.settings.corridor_tile_m);
        let cache = self.cache.as_deref().map(|c| &c.features);
        tracing::debug!("Corridor features over {} tiles", tiles.len());

        let outcomes: Vec<_> = stream::iter(tiles.into_iter().map(FeatureQuery::corridor))
            .map(|query| async move {
                let key = fingerprint("features", &query);
                fetch_bounded(cache, &key, limit, deadline, || source.features(&query)).await
            })
            .buffered(self.settings.max_concurrent_requests.max(1))
            .collect()
            .await;

        let mut tally = Tally::default();
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        let mut answered = false;
        for fetched in outcomes {
            if let Some(records) = tally.record(fetched) {
                answered = true;
                merged.extend(
                    records
                        .into_iter()
                        .filter(|record| seen.insert((record.kind, record.id))),
                );
            }
        }
        let signal = if answered {
            Signal::real(merged)
        } else {
            Signal::absent()
        };
        (signal, tally.into_report(SourceKind::Features, started))
    }

    async fn imagery_slot(
        &self,
        geometry: &RouteGeometry,
        segments: &[Segment],
        limit: Duration,
        deadline: Instant,
    ) -> (Vec<Signal<f64>>, SourceReport) {
        let started = Instant::now();
        let Some(source) = self.sources.imagery.as_deref() else {
            return (Vec::new(), SourceReport::new(SourceKind::Imagery, SourceStatus::Unconfigured));
        };
        let cache = self.cache.as_deref().map(|c| &c.imagery);

        let outcomes: Vec<_> = stream::iter(segments.iter().map(|s| s.midpoint(geometry)))
            .map(|point| async move {
                let key = fingerprint("imagery", &point);
                fetch_bounded(cache, &key, limit, deadline, || source.annotate(point)).await
            })
            .buffered(self.settings.max_concurrent_requests.max(1))
            .collect()
            .await;

        let mut tally = Tally::default();
        let signals = outcomes
            .into_iter()
            .map(|fetched| match tally.record(fetched) {
                Some(annotation) if annotation.has_evidence() => Signal::real(annotation.confidence),
                _ => Signal::neutral(0.0),
            })
            .collect();
        (signals, tally.into_report(SourceKind::Imagery, started))
    }

    async fn popularity_slot(
        &self,
        geometry: &RouteGeometry,
        segments: &[Segment],
        limit: Duration,
        deadline: Instant,
    ) -> (Vec<Signal<f64>>, SourceReport) {
        let started = Instant::now();
        let Some(source) = self.sources.popularity.as_deref() else {
            return (Vec::new(), SourceReport::new(SourceKind::Popularity, SourceStatus::Unconfigured));
        };
        let cache = self.cache.as_deref().map(|c| &c.popularity);

        let outcomes: Vec<_> = stream::iter(segments.iter().map(|s| s.to_ref(geometry)))
            .map(|segment| async move {
                let key = fingerprint("popularity", &segment.points);
                fetch_bounded(cache, &key, limit, deadline, || source.popularity(&segment)).await
            })
            .buffered(self.settings.max_concurrent_requests.max(1))
            .collect()
            .await;

        let mut tally = Tally::default();
        let signals = outcomes
            .into_iter()
            .map(|fetched| match tally.record(fetched) {
                Some(score) => Signal::real(score.clamp(0.0, 1.0)),
                None => Signal::neutral(0.0),
            })
            .collect();
        (signals, tally.into_report(SourceKind::Popularity, started))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_status_reflects_outcomes() {
        let started = Instant::now();
        let mut tally = Tally::default();
        tally.record(Fetched::Value {
            value: 1.0,
            cache_hit: true,
        });
        tally.record::<f64>(Fetched::TimedOut);
        let report = tally.into_report(SourceKind::Imagery, started);
        assert_eq!(report.status, SourceStatus::Partial);
        assert_eq!(report.cache_hits, 1);

        let mut tally = Tally::default();
        tally.record::<f64>(Fetched::TimedOut);
        assert_eq!(
            tally.into_report(SourceKind::Imagery, started).status,
            SourceStatus::TimedOut
        );

        let mut tally = Tally::default();
        tally.record::<f64>(Fetched::Failed(SourceError::ImageryUnavailable("x".into())));
        tally.record::<f64>(Fetched::TimedOut);
        let report = tally.into_report(SourceKind::Imagery, started);
        assert_eq!(report.status, SourceStatus::Failed);
        assert_eq!(report.message.as_deref(), Some("Imagery unavailable: x"));

        assert_eq!(
            Tally::default().into_report(SourceKind::Imagery, started).status,
            SourceStatus::Skipped
        );
    }

    #[tokio::test]
    async fn exhausted_deadline_times_out_without_calling() {
        let deadline = Instant::now();
        let fetched = fetch_bounded::<f64, _, _>(
            None,
            "k",
            Duration::from_secs(1),
            deadline,
            || async { Ok(1.0) },
        )
        .await;
        assert!(matches!(fetched, Fetched::TimedOut));
    }
}
