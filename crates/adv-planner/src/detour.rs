//! Detour discovery fan-out and the score / select / splice pipeline.

use std::time::Duration;

use adv_core::{
    score_candidates, select, splice, Anchor, AnchorRecords, BaselineRoute, DetourCandidate,
    DetourConstraints, DetourPhase, FeatureQuery, PlanError, PreferenceWeights, RouteGeometry,
    ScoringContext, ScoringWeights, SegmentFeature,
};
use adv_sources::FeatureSource;
use futures::stream::{self, StreamExt};
use tokio::time::Instant;

use crate::cache::{fingerprint, PlannerCache};
use crate::planner::{fetch_bounded, Tally};
use crate::result::{DetourDiagnostics, SourceKind, SourceReport, SourceStatus};

/// Records per anchor, in anchor order. Failed anchors are left out.
#[derive(Debug, Clone)]
pub struct Discovery {
    pub batches: Vec<AnchorRecords>,
    pub anchors: usize,
    pub failed_anchors: usize,
    pub report: SourceReport,
}

impl Discovery {
    /// No usable discovery ran, or some anchor came back empty-handed.
    pub fn is_degraded(&self) -> bool {
        self.failed_anchors > 0 || self.report.status == SourceStatus::Unconfigured
    }
}

pub struct DetourOutcome {
    pub geometry: RouteGeometry,
    pub accepted: Vec<DetourCandidate>,
    pub diagnostics: DetourDiagnostics,
}

/// Query the feature source around every anchor concurrently. A failed or
/// timed-out anchor contributes no records.
pub async fn discover(
    source: Option<&dyn FeatureSource>,
    cache: Option<&PlannerCache>,
    anchors: &[Anchor],
    radius_m: f64,
    limit: Duration,
    deadline: Instant,
    max_concurrent: usize,
) -> Discovery {
    let started = Instant::now();
    if anchors.is_empty() {
        return Discovery {
            batches: Vec::new(),
            anchors: 0,
            failed_anchors: 0,
            report: SourceReport::new(SourceKind::Discovery, SourceStatus::Skipped),
        };
    }
    let Some(source) = source else {
        return Discovery {
            batches: Vec::new(),
            anchors: anchors.len(),
            failed_anchors: 0,
            report: SourceReport::new(SourceKind::Discovery, SourceStatus::Unconfigured),
        };
    };
    let cache = cache.map(|c| &c.features);

    let outcomes: Vec<_> = stream::iter(anchors.iter().copied())
        .map(|anchor| async move {
            let query = FeatureQuery::detour_discovery(anchor.coordinate, radius_m);
            let key = fingerprint("features", &query);
            let fetched = fetch_bounded(cache, &key, limit, deadline, || source.features(&query)).await;
            (anchor, fetched)
        })
        .buffered(max_concurrent.max(1))
        .collect()
        .await;

    let mut tally = Tally::default();
    let mut batches = Vec::with_capacity(outcomes.len());
    let mut failed_anchors = 0;
    for (anchor, fetched) in outcomes {
        match tally.record(fetched) {
            Some(records) => batches.push(AnchorRecords { anchor, records }),
            None => {
                failed_anchors += 1;
                tracing::warn!("Detour discovery failed for anchor {}", anchor.order);
            }
        }
    }

    Discovery {
        batches,
        anchors: anchors.len(),
        failed_anchors,
        report: tally.into_report(SourceKind::Discovery, started),
    }
}

/// Score, select and splice the discovered records. Gains are weighted by
/// the rider's `preference`.
pub fn optimize(
    discovery: &Discovery,
    baseline: &BaselineRoute,
    features: &[SegmentFeature],
    constraints: &DetourConstraints,
    weights: &ScoringWeights,
    preference: &PreferenceWeights,
) -> Result<DetourOutcome, PlanError> {
    let candidates = score_candidates(
        &discovery.batches,
        &ScoringContext {
            baseline,
            features,
            constraints,
            tag_weights: &weights.tags,
            preference,
        },
    );
    let selection = select(&candidates, constraints);

    let accepted: Vec<DetourCandidate> = selection
        .accepted
        .iter()
        .map(|idx| candidates[*idx].clone())
        .collect();
    let refs: Vec<&DetourCandidate> = accepted.iter().collect();
    let geometry = splice(&baseline.geometry, &refs)?;

    let phase = if discovery.is_degraded() {
        DetourPhase::Degraded
    } else {
        DetourPhase::Done
    };
    tracing::debug!(
        "Detour optimizer finished in {:?}: {} accepted of {} candidates",
        phase,
        accepted.len(),
        candidates.len()
    );

    Ok(DetourOutcome {
        geometry,
        diagnostics: DetourDiagnostics {
            phase,
            anchors: discovery.anchors,
            failed_anchors: discovery.failed_anchors,
            candidates: candidates.len(),
            rejected: selection
                .rejected
                .iter()
                .map(|(idx, reason)| (candidates[*idx].id.clone(), *reason))
                .collect(),
        },
        accepted,
    })
}
