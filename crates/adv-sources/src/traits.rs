//! Capability traits implemented by every source adapter.

use adv_core::{BaselineRoute, Coordinate, EngineModel, FeatureQuery, FeatureRecord, SegmentRef};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

#[async_trait]
pub trait RoutingEngine: Send + Sync {
    /// Route through `waypoints` in order using the exported custom model.
    async fn route(
        &self,
        waypoints: &[Coordinate],
        model: &EngineModel,
    ) -> Result<BaselineRoute, SourceError>;
}

#[async_trait]
pub trait ElevationSource: Send + Sync {
    /// One elevation in meters per input point, same order.
    async fn elevations(&self, points: &[Coordinate]) -> Result<Vec<f64>, SourceError>;
}

#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn features(&self, query: &FeatureQuery) -> Result<Vec<FeatureRecord>, SourceError>;
}

/// Street-level imagery evidence around one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceAnnotation {
    /// Confidence in [0, 1] that the imagery confirms the mapped surface
    pub confidence: f64,
    pub frames: usize,
    pub latest_capture: Option<DateTime<Utc>>,
}

impl SurfaceAnnotation {
    pub fn empty() -> Self {
        Self {
            confidence: 0.0,
            frames: 0,
            latest_capture: None,
        }
    }

    pub fn has_evidence(&self) -> bool {
        self.frames > 0
    }
}

#[async_trait]
pub trait ImagerySource: Send + Sync {
    async fn annotate(&self, point: Coordinate) -> Result<SurfaceAnnotation, SourceError>;
}

#[async_trait]
pub trait PopularitySource: Send + Sync {
    /// Rider popularity of a segment in [0, 1].
    async fn popularity(&self, segment: &SegmentRef) -> Result<f64, SourceError>;
}
