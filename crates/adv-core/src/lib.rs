pub mod detour;
pub mod error;
pub mod features;
pub mod models;
pub mod osm;
pub mod routing_model;
pub mod signal;
pub mod spatial;
pub mod weights;

pub use detour::{
    sample_anchors, score_candidates, select, splice, Anchor, AnchorRecords, DetourCandidate,
    DetourConstraints, DetourPhase, DetourType, RejectReason, ScoringContext, Selection,
    MIN_ANCHOR_SPACING_M,
};
pub use error::PlanError;
pub use features::{extract, segment_route, summarize, FeatureSummary, RouteFlag, RouteSignals};
pub use models::{
    AccessFlag, BaselineRoute, Coordinate, OsmTagSnapshot, PlanningPreferences, RouteGeometry,
    SeasonalityHint, Segment, SegmentFeature, SegmentRef, SourceCoverage, SurfaceClass,
    SurfacePreference, TechnicalDifficulty,
};
pub use osm::{EnvironmentTag, FeatureKind, FeatureQuery, FeatureRecord, QueryArea, TagFilter};
pub use routing_model::{EngineModel, Preset, PreferenceWeights, PriorityRule, RoutingModel};
pub use signal::Signal;
pub use spatial::{haversine_distance, BoundingBox};
pub use weights::ScoringWeights;
