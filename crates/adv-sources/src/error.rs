use thiserror::Error;

/// Source failures. The planner turns every variant except `RoutingEngine`
/// into a neutral signal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("Routing engine failed: {0}")]
    RoutingEngine(String),

    #[error("Elevation unavailable: {0}")]
    ElevationUnavailable(String),

    #[error("Feature source timed out")]
    FeatureSourceTimeout,

    #[error("Feature source failed: {0}")]
    FeatureSource(String),

    #[error("Imagery unavailable: {0}")]
    ImageryUnavailable(String),

    #[error("Popularity unavailable: {0}")]
    PopularityUnavailable(String),
}
