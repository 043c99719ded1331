use thiserror::Error;

/// Failures that abort a planning request.
///
/// Source outages never show up here; they degrade confidence instead and are
/// reported through diagnostics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("At least two distinct waypoints are required, got {0}")]
    InsufficientWaypoints(usize),

    #[error("Invalid coordinate at index {index}: ({lat}, {lon})")]
    InvalidCoordinate { index: usize, lat: f64, lon: f64 },

    #[error("Unknown routing preset: {0}")]
    UnknownPreset(String),

    #[error("Detour ranges overlap: {first} and {second}")]
    DetourSpliceConflict { first: String, second: String },

    #[error("Baseline route unavailable: {0}")]
    BaselineRouteUnavailable(String),
}

impl PlanError {
    /// Logic defects, as opposed to bad input or upstream outages.
    pub fn is_internal(&self) -> bool {
        matches!(self, PlanError::DetourSpliceConflict { .. })
    }

    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            PlanError::InsufficientWaypoints(_)
                | PlanError::InvalidCoordinate { .. }
                | PlanError::UnknownPreset(_)
        )
    }
}
