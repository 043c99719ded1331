//! ADV Sources - collaborators the planner fans out to
//!
//! Each capability is a trait so the planner can run with any subset of
//! sources configured, plus one HTTP or in-memory adapter per trait.

pub mod elevation;
pub mod error;
pub mod graphhopper;
pub mod imagery;
pub mod overpass;
pub mod popularity;
pub mod traits;

pub use elevation::OpenMeteoElevation;
pub use error::SourceError;
pub use graphhopper::GraphHopperEngine;
pub use imagery::MapillaryImagery;
pub use overpass::OverpassFeatures;
pub use popularity::{RideTrace, TracePopularity};
pub use traits::{
    ElevationSource, FeatureSource, ImagerySource, PopularitySource, RoutingEngine,
    SurfaceAnnotation,
};
