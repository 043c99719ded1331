//! ADV Planner - orchestration of route planning requests
//!
//! Fans out to the configured sources under one deadline, then runs the
//! deterministic scoring and detour pipeline from `adv-core`.

pub mod cache;
pub mod config;
pub mod detour;
pub mod planner;
pub mod result;

pub use cache::{fingerprint, FingerprintCache, PlannerCache};
pub use config::{Config, ConfigError};
pub use planner::{Planner, PlannerSettings, PlanningBudget, Sources};
pub use result::{
    DetourDiagnostics, Diagnostics, PlanningResult, RouteSummary, SourceKind, SourceReport,
    SourceStatus,
};
