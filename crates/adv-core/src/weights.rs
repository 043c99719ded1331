//! Tunable scoring constants for segment composites.

use serde::{Deserialize, Serialize};

use crate::osm::{TagWeights, NEUTRAL_SCORE};

/// Weights and saturation points for the composite scores.
///
/// Every field has a default; a JSON override only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Dirt composite: weight of the OSM / imagery surface score
    pub dirt_surface: f64,
    /// Dirt composite: weight of normalised absolute grade
    pub dirt_grade: f64,
    /// Dirt composite: weight of curvature
    pub dirt_curvature: f64,

    /// Scenic composite: weight of the land cover score
    pub scenic_environment: f64,
    /// Scenic composite: weight of normalised elevation spread
    pub scenic_elevation_variance: f64,
    /// Scenic composite: weight of viewpoint proximity
    pub scenic_poi: f64,

    pub risk_grade: f64,
    pub risk_curvature: f64,
    pub risk_surface: f64,
    /// Added to risk once per access flag
    pub risk_access_bump: f64,
    /// Added to risk for seasonal roads
    pub risk_seasonal_bump: f64,

    /// Per-tag weights of the dirt-likelihood lookup
    pub tags: TagWeights,

    /// Absolute grade (ratio) that maps to 1.0
    pub grade_saturation: f64,
    /// Turning density in degrees per km that maps to curvature 1.0
    pub curvature_saturation_deg_per_km: f64,
    /// Elevation standard deviation in meters that maps to 1.0
    pub elevation_std_saturation_m: f64,

    /// Max distance from a segment midpoint to the way it is matched to
    pub way_match_radius_m: f64,
    /// Land cover within this distance of a segment midpoint counts
    pub environment_radius_m: f64,
    /// Viewpoints within this distance raise poi proximity
    pub poi_radius_m: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            dirt_surface: 0.7,
            dirt_grade: 0.15,
            dirt_curvature: 0.15,
            scenic_environment: 0.5,
            scenic_elevation_variance: 0.25,
            scenic_poi: 0.25,
            risk_grade: 0.45,
            risk_curvature: 0.25,
            risk_surface: 0.3,
            risk_access_bump: 0.05,
            risk_seasonal_bump: 0.05,
            tags: TagWeights::default(),
            grade_saturation: 0.15,
            curvature_saturation_deg_per_km: 360.0,
            elevation_std_saturation_m: 50.0,
            way_match_radius_m: 30.0,
            environment_radius_m: 300.0,
            poi_radius_m: 1_000.0,
        }
    }
}

/// Normalised inputs to the composite formulas, all in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeInputs {
    pub surface: f64,
    pub grade: f64,
    pub curvature: f64,
    pub environment: f64,
    pub elevation_variance: f64,
    pub poi: f64,
    pub access_flags: usize,
    pub seasonal: bool,
}

impl CompositeInputs {
    /// Inputs when no source contributed; only geometry-derived curvature is known.
    pub fn neutral(curvature: f64) -> Self {
        Self {
            surface: NEUTRAL_SCORE,
            grade: 0.0,
            curvature,
            environment: NEUTRAL_SCORE,
            elevation_variance: 0.0,
            poi: 0.0,
            access_flags: 0,
            seasonal: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeScores {
    pub dirt: f64,
    pub scenic: f64,
    pub risk: f64,
}

impl ScoringWeights {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn composite(&self, inputs: &CompositeInputs) -> CompositeScores {
        let dirt = self.dirt_surface * inputs.surface
            + self.dirt_grade * inputs.grade
            + self.dirt_curvature * inputs.curvature;
        let scenic = self.scenic_environment * inputs.environment
            + self.scenic_elevation_variance * inputs.elevation_variance
            + self.scenic_poi * inputs.poi;
        let mut risk = self.risk_grade * inputs.grade
            + self.risk_curvature * inputs.curvature
            + self.risk_surface * inputs.surface
            + self.risk_access_bump * inputs.access_flags as f64;
        if inputs.seasonal {
            risk += self.risk_seasonal_bump;
        }
        CompositeScores {
            dirt: clip01(dirt),
            scenic: clip01(scenic),
            risk: clip01(risk),
        }
    }

    /// Composite output when every source is absent.
    pub fn neutral_composite(&self, curvature: f64) -> CompositeScores {
        self.composite(&CompositeInputs::neutral(curvature))
    }

    pub fn normalise_grade(&self, grade: f64) -> f64 {
        clip01(grade.abs() / self.grade_saturation.max(f64::EPSILON))
    }

    pub fn normalise_curvature(&self, deg_per_km: f64) -> f64 {
        clip01(deg_per_km / self.curvature_saturation_deg_per_km.max(f64::EPSILON))
    }

    pub fn normalise_elevation_std(&self, std_m: f64) -> f64 {
        clip01(std_m / self.elevation_std_saturation_m.max(f64::EPSILON))
    }
}

pub(crate) fn clip01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
