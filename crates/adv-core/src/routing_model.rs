//! Routing Model Builder: maps rider presets to the routing engine's weight
//! model. Pure, no I/O.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::models::{PlanningPreferences, SurfacePreference, TechnicalDifficulty};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Preset {
    Easy,
    Mixed,
    Tech,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Easy, Preset::Mixed, Preset::Tech];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Easy => "EASY",
            Preset::Mixed => "MIXED",
            Preset::Tech => "TECH",
        }
    }

    /// How faithfully the engine's priority rules can express the preset.
    /// Technical-surface preference is the hardest to encode.
    pub fn model_confidence(&self) -> f64 {
        match self {
            Preset::Easy => 0.8,
            Preset::Mixed => 0.7,
            Preset::Tech => 0.6,
        }
    }

    fn description(&self) -> &'static str {
        match self {
            Preset::Easy => "Conservative ADV routing with smoother surfaces and lower risk",
            Preset::Mixed => "Balanced ADV routing mixing pavement and dirt with moderate challenge",
            Preset::Tech => "Aggressive ADV routing favoring technical terrain and off-pavement",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = PlanError;

    /// Accepts `EASY`, `mixed`, `ADV_TECH` and similar spellings.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_uppercase();
        let name = normalized.strip_prefix("ADV_").unwrap_or(&normalized);
        match name {
            "EASY" => Ok(Preset::Easy),
            "MIXED" => Ok(Preset::Mixed),
            "TECH" => Ok(Preset::Tech),
            _ => Err(PlanError::UnknownPreset(raw.to_string())),
        }
    }
}

/// Road classes as the engine names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadClass {
    Motorway,
    Trunk,
    Primary,
    Secondary,
    Tertiary,
    Residential,
    Unclassified,
    Service,
    Track,
}

impl RoadClass {
    fn engine_name(&self) -> &'static str {
        match self {
            RoadClass::Motorway => "MOTORWAY",
            RoadClass::Trunk => "TRUNK",
            RoadClass::Primary => "PRIMARY",
            RoadClass::Secondary => "SECONDARY",
            RoadClass::Tertiary => "TERTIARY",
            RoadClass::Residential => "RESIDENTIAL",
            RoadClass::Unclassified => "UNCLASSIFIED",
            RoadClass::Service => "SERVICE",
            RoadClass::Track => "TRACK",
        }
    }
}

/// Surface groups; each expands to several engine surface values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceCategory {
    Paved,
    Compacted,
    Gravel,
    Dirt,
    Sand,
}

impl SurfaceCategory {
    fn engine_values(&self) -> &'static [&'static str] {
        match self {
            SurfaceCategory::Paved => &["ASPHALT", "CONCRETE", "PAVED"],
            SurfaceCategory::Compacted => &["COMPACTED", "FINE_GRAVEL"],
            SurfaceCategory::Gravel => &["GRAVEL", "UNPAVED"],
            SurfaceCategory::Dirt => &["DIRT", "GROUND", "GRASS"],
            SurfaceCategory::Sand => &["SAND"],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvoidFlags {
    pub ferries: bool,
    pub highways: bool,
    pub tolls: bool,
    pub fords: bool,
}

/// Rider objective weights carried with the model for detour scoring and
/// explanation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreferenceWeights {
    pub dirt: f64,
    pub scenic: f64,
    /// Negative values mean risk is avoided
    pub risk: f64,
    pub popularity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingModel {
    pub preset: Preset,
    /// Priority multiplier per road class; 1.0 is neutral
    pub road_class_weights: BTreeMap<RoadClass, f64>,
    pub surface_weights: BTreeMap<SurfaceCategory, f64>,
    pub avoid: AvoidFlags,
    pub preference: PreferenceWeights,
    pub avoid_steep_over_pct: f64,
    pub off_pavement_target_pct: f64,
    pub distance_influence: f64,
    pub model_confidence: f64,
}

/// One `if` statement of the engine's custom model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityRule {
    #[serde(rename = "if")]
    pub condition: String,
    pub multiply_by: String,
}

/// The routing engine's custom model document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineModel {
    pub priority: Vec<PriorityRule>,
    pub distance_influence: f64,
}

/// Canonical model for a preset.
pub fn build(preset: Preset) -> RoutingModel {
    use RoadClass::*;
    use SurfaceCategory as S;

    let (roads, surfaces, avoid, preference, steep, off_pavement, distance_influence) =
        match preset {
            Preset::Easy => (
                [
                    (Motorway, 0.1),
                    (Trunk, 0.5),
                    (Primary, 0.8),
                    (Secondary, 1.0),
                    (Tertiary, 1.0),
                    (Residential, 0.8),
                    (Unclassified, 0.9),
                    (Service, 0.5),
                    (Track, 0.3),
                ],
                [
                    (S::Paved, 1.0),
                    (S::Compacted, 0.8),
                    (S::Gravel, 0.6),
                    (S::Dirt, 0.3),
                    (S::Sand, 0.1),
                ],
                AvoidFlags {
                    ferries: true,
                    highways: true,
                    tolls: true,
                    fords: true,
                },
                PreferenceWeights {
                    dirt: 0.3,
                    scenic: 0.4,
                    risk: -0.5,
                    popularity: 0.3,
                },
                10.0,
                30.0,
                70.0,
            ),
            Preset::Mixed => (
                [
                    (Motorway, 0.2),
                    (Trunk, 0.4),
                    (Primary, 0.6),
                    (Secondary, 0.9),
                    (Tertiary, 1.0),
                    (Residential, 0.7),
                    (Unclassified, 1.0),
                    (Service, 0.6),
                    (Track, 0.8),
                ],
                [
                    (S::Paved, 0.8),
                    (S::Compacted, 1.0),
                    (S::Gravel, 1.0),
                    (S::Dirt, 0.7),
                    (S::Sand, 0.3),
                ],
                AvoidFlags {
                    ferries: true,
                    highways: true,
                    ..Default::default()
                },
                PreferenceWeights {
                    dirt: 0.6,
                    scenic: 0.4,
                    risk: -0.2,
                    popularity: 0.2,
                },
                14.0,
                60.0,
                50.0,
            ),
            Preset::Tech => (
                [
                    (Motorway, 0.3),
                    (Trunk, 0.4),
                    (Primary, 0.5),
                    (Secondary, 0.7),
                    (Tertiary, 0.9),
                    (Residential, 0.6),
                    (Unclassified, 1.0),
                    (Service, 0.7),
                    (Track, 1.0),
                ],
                [
                    (S::Paved, 0.5),
                    (S::Compacted, 0.9),
                    (S::Gravel, 1.0),
                    (S::Dirt, 1.0),
                    (S::Sand, 0.7),
                ],
                AvoidFlags {
                    ferries: true,
                    ..Default::default()
                },
                PreferenceWeights {
                    dirt: 0.8,
                    scenic: 0.3,
                    risk: 0.1,
                    popularity: 0.1,
                },
                18.0,
                80.0,
                30.0,
            ),
        };

    RoutingModel {
        preset,
        road_class_weights: roads.into_iter().collect(),
        surface_weights: surfaces.into_iter().collect(),
        avoid,
        preference,
        avoid_steep_over_pct: steep,
        off_pavement_target_pct: off_pavement,
        distance_influence,
        model_confidence: preset.model_confidence(),
    }
}

/// Preset implied by the preferences, ignoring any explicit preset name.
pub fn preset_for(preferences: &PlanningPreferences) -> Preset {
    match (preferences.technical_difficulty, preferences.surface) {
        (TechnicalDifficulty::Easy, _) => Preset::Easy,
        (TechnicalDifficulty::Difficult, _) => Preset::Tech,
        (TechnicalDifficulty::Moderate, SurfacePreference::Paved) => Preset::Easy,
        (TechnicalDifficulty::Moderate, SurfacePreference::Dirt) => Preset::Tech,
        (TechnicalDifficulty::Moderate, _) => Preset::Mixed,
    }
}

/// Resolve the preset from preferences and apply avoid overrides.
pub fn build_for(preferences: &PlanningPreferences) -> Result<RoutingModel, PlanError> {
    let preset = match preferences.preset.as_deref() {
        Some(name) => name.parse()?,
        None => preset_for(preferences),
    };
    let mut model = build(preset);
    if preferences.avoid_highways {
        model.avoid.highways = true;
    }
    if preferences.avoid_tolls {
        model.avoid.tolls = true;
    }
    Ok(model)
}

fn factor(value: f64) -> String {
    // 0.30000000000000004 and friends are rounded away
    let rounded = (value * 1000.0).round() / 1000.0;
    rounded.to_string()
}

/// Serialize the model into the engine's custom model shape.
pub fn export(model: &RoutingModel) -> EngineModel {
    let mut priority = Vec::new();
    let mut avoid = |condition: &str| {
        priority.push(PriorityRule {
            condition: condition.to_string(),
            multiply_by: "0".to_string(),
        })
    };
    if model.avoid.ferries {
        avoid("road_environment == FERRY");
    }
    if model.avoid.fords {
        avoid("road_environment == FORD");
    }
    if model.avoid.tolls {
        avoid("toll == ALL");
    }
    if model.avoid.highways {
        avoid("road_class == MOTORWAY");
    }

    for (class, weight) in &model.road_class_weights {
        if *class == RoadClass::Motorway && model.avoid.highways {
            continue;
        }
        if (*weight - 1.0).abs() < f64::EPSILON {
            continue;
        }
        priority.push(PriorityRule {
            condition: format!("road_class == {}", class.engine_name()),
            multiply_by: factor(*weight),
        });
    }

    for (category, weight) in &model.surface_weights {
        if (*weight - 1.0).abs() < f64::EPSILON {
            continue;
        }
        let condition = category
            .engine_values()
            .iter()
            .map(|v| format!("surface == {v}"))
            .collect::<Vec<_>>()
            .join(" || ");
        priority.push(PriorityRule {
            condition,
            multiply_by: factor(*weight),
        });
    }

    EngineModel {
        priority,
        distance_influence: model.distance_influence,
    }
}

/// Human-readable summary of what the model does.
pub fn explain(model: &RoutingModel) -> Vec<String> {
    let mut lines = vec![
        format!("{}: {}", model.preset, model.preset.description()),
        format!("Model confidence {:.2}", model.model_confidence),
    ];

    let avoid = model.avoid;
    for (enabled, text) in [
        (avoid.highways, "Avoiding highways/motorways"),
        (avoid.tolls, "Avoiding toll roads"),
        (avoid.ferries, "Avoiding ferries"),
        (avoid.fords, "Avoiding water crossings"),
    ] {
        if enabled {
            lines.push(text.to_string());
        }
    }

    let pref = model.preference;
    if pref.dirt > 0.6 {
        lines.push(format!("Strong dirt preference ({:.1})", pref.dirt));
    }
    if pref.scenic > 0.5 {
        lines.push(format!("Scenic routing emphasis ({:.1})", pref.scenic));
    }
    if pref.risk < -0.3 {
        lines.push(format!("Risk avoidance ({:.1})", pref.risk));
    }
    lines.push(format!(
        "Targets {:.0}% off-pavement, avoids grades over {:.0}%",
        model.off_pavement_target_pct, model.avoid_steep_over_pct
    ));
    lines
}

impl RoutingModel {
    pub fn export(&self) -> EngineModel {
        export(self)
    }

    pub fn explain(&self) -> Vec<String> {
        explain(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_parse_case_insensitively() {
        assert_eq!("easy".parse::<Preset>().unwrap(), Preset::Easy);
        assert_eq!("ADV_TECH".parse::<Preset>().unwrap(), Preset::Tech);
        assert_eq!(" Mixed ".parse::<Preset>().unwrap(), Preset::Mixed);
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let err = "EXTREME".parse::<Preset>().unwrap_err();
        assert_eq!(err, PlanError::UnknownPreset("EXTREME".into()));
        assert!(err.is_precondition());
    }

    #[test]
    fn model_confidence_is_static_per_preset() {
        assert_eq!(build(Preset::Easy).model_confidence, 0.8);
        assert_eq!(build(Preset::Mixed).model_confidence, 0.7);
        assert_eq!(build(Preset::Tech).model_confidence, 0.6);
    }

    #[test]
    fn tech_prefers_dirt_and_relaxes_highway_penalty() {
        let easy = build(Preset::Easy);
        let tech = build(Preset::Tech);
        assert!(tech.surface_weights[&SurfaceCategory::Dirt] > easy.surface_weights[&SurfaceCategory::Dirt]);
        assert!(tech.road_class_weights[&RoadClass::Motorway] > easy.road_class_weights[&RoadClass::Motorway]);
        assert!(!tech.avoid.highways);
    }

    #[test]
    fn preferences_resolve_preset_and_overrides() {
        let prefs = PlanningPreferences {
            surface: SurfacePreference::Dirt,
            avoid_highways: true,
            ..Default::default()
        };
        let model = build_for(&prefs).unwrap();
        assert_eq!(model.preset, Preset::Tech);
        assert!(model.avoid.highways);

        let prefs = PlanningPreferences {
            preset: Some("nope".into()),
            ..Default::default()
        };
        assert!(matches!(build_for(&prefs), Err(PlanError::UnknownPreset(_))));
    }

    #[test]
    fn export_emits_avoid_rules_first() {
        let engine = export(&build(Preset::Easy));
        let first: Vec<&str> = engine.priority[..4].iter().map(|r| r.condition.as_str()).collect();
        assert_eq!(
            first,
            vec![
                "road_environment == FERRY",
                "road_environment == FORD",
                "toll == ALL",
                "road_class == MOTORWAY"
            ]
        );
        assert!(engine.priority[..4].iter().all(|r| r.multiply_by == "0"));
        // motorway only appears once, as the avoid rule
        let motorway = engine
            .priority
            .iter()
            .filter(|r| r.condition == "road_class == MOTORWAY")
            .count();
        assert_eq!(motorway, 1);
    }

    #[test]
    fn export_serializes_to_custom_model_shape() {
        let engine = export(&build(Preset::Tech));
        let json = serde_json::to_value(&engine).unwrap();
        assert_eq!(json["distance_influence"], 30.0);
        let rule = &json["priority"][0];
        assert_eq!(rule["if"], "road_environment == FERRY");
        assert_eq!(rule["multiply_by"], "0");
        let sand = engine
            .priority
            .iter()
            .find(|r| r.condition == "surface == SAND")
            .unwrap();
        assert_eq!(sand.multiply_by, "0.7");
    }

    #[test]
    fn explain_mentions_avoidances() {
        let lines = explain(&build(Preset::Easy));
        assert!(lines[0].starts_with("EASY"));
        assert!(lines.iter().any(|l| l == "Avoiding toll roads"));
        assert!(lines.iter().any(|l| l.starts_with("Risk avoidance")));
    }
}
