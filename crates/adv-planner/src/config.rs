//! Planner configuration from environment.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use adv_core::{DetourConstraints, ScoringWeights};
use adv_sources::{
    elevation::DEFAULT_ELEVATION_URL, overpass::DEFAULT_OVERPASS_URL, GraphHopperEngine,
    MapillaryImagery, OpenMeteoElevation, OverpassFeatures, TracePopularity,
};
use thiserror::Error;

use crate::planner::{PlannerSettings, PlanningBudget, Sources};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid scoring weights in {path}: {source}")]
    Weights {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub engine_url: Option<String>,
    pub engine_profile: String,
    pub engine_api_key: Option<String>,
    pub elevation_url: Option<String>,
    pub overpass_url: Option<String>,
    pub overpass_retries: u32,
    pub overpass_retry_backoff_ms: u64,
    pub mapillary_token: Option<String>,
    pub traces_path: Option<PathBuf>,
    pub weights_path: Option<PathBuf>,

    pub deadline_ms: u64,
    pub routing_timeout_ms: u64,
    pub elevation_timeout_ms: u64,
    pub features_timeout_ms: u64,
    pub imagery_timeout_ms: u64,
    pub popularity_timeout_ms: u64,
    pub discovery_timeout_ms: u64,

    pub segment_length_m: f64,
    pub corridor_tile_m: f64,
    pub anchor_spacing_m: f64,
    pub max_concurrent_requests: usize,

    pub cache_enabled: bool,
    pub cache_ttl_s: u64,
    pub cache_max_entries: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            engine_url: optional("ADV_ENGINE_URL"),
            engine_profile: env::var("ADV_ENGINE_PROFILE").unwrap_or_else(|_| "car".to_string()),
            engine_api_key: optional("ADV_ENGINE_API_KEY"),
            elevation_url: optional_or_default("ADV_ELEVATION_URL", DEFAULT_ELEVATION_URL),
            overpass_url: optional_or_default("ADV_OVERPASS_URL", DEFAULT_OVERPASS_URL),
            overpass_retries: parsed("ADV_OVERPASS_RETRIES", 2),
            overpass_retry_backoff_ms: parsed("ADV_OVERPASS_RETRY_BACKOFF_MS", 500),
            mapillary_token: optional("ADV_MAPILLARY_TOKEN"),
            traces_path: optional("ADV_TRACES_FILE").map(PathBuf::from),
            weights_path: optional("ADV_WEIGHTS_FILE").map(PathBuf::from),

            deadline_ms: parsed("ADV_DEADLINE_MS", 15_000),
            routing_timeout_ms: parsed("ADV_ROUTING_TIMEOUT_MS", 8_000),
            elevation_timeout_ms: parsed("ADV_ELEVATION_TIMEOUT_MS", 4_000),
            features_timeout_ms: parsed("ADV_FEATURES_TIMEOUT_MS", 6_000),
            imagery_timeout_ms: parsed("ADV_IMAGERY_TIMEOUT_MS", 3_000),
            popularity_timeout_ms: parsed("ADV_POPULARITY_TIMEOUT_MS", 2_000),
            discovery_timeout_ms: parsed("ADV_DISCOVERY_TIMEOUT_MS", 4_000),

            segment_length_m: parsed("ADV_SEGMENT_LENGTH_M", adv_core::features::DEFAULT_SEGMENT_LENGTH_M),
            corridor_tile_m: parsed("ADV_CORRIDOR_TILE_M", 25_000.0),
            anchor_spacing_m: parsed("ADV_ANCHOR_SPACING_M", DetourConstraints::default().anchor_spacing_m),
            max_concurrent_requests: parsed("ADV_MAX_CONCURRENT_REQUESTS", 8),

            cache_enabled: parsed("ADV_CACHE_ENABLED", true),
            cache_ttl_s: parsed("ADV_CACHE_TTL_S", 900),
            cache_max_entries: parsed("ADV_CACHE_MAX_ENTRIES", 512),
        }
    }

    pub fn budget(&self) -> PlanningBudget {
        PlanningBudget {
            deadline: Duration::from_millis(self.deadline_ms),
            routing: Duration::from_millis(self.routing_timeout_ms),
            elevation: Duration::from_millis(self.elevation_timeout_ms),
            features: Duration::from_millis(self.features_timeout_ms),
            imagery: Duration::from_millis(self.imagery_timeout_ms),
            popularity: Duration::from_millis(self.popularity_timeout_ms),
            discovery: Duration::from_millis(self.discovery_timeout_ms),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_s.max(1))
    }

    /// Scoring weights from the configured file, or the defaults.
    pub fn load_weights(&self) -> Result<ScoringWeights, ConfigError> {
        match &self.weights_path {
            Some(path) => {
                let raw = read(path)?;
                ScoringWeights::from_json(&raw).map_err(|source| ConfigError::Weights {
                    path: path.clone(),
                    source,
                })
            }
            None => Ok(ScoringWeights::default()),
        }
    }

    pub fn settings(&self) -> Result<PlannerSettings, ConfigError> {
        let constraints = DetourConstraints {
            anchor_spacing_m: self.anchor_spacing_m,
            ..DetourConstraints::default()
        };
        Ok(PlannerSettings {
            segment_length_m: self.segment_length_m,
            corridor_tile_m: self.corridor_tile_m,
            max_concurrent_requests: self.max_concurrent_requests.max(1),
            weights: self.load_weights()?,
            constraints,
        })
    }

    /// Adapters for every source whose configuration is present. A trace
    /// file that fails to load leaves popularity unconfigured.
    pub fn sources(&self) -> Sources {
        let mut sources = Sources::default();

        if let Some(url) = &self.engine_url {
            let mut engine = GraphHopperEngine::new(
                url.clone(),
                self.engine_profile.clone(),
                Duration::from_millis(self.routing_timeout_ms),
            );
            if let Some(key) = &self.engine_api_key {
                engine = engine.with_api_key(key.clone());
            }
            sources.engine = Some(Arc::new(engine));
        }
        if let Some(url) = &self.elevation_url {
            sources.elevation = Some(Arc::new(OpenMeteoElevation::new(
                url.clone(),
                Duration::from_millis(self.elevation_timeout_ms),
            )));
        }
        if let Some(url) = &self.overpass_url {
            sources.features = Some(Arc::new(
                OverpassFeatures::new(url.clone(), Duration::from_millis(self.features_timeout_ms))
                    .with_retries(self.overpass_retries, self.overpass_retry_backoff_ms),
            ));
        }
        if let Some(token) = &self.mapillary_token {
            sources.imagery = Some(Arc::new(MapillaryImagery::new(
                token.clone(),
                Duration::from_millis(self.imagery_timeout_ms),
            )));
        }
        if let Some(path) = &self.traces_path {
            match TracePopularity::load(path) {
                Ok(store) => sources.popularity = Some(Arc::new(store)),
                Err(err) => tracing::warn!("Popularity disabled: {}", err),
            }
        }

        sources
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Unset or blank variables are treated as absent.
fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// `off` or `none` disables a source that has a public default.
fn optional_or_default(key: &str, default: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if matches!(value.trim(), "off" | "none" | "") => None,
        Ok(value) => Some(value),
        Err(_) => Some(default.to_string()),
    }
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_mirrors_timeouts() {
        let mut config = Config::from_env();
        config.deadline_ms = 1_000;
        config.imagery_timeout_ms = 250;
        let budget = config.budget();
        assert_eq!(budget.deadline, Duration::from_millis(1_000));
        assert_eq!(budget.imagery, Duration::from_millis(250));
    }

    #[test]
    fn missing_weights_file_is_an_error() {
        let mut config = Config::from_env();
        config.weights_path = Some(PathBuf::from("/nonexistent/adv-weights.json"));
        assert!(matches!(config.load_weights(), Err(ConfigError::Io { .. })));

        config.weights_path = None;
        assert_eq!(config.load_weights().unwrap(), ScoringWeights::default());
    }

    #[test]
    fn unconfigured_engine_is_absent() {
        let mut config = Config::from_env();
        config.engine_url = None;
        config.mapillary_token = None;
        config.traces_path = None;
        let sources = config.sources();
        assert!(sources.engine.is_none());
        assert!(sources.imagery.is_none());
        assert!(sources.popularity.is_none());
    }
}
