//! GraphHopper routing engine adapter.

use std::collections::BTreeMap;
use std::time::Duration;

use adv_core::{BaselineRoute, Coordinate, EngineModel, RouteGeometry};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SourceError;
use crate::traits::RoutingEngine;

/// Path details whose segment starts become way boundaries.
const WAY_DETAILS: [&str; 2] = ["road_class", "surface"];

pub struct GraphHopperEngine {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) profile: String,
    pub(crate) api_key: Option<String>,
    pub(crate) timeout: Duration,
}

#[derive(Debug, Serialize)]
struct RouteRequest<'a> {
    /// `[lon, lat]` pairs
    points: Vec<[f64; 2]>,
    profile: &'a str,
    points_encoded: bool,
    elevation: bool,
    instructions: bool,
    details: Vec<&'static str>,
    custom_model: &'a EngineModel,
    #[serde(rename = "ch.disable")]
    ch_disable: bool,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    paths: Vec<RoutePath>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoutePath {
    distance: f64,
    /// Milliseconds
    time: f64,
    points: PathPoints,
    #[serde(default)]
    details: BTreeMap<String, Vec<(usize, usize, Value)>>,
}

#[derive(Debug, Deserialize)]
struct PathPoints {
    /// `[lon, lat]` or `[lon, lat, ele]`
    coordinates: Vec<Vec<f64>>,
}

impl GraphHopperEngine {
    pub fn new(base_url: impl Into<String>, profile: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            profile: profile.into(),
            api_key: None,
            timeout,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn route_url(&self) -> String {
        match &self.api_key {
            Some(key) => format!("{}/route?key={}", self.base_url, key),
            None => format!("{}/route", self.base_url),
        }
    }
}

#[async_trait]
impl RoutingEngine for GraphHopperEngine {
    async fn route(
        &self,
        waypoints: &[Coordinate],
        model: &EngineModel,
    ) -> Result<BaselineRoute, SourceError> {
        let request = RouteRequest {
            points: waypoints.iter().map(|p| [p.lon, p.lat]).collect(),
            profile: &self.profile,
            points_encoded: false,
            elevation: true,
            instructions: false,
            details: WAY_DETAILS.to_vec(),
            custom_model: model,
            ch_disable: true,
        };

        tracing::debug!(
            "Calling GraphHopper with {} waypoints, {} priority rules",
            waypoints.len(),
            model.priority.len()
        );

        let response = self
            .client
            .post(self.route_url())
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|err| SourceError::RoutingEngine(err.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|err| SourceError::RoutingEngine(format!("read failed: {}", err)))?;

        if !status.is_success() {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("no message");
            return Err(SourceError::RoutingEngine(format!(
                "HTTP {}: {}",
                status, message
            )));
        }

        parse_route(payload)
    }
}

/// Turn a `/route` response body into a baseline route.
pub(crate) fn parse_route(payload: Value) -> Result<BaselineRoute, SourceError> {
    let response: RouteResponse = serde_json::from_value(payload)
        .map_err(|err| SourceError::RoutingEngine(format!("unexpected response: {}", err)))?;

    let path = match response.paths.into_iter().next() {
        Some(path) => path,
        None => {
            return Err(SourceError::RoutingEngine(
                response
                    .message
                    .unwrap_or_else(|| "response contains no path".to_string()),
            ))
        }
    };

    let mut points = Vec::with_capacity(path.points.coordinates.len());
    for raw in &path.points.coordinates {
        let point = match raw.as_slice() {
            [lon, lat] => Coordinate::new(*lat, *lon),
            [lon, lat, ele, ..] if ele.is_finite() => Coordinate::new(*lat, *lon).with_elevation(*ele),
            [lon, lat, ..] => Coordinate::new(*lat, *lon),
            _ => {
                return Err(SourceError::RoutingEngine(
                    "coordinate with fewer than two values".to_string(),
                ))
            }
        };
        points.push(point);
    }

    let mut breaks: Vec<usize> = path
        .details
        .iter()
        .filter(|(name, _)| WAY_DETAILS.contains(&name.as_str()))
        .flat_map(|(_, intervals)| intervals.iter().map(|(from, _, _)| *from))
        .collect();
    breaks.sort_unstable();
    breaks.dedup();

    let (geometry, way_boundaries) = RouteGeometry::with_breaks(points, &breaks)
        .map_err(|err| SourceError::RoutingEngine(err.to_string()))?;

    let mut route = BaselineRoute::new(geometry, path.distance, path.time / 1000.0);
    route.way_boundaries = way_boundaries;
    Ok(route)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_path_with_details_into_boundaries() {
        let payload = json!({
            "paths": [{
                "distance": 1234.5,
                "time": 90000,
                "points": {
                    "coordinates": [
                        [8.00, 47.00, 400.0],
                        [8.01, 47.00, 410.0],
                        [8.01, 47.00, 410.0],
                        [8.02, 47.01, 420.0],
                        [8.03, 47.01, 430.0]
                    ]
                },
                "details": {
                    "road_class": [[0, 2, "secondary"], [2, 4, "track"]],
                    "surface": [[0, 3, "asphalt"], [3, 4, "gravel"]]
                }
            }]
        });

        let route = parse_route(payload).unwrap();
        assert_eq!(route.geometry.len(), 4);
        assert_eq!(route.distance_m, 1234.5);
        assert_eq!(route.duration_s, 90.0);
        assert_eq!(route.geometry.first().elevation_m, Some(400.0));
        // Raw index 2 collapses onto 1, raw 3 onto 2.
        assert_eq!(route.way_boundaries, vec![1, 2]);
    }

    #[test]
    fn empty_paths_report_engine_message() {
        let payload = json!({ "paths": [], "message": "Cannot find point 0" });
        let err = parse_route(payload).unwrap_err();
        assert_eq!(err, SourceError::RoutingEngine("Cannot find point 0".to_string()));
    }

    #[test]
    fn request_carries_custom_model_and_disables_ch() {
        let model = EngineModel {
            priority: Vec::new(),
            distance_influence: 70.0,
        };
        let request = RouteRequest {
            points: vec![[8.0, 47.0]],
            profile: "car",
            points_encoded: false,
            elevation: true,
            instructions: false,
            details: WAY_DETAILS.to_vec(),
            custom_model: &model,
            ch_disable: true,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["ch.disable"], json!(true));
        assert_eq!(body["custom_model"]["distance_influence"], json!(70.0));
        assert_eq!(body["points_encoded"], json!(false));
    }
}
