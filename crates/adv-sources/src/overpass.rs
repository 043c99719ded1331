//! Overpass API adapter for tagged OSM records.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use adv_core::{Coordinate, FeatureKind, FeatureQuery, FeatureRecord, QueryArea, TagFilter};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::time::sleep;

use crate::error::SourceError;
use crate::traits::FeatureSource;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

pub struct OverpassFeatures {
    pub(crate) client: Client,
    pub(crate) url: String,
    pub(crate) timeout: Duration,
    pub(crate) retries: u32,
    pub(crate) retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
    remark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassPoint>,
    geometry: Option<Vec<OverpassPoint>>,
    tags: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct OverpassPoint {
    lat: f64,
    lon: f64,
}

impl OverpassFeatures {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            timeout,
            retries: 2,
            retry_backoff_ms: 500,
        }
    }

    pub fn with_retries(mut self, retries: u32, retry_backoff_ms: u64) -> Self {
        self.retries = retries;
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    async fn attempt(&self, query: &str) -> Result<OverpassResponse, SourceError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "text/plain")
            .timeout(self.timeout)
            .body(query.to_string())
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    SourceError::FeatureSourceTimeout
                } else {
                    SourceError::FeatureSource(err.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::GATEWAY_TIMEOUT {
            return Err(SourceError::FeatureSourceTimeout);
        }
        if !status.is_success() {
            return Err(SourceError::FeatureSource(format!("OSM provider HTTP {}", status)));
        }

        let payload: OverpassResponse = response
            .json()
            .await
            .map_err(|err| SourceError::FeatureSource(err.to_string()))?;

        if let Some(remark) = &payload.remark {
            if remark.contains("timed out") {
                return Err(SourceError::FeatureSourceTimeout);
            }
            tracing::warn!("Overpass remark: {}", remark);
        }
        Ok(payload)
    }
}

#[async_trait]
impl FeatureSource for OverpassFeatures {
    async fn features(&self, query: &FeatureQuery) -> Result<Vec<FeatureRecord>, SourceError> {
        let ql = build_query(query, self.timeout.as_secs().max(5));
        let max_attempts = self.retries.saturating_add(1);
        let backoff_base_ms = self.retry_backoff_ms.max(1);
        let mut last_err: Option<SourceError> = None;

        for attempt in 0..max_attempts {
            match self.attempt(&ql).await {
                Ok(payload) => {
                    let records = to_records(payload.elements);
                    tracing::debug!(
                        "Overpass returned {} records after {} attempt(s)",
                        records.len(),
                        attempt + 1
                    );
                    return Ok(records);
                }
                Err(err) => {
                    tracing::warn!("Overpass attempt {} failed: {}", attempt + 1, err);
                    last_err = Some(err);
                }
            }

            if attempt + 1 < max_attempts {
                let delay_ms = backoff_base_ms.saturating_mul(u64::from(attempt) + 1);
                sleep(Duration::from_millis(delay_ms)).await;
            }
        }

        Err(last_err.unwrap_or_else(|| SourceError::FeatureSource("OSM request failed".to_string())))
    }
}

/// Overpass QL for a feature query, returning full way geometry.
pub(crate) fn build_query(query: &FeatureQuery, timeout_s: u64) -> String {
    let area = match &query.area {
        QueryArea::BoundingBox(bbox) => format!(
            "{:.6},{:.6},{:.6},{:.6}",
            bbox.min_lat, bbox.min_lon, bbox.max_lat, bbox.max_lon
        ),
        QueryArea::Around { center, radius_m } => {
            format!("around:{:.0},{:.6},{:.6}", radius_m, center.lat, center.lon)
        }
    };

    let mut ql = format!("[out:json][timeout:{}];\n(\n", timeout_s);
    for selector in &query.selectors {
        let element = match selector.kind {
            FeatureKind::Node => "node",
            FeatureKind::Way => "way",
        };
        ql.push_str("  ");
        ql.push_str(element);
        for filter in &selector.filters {
            ql.push_str(&filter_clause(filter));
        }
        ql.push_str(&format!("({});\n", area));
    }
    ql.push_str(");\nout geom;");
    ql
}

fn filter_clause(filter: &TagFilter) -> String {
    match filter.values.as_slice() {
        [] => format!("[\"{}\"]", filter.key),
        [single] => format!("[\"{}\"=\"{}\"]", filter.key, single),
        values => format!("[\"{}\"~\"^({})$\"]", filter.key, values.join("|")),
    }
}

fn to_records(elements: Vec<OverpassElement>) -> Vec<FeatureRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(elements.len());

    for element in elements {
        let kind = match element.kind.as_str() {
            "node" => FeatureKind::Node,
            "way" => FeatureKind::Way,
            _ => continue,
        };
        if !seen.insert((element.kind.clone(), element.id)) {
            continue;
        }

        let geometry: Vec<Coordinate> = match (&element.geometry, element.lat, element.lon) {
            (Some(points), _, _) if !points.is_empty() => points
                .iter()
                .map(|p| Coordinate::new(p.lat, p.lon))
                .collect(),
            (_, Some(lat), Some(lon)) => vec![Coordinate::new(lat, lon)],
            _ => element
                .center
                .as_ref()
                .map(|c| vec![Coordinate::new(c.lat, c.lon)])
                .unwrap_or_default(),
        };
        if geometry.is_empty() || geometry.iter().any(|p| !p.is_valid()) {
            continue;
        }

        records.push(FeatureRecord {
            id: element.id,
            kind,
            tags: element.tags.unwrap_or_default(),
            geometry,
        });
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use adv_core::BoundingBox;
    use serde_json::json;

    #[test]
    fn discovery_query_uses_around_filter() {
        let query = FeatureQuery::detour_discovery(Coordinate::new(47.5, 8.25), 5_000.0);
        let ql = build_query(&query, 25);
        assert!(ql.starts_with("[out:json][timeout:25];"));
        assert!(ql.contains("(around:5000,47.500000,8.250000)"));
        assert!(ql.contains("node[\"tourism\"=\"viewpoint\"]"));
        assert!(ql.contains("[\"highway\"~\"^(track|path|unclassified|tertiary)$\"]"));
        assert!(ql.ends_with("out geom;"));
    }

    #[test]
    fn corridor_query_uses_bbox() {
        let bbox = BoundingBox {
            min_lat: 47.0,
            min_lon: 8.0,
            max_lat: 47.1,
            max_lon: 8.1,
        };
        let ql = build_query(&FeatureQuery::corridor(bbox), 30);
        assert!(ql.contains("way[\"highway\"](47.000000,8.000000,47.100000,8.100000);"));
    }

    #[test]
    fn elements_map_to_records() {
        let payload: OverpassResponse = serde_json::from_value(json!({
            "elements": [
                {
                    "type": "way", "id": 7,
                    "geometry": [{"lat": 47.0, "lon": 8.0}, {"lat": 47.001, "lon": 8.001}],
                    "tags": {"highway": "track", "surface": "gravel"}
                },
                { "type": "way", "id": 7, "geometry": [{"lat": 47.0, "lon": 8.0}] },
                { "type": "node", "id": 9, "lat": 47.2, "lon": 8.2, "tags": {"tourism": "viewpoint"} },
                { "type": "relation", "id": 11 }
            ]
        }))
        .unwrap();

        let records = to_records(payload.elements);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].geometry.len(), 2);
        assert_eq!(records[0].tag("surface"), Some("gravel"));
        assert_eq!(records[1].kind, FeatureKind::Node);
    }
}
