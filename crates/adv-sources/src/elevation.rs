//! Open-Meteo elevation adapter.

use std::time::Duration;

use adv_core::Coordinate;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::SourceError;
use crate::traits::ElevationSource;

pub const DEFAULT_ELEVATION_URL: &str = "https://api.open-meteo.com/v1/elevation";

/// Open-Meteo caps one request at 100 coordinates.
pub const DEFAULT_MAX_POINTS_PER_REQUEST: usize = 100;

pub struct OpenMeteoElevation {
    pub(crate) client: Client,
    pub(crate) provider_url: String,
    pub(crate) max_points_per_request: usize,
    pub(crate) timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoElevationResponse {
    elevation: Option<Vec<f64>>,
}

impl OpenMeteoElevation {
    pub fn new(provider_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            provider_url: provider_url.into(),
            max_points_per_request: DEFAULT_MAX_POINTS_PER_REQUEST,
            timeout,
        }
    }

    pub fn with_max_points(mut self, max_points_per_request: usize) -> Self {
        self.max_points_per_request = max_points_per_request.max(1);
        self
    }

    async fn fetch_chunk(&self, chunk: &[Coordinate]) -> Result<Vec<f64>, SourceError> {
        let latitudes: Vec<f64> = chunk.iter().map(|p| p.lat).collect();
        let longitudes: Vec<f64> = chunk.iter().map(|p| p.lon).collect();
        let url = build_provider_url(
            &self.provider_url,
            &join_params(&latitudes),
            &join_params(&longitudes),
        );

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| SourceError::ElevationUnavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::ElevationUnavailable(format!(
                "elevation provider HTTP {}",
                response.status()
            )));
        }

        let payload: OpenMeteoElevationResponse = response
            .json()
            .await
            .map_err(|err| SourceError::ElevationUnavailable(err.to_string()))?;

        sanitize_chunk(payload.elevation, chunk.len())
    }
}

#[async_trait]
impl ElevationSource for OpenMeteoElevation {
    async fn elevations(&self, points: &[Coordinate]) -> Result<Vec<f64>, SourceError> {
        if self.provider_url.trim().is_empty() {
            return Err(SourceError::ElevationUnavailable(
                "elevation provider URL is empty".to_string(),
            ));
        }

        let mut elevations = Vec::with_capacity(points.len());
        for chunk in points.chunks(self.max_points_per_request.max(1)) {
            elevations.extend(self.fetch_chunk(chunk).await?);
        }

        tracing::debug!("Fetched {} elevation samples", elevations.len());
        Ok(elevations)
    }
}

/// Non-finite samples become NaN so scoring treats them as missing.
fn sanitize_chunk(elevation: Option<Vec<f64>>, expected: usize) -> Result<Vec<f64>, SourceError> {
    let chunk = elevation.ok_or_else(|| {
        SourceError::ElevationUnavailable("elevation provider missing elevation".to_string())
    })?;

    if chunk.len() != expected {
        return Err(SourceError::ElevationUnavailable(format!(
            "elevation provider returned {} samples for {} points",
            chunk.len(),
            expected
        )));
    }

    Ok(chunk
        .into_iter()
        .map(|value| if value.is_finite() { value } else { f64::NAN })
        .collect())
}

fn join_params(values: &[f64]) -> String {
    let mut buf = String::new();
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            buf.push(',');
        }
        buf.push_str(&format!("{:.6}", value));
    }
    buf
}

fn build_provider_url(base: &str, latitudes: &str, longitudes: &str) -> String {
    let separator = if base.contains('?') { "&" } else { "?" };
    format!(
        "{}{}latitude={}&longitude={}",
        base, separator, latitudes, longitudes
    )
}
