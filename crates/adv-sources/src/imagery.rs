//! Mapillary street-level imagery adapter.

use std::time::Duration;

use adv_core::{BoundingBox, Coordinate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::error::SourceError;
use crate::traits::{ImagerySource, SurfaceAnnotation};

pub const DEFAULT_MAPILLARY_URL: &str = "https://graph.mapillary.com/images";

const SEARCH_RADIUS_M: f64 = 30.0;
const MAX_FRAMES: usize = 50;
/// Frames older than this contribute no recency.
const MAX_IMAGE_AGE_DAYS: i64 = 365 * 3;
const RECENT_SCORE: f64 = 0.8;

pub struct MapillaryImagery {
    pub(crate) client: Client,
    pub(crate) url: String,
    pub(crate) access_token: String,
    pub(crate) timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageFrame>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ImageFrame {
    /// Epoch milliseconds
    pub captured_at: Option<i64>,
    pub compass_angle: Option<f64>,
}

impl ImageFrame {
    fn captured(&self) -> Option<DateTime<Utc>> {
        self.captured_at.and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

impl MapillaryImagery {
    pub fn new(access_token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: DEFAULT_MAPILLARY_URL.to_string(),
            access_token: access_token.into(),
            timeout,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl ImagerySource for MapillaryImagery {
    async fn annotate(&self, point: Coordinate) -> Result<SurfaceAnnotation, SourceError> {
        if self.access_token.trim().is_empty() {
            return Err(SourceError::ImageryUnavailable("missing access token".to_string()));
        }

        let bbox = BoundingBox::around(&point, SEARCH_RADIUS_M);
        let bbox_param = format!(
            "{:.6},{:.6},{:.6},{:.6}",
            bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat
        );
        let limit = MAX_FRAMES.to_string();

        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("bbox", bbox_param.as_str()),
                ("fields", "id,captured_at,compass_angle"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|err| SourceError::ImageryUnavailable(err.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::ImageryUnavailable(format!(
                "imagery provider HTTP {}",
                response.status()
            )));
        }

        let payload: ImagesResponse = response
            .json()
            .await
            .map_err(|err| SourceError::ImageryUnavailable(err.to_string()))?;

        Ok(annotate_frames(&payload.data, Utc::now()))
    }
}

/// Recency in [0, 1]: full for a month, decaying over the first year, then
/// a small tail up to the maximum image age.
pub(crate) fn recency_score(captured: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - captured).num_days().max(0);
    if age_days <= 30 {
        1.0
    } else if age_days <= 365 {
        1.0 - (age_days - 30) as f64 / 335.0
    } else if age_days <= MAX_IMAGE_AGE_DAYS {
        0.3 - (age_days - 365) as f64 / (MAX_IMAGE_AGE_DAYS - 365) as f64 * 0.3
    } else {
        0.0
    }
}

pub(crate) fn frame_confidence(frame: &ImageFrame, now: DateTime<Utc>) -> f64 {
    let recency = frame.captured().map(|c| recency_score(c, now)).unwrap_or(0.0);
    let mut confidence = 0.5 + recency * 0.2;
    // Mapillary frames carry computed geometry.
    confidence += 0.1;
    if frame.compass_angle.is_some() {
        confidence += 0.05;
    }
    confidence.clamp(0.0, 1.0)
}

pub(crate) fn annotate_frames(frames: &[ImageFrame], now: DateTime<Utc>) -> SurfaceAnnotation {
    if frames.is_empty() {
        return SurfaceAnnotation::empty();
    }

    let mean = frames.iter().map(|f| frame_confidence(f, now)).sum::<f64>() / frames.len() as f64;
    let frame_bonus = (frames.len() as f64 * 0.05).min(0.2);
    let recent = frames
        .iter()
        .filter_map(ImageFrame::captured)
        .filter(|c| recency_score(*c, now) > RECENT_SCORE)
        .count();
    let recency_bonus = (recent as f64 * 0.05).min(0.1);

    SurfaceAnnotation {
        confidence: (mean + frame_bonus + recency_bonus).clamp(0.0, 1.0),
        frames: frames.len(),
        latest_capture: frames.iter().filter_map(ImageFrame::captured).max(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn frame(captured: Option<DateTime<Utc>>, heading: bool) -> ImageFrame {
        ImageFrame {
            captured_at: captured.map(|c| c.timestamp_millis()),
            compass_angle: heading.then_some(90.0),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn recency_decays_with_age() {
        let now = now();
        assert_eq!(recency_score(now - chrono::Duration::days(10), now), 1.0);
        let half_year = recency_score(now - chrono::Duration::days(200), now);
        assert!(half_year > 0.4 && half_year < 0.6);
        assert_eq!(recency_score(now - chrono::Duration::days(2000), now), 0.0);
    }

    #[test]
    fn fresh_frame_with_heading_scores_highest() {
        let now = now();
        let fresh = frame_confidence(&frame(Some(now), true), now);
        assert!((fresh - 0.85).abs() < 1e-9);
        let undated = frame_confidence(&frame(None, false), now);
        assert!((undated - 0.6).abs() < 1e-9);
    }

    #[test]
    fn no_frames_means_no_evidence() {
        let annotation = annotate_frames(&[], now());
        assert!(!annotation.has_evidence());
        assert_eq!(annotation.confidence, 0.0);
    }

    #[test]
    fn several_recent_frames_saturate() {
        let now = now();
        let frames: Vec<ImageFrame> = (0..6).map(|_| frame(Some(now), true)).collect();
        let annotation = annotate_frames(&frames, now);
        assert_eq!(annotation.frames, 6);
        assert_eq!(annotation.confidence, 1.0);
        assert_eq!(annotation.latest_capture.map(|c| c.timestamp()), Some(now.timestamp()));
    }
}
