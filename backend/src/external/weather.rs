//! Weather API client for fetching hourly samples
//!
//! Integrates with the Open-Meteo forecast API, which serves both the recent
//! past and the forecast horizon from the same hourly endpoint.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use shared::{GeoPoint, MetricSample, TimeWindow};
use std::time::Duration;

use super::MetricSource;
use crate::error::{AppError, AppResult};

const HOURLY_FIELDS: &str = "temperature_2m,precipitation,wind_speed_10m";

/// Weather API client
#[derive(Clone)]
pub struct WeatherClient {
    client: Client,
    base_url: String,
}

/// Open-Meteo forecast response
#[derive(Debug, Deserialize)]
struct OMForecastResponse {
    hourly: Option<OMHourly>,
}

/// Parallel arrays; any entry may be null
#[derive(Debug, Deserialize)]
struct OMHourly {
    time: Vec<String>,
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    precipitation: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m: Vec<Option<f64>>,
}

impl WeatherClient {
    /// Create a new WeatherClient
    pub fn new(base_url: String, timeout: Duration) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("Weather HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch hourly samples covering a window
    pub async fn get_hourly(
        &self,
        location: GeoPoint,
        window: TimeWindow,
    ) -> AppResult<Vec<MetricSample>> {
        let url = format!(
            "{}/forecast?latitude={}&longitude={}&hourly={}&wind_speed_unit=ms&timezone=UTC&start_date={}&end_date={}",
            self.base_url,
            location.latitude,
            location.longitude,
            HOURLY_FIELDS,
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d"),
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::UpstreamFailure(format!("Weather API request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamFailure(format!(
                "Weather API error: {} - {}",
                status, body
            )));
        }

        let data: OMForecastResponse = response.json().await.map_err(|e| {
            AppError::UpstreamFailure(format!("Failed to parse weather response: {}", e))
        })?;

        Ok(convert_hourly(data, window))
    }
}

#[async_trait]
impl MetricSource for WeatherClient {
    async fn fetch_samples(
        &self,
        location: GeoPoint,
        window: TimeWindow,
    ) -> AppResult<Vec<MetricSample>> {
        self.get_hourly(location, window).await
    }
}

/// Zip the parallel arrays into samples inside `[start, end]`, ascending
fn convert_hourly(data: OMForecastResponse, window: TimeWindow) -> Vec<MetricSample> {
    let Some(hourly) = data.hourly else {
        return Vec::new();
    };

    let mut samples: Vec<MetricSample> = hourly
        .time
        .iter()
        .enumerate()
        .filter_map(|(i, time)| {
            let timestamp = parse_hour(time)?;
            if timestamp < window.start || timestamp > window.end {
                return None;
            }
            Some(MetricSample::new(
                timestamp,
                hourly.temperature_2m.get(i).copied().flatten(),
                hourly.precipitation.get(i).copied().flatten(),
                hourly.wind_speed_10m.get(i).copied().flatten(),
            ))
        })
        .collect();

    samples.sort_by_key(|s| s.timestamp);
    samples
}

/// Open-Meteo reports local (here UTC) times without an offset
fn parse_hour(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}
