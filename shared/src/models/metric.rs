//! Weather samples supplied by the metric provider

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rule::WeatherMetric;

/// One hourly observation or forecast point.
///
/// Each reading is optional: a provider gap stays `None` and is never
/// treated as zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub temp_c: Option<f64>,
    pub precip_mm: Option<f64>,
    pub wind_ms: Option<f64>,
}

impl MetricSample {
    pub fn new(
        timestamp: DateTime<Utc>,
        temp_c: Option<f64>,
        precip_mm: Option<f64>,
        wind_ms: Option<f64>,
    ) -> Self {
        Self {
            timestamp,
            temp_c: finite(temp_c),
            precip_mm: finite(precip_mm),
            wind_ms: finite(wind_ms),
        }
    }

    pub fn value(&self, metric: WeatherMetric) -> Option<f64> {
        match metric {
            WeatherMetric::Temp => self.temp_c,
            WeatherMetric::Rain => self.precip_mm,
            WeatherMetric::Wind => self.wind_ms,
        }
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Reduce the samples of one metric with that metric's aggregation.
/// `None` when no sample carries a value for it.
pub fn aggregate_metric(samples: &[MetricSample], metric: WeatherMetric) -> Option<f64> {
    metric
        .aggregation()
        .apply(samples.iter().filter_map(|s| s.value(metric)))
}

/// Daily roll-up written to weather history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyWeatherSummary {
    pub observed_on: chrono::NaiveDate,
    pub min_temp_c: Option<f64>,
    pub total_precip_mm: Option<f64>,
    pub max_wind_ms: Option<f64>,
    pub sample_count: i32,
}

impl DailyWeatherSummary {
    /// Summarise a day of samples; `None` for an empty day
    pub fn from_samples(observed_on: chrono::NaiveDate, samples: &[MetricSample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        Some(Self {
            observed_on,
            min_temp_c: aggregate_metric(samples, WeatherMetric::Temp),
            total_precip_mm: aggregate_metric(samples, WeatherMetric::Rain),
            max_wind_ms: aggregate_metric(samples, WeatherMetric::Wind),
            sample_count: samples.len() as i32,
        })
    }
}
