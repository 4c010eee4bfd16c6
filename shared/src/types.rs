//! Common types used across the monitor: coordinates, bounding boxes and
//! the calendar helpers the batch jobs share.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// GPS coordinates in decimal degrees
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Haversine distance between two points in kilometres.
///
/// Symmetric in its arguments and exactly zero for identical points.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Whether `b` lies within `radius_km` of `a` (inclusive)
pub fn within_radius(a: &GeoPoint, b: &GeoPoint, radius_km: f64) -> bool {
    haversine_km(a, b) <= radius_km
}

/// Axis-aligned latitude/longitude box used to scope report queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lon
            && point.longitude <= self.max_lon
    }
}

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window starting at `now` and extending `hours` forward
    pub fn ahead(now: DateTime<Utc>, hours: u32) -> Self {
        Self::new(now, now + Duration::hours(i64::from(hours)))
    }

    /// Window of `days` ending at `now`
    pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Self {
        Self::new(now - Duration::days(i64::from(days)), now)
    }

    /// The window of equal length immediately before this one
    pub fn preceding(&self) -> Self {
        let len = self.end - self.start;
        Self::new(self.start - len, self.start)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// The full UTC day before `now`, as a window plus its calendar date
pub fn previous_utc_day(now: DateTime<Utc>) -> (NaiveDate, TimeWindow) {
    let today = now.date_naive();
    let yesterday = today.pred_opt().unwrap_or(today);
    let start = yesterday.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    let end = today.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
    (yesterday, TimeWindow::new(start, end))
}

/// Calendar month (1-12) of an instant in UTC
pub fn month_of(at: DateTime<Utc>) -> u32 {
    at.month()
}

/// Start of the fixed-width bucket that `at` falls into.
///
/// Buckets are aligned to the Unix epoch, so the same instant always maps to
/// the same bucket regardless of when the job runs.
pub fn bucket_start(at: DateTime<Utc>, width_hours: u32) -> DateTime<Utc> {
    let width = i64::from(width_hours.max(1)) * 3600;
    let ts = at.timestamp();
    let start = ts - ts.rem_euclid(width);
    DateTime::from_timestamp(start, 0).unwrap_or(at)
}
