//! Validation utilities for the GardenWatch monitor
//!
//! Inputs arrive from persistence and query strings; these checks keep
//! malformed rows from reaching the evaluators.

use crate::models::{Hazard, RuleCondition, WeatherCondition, MAX_RISK_LEVEL};
use crate::types::{BoundingBox, GeoPoint};

/// Smallest and largest insight window in days
pub const MIN_INSIGHT_DAYS: u32 = 1;
pub const MAX_INSIGHT_DAYS: u32 = 30;

/// Longest forecast window a weather rule may look ahead
pub const MAX_RULE_WINDOW_HOURS: u32 = 16 * 24;

// ============================================================================
// Geospatial Validations
// ============================================================================

/// Validate latitude/longitude ranges
pub fn validate_coordinates(point: &GeoPoint) -> Result<(), &'static str> {
    if !point.latitude.is_finite() || !point.longitude.is_finite() {
        return Err("Coordinates must be finite numbers");
    }
    if !(-90.0..=90.0).contains(&point.latitude) {
        return Err("Latitude must be between -90 and 90");
    }
    if !(-180.0..=180.0).contains(&point.longitude) {
        return Err("Longitude must be between -180 and 180");
    }
    Ok(())
}

/// Validate a bounding box is well formed
pub fn validate_bounding_box(bbox: &BoundingBox) -> Result<(), &'static str> {
    validate_coordinates(&GeoPoint::new(bbox.min_lat, bbox.min_lon))?;
    validate_coordinates(&GeoPoint::new(bbox.max_lat, bbox.max_lon))?;
    if bbox.min_lat > bbox.max_lat || bbox.min_lon > bbox.max_lon {
        return Err("Bounding box minimum must not exceed maximum");
    }
    Ok(())
}

// ============================================================================
// Rule Validations
// ============================================================================

/// Validate a rule condition before evaluation
pub fn validate_condition(condition: &RuleCondition) -> Result<(), &'static str> {
    match condition {
        RuleCondition::Weather(weather) => validate_weather_condition(weather),
    }
}

fn validate_weather_condition(condition: &WeatherCondition) -> Result<(), &'static str> {
    if !condition.value.is_finite() {
        return Err("Threshold value must be a finite number");
    }
    if condition.window_hours == 0 {
        return Err("Window must be at least one hour");
    }
    if condition.window_hours > MAX_RULE_WINDOW_HOURS {
        return Err("Window exceeds the forecast horizon");
    }
    Ok(())
}

/// Validate a hazard's seasonal calendar uses months 1-12 and levels 0-5
pub fn validate_risk_calendar(hazard: &Hazard) -> Result<(), &'static str> {
    for (month, level) in &hazard.seasonal_risk {
        if !(1..=12).contains(month) {
            return Err("Risk calendar month must be between 1 and 12");
        }
        if *level > MAX_RISK_LEVEL {
            return Err("Risk level must be between 0 and 5");
        }
    }
    Ok(())
}

// ============================================================================
// General Validations
// ============================================================================

/// Clamp an insight window to the supported range
pub fn clamp_insight_days(days: i64) -> u32 {
    days.clamp(i64::from(MIN_INSIGHT_DAYS), i64::from(MAX_INSIGHT_DAYS)) as u32
}

/// Validate a dedup key: non-empty, printable, bounded
pub fn validate_dedup_key(key: &str) -> Result<(), &'static str> {
    if key.trim().is_empty() {
        return Err("Dedup key cannot be empty");
    }
    if key.len() > 200 {
        return Err("Dedup key must be at most 200 characters");
    }
    if key.chars().any(char::is_control) {
        return Err("Dedup key cannot contain control characters");
    }
    Ok(())
}
