//! Read endpoint for report trend insights

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use shared::{validate_bounding_box, BoundingBox};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::insights::InsightSummary;
use crate::AppState;

const DEFAULT_DAYS: i64 = 7;

/// Query parameters for the insights endpoint.
///
/// `days` is clamped rather than rejected; the box is all-or-nothing.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct InsightsQuery {
    pub days: Option<i64>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub min_lat: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub min_lon: Option<f64>,
    #[validate(range(min = -90.0, max = 90.0))]
    pub max_lat: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    pub max_lon: Option<f64>,
}

impl InsightsQuery {
    pub fn bbox(&self) -> AppResult<Option<BoundingBox>> {
        match (self.min_lat, self.min_lon, self.max_lat, self.max_lon) {
            (None, None, None, None) => Ok(None),
            (Some(min_lat), Some(min_lon), Some(max_lat), Some(max_lon)) => {
                let bbox = BoundingBox::new(min_lat, min_lon, max_lat, max_lon);
                validate_bounding_box(&bbox).map_err(|msg| AppError::validation("bbox", msg))?;
                Ok(Some(bbox))
            }
            _ => Err(AppError::validation(
                "bbox",
                "min_lat, min_lon, max_lat and max_lon must be given together",
            )),
        }
    }
}

/// Top insights for an optional area
pub async fn get_insights(
    State(state): State<AppState>,
    Query(query): Query<InsightsQuery>,
) -> AppResult<Json<InsightSummary>> {
    query.validate()?;
    let bbox = query.bbox()?;

    let service = state.engine.insight_service(&state.config.monitor);
    let summary = service
        .summary(bbox, query.days.unwrap_or(DEFAULT_DAYS))
        .await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_all_or_nothing() {
        let none = InsightsQuery::default();
        assert!(none.bbox().unwrap().is_none());

        let partial = InsightsQuery {
            min_lat: Some(1.0),
            ..Default::default()
        };
        assert!(partial.bbox().is_err());

        let full = InsightsQuery {
            days: Some(7),
            min_lat: Some(40.0),
            min_lon: Some(-5.0),
            max_lat: Some(50.0),
            max_lon: Some(10.0),
        };
        assert!(full.validate().is_ok());
        assert!(full.bbox().unwrap().is_some());
    }

    #[test]
    fn test_inverted_bbox_rejected() {
        let query = InsightsQuery {
            days: None,
            min_lat: Some(50.0),
            min_lon: Some(-5.0),
            max_lat: Some(40.0),
            max_lon: Some(10.0),
        };

        assert!(query.bbox().is_err());
    }

    #[test]
    fn test_out_of_range_latitude() {
        let query = InsightsQuery {
            min_lat: Some(95.0),
            ..Default::default()
        };

        assert!(query.validate().is_err());
    }
}
