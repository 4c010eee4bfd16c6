//! User profiles and gardens as the monitor sees them

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::GeoPoint;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub location: Option<GeoPoint>,
    /// Hazards the user explicitly follows; overrides crop-based relevance
    pub watchlist: Vec<Uuid>,
    pub crops: Vec<Uuid>,
}

impl UserProfile {
    pub fn has_interests(&self) -> bool {
        !self.watchlist.is_empty() || !self.crops.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Garden {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub location: Option<GeoPoint>,
}
