use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::geofence::Coordinates;

pub const DEFAULT_RADIUS_METERS: f64 = 100.0;

/// A named circular geofence. Deactivation is a soft delete: rows are never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "name": "Head Office",
    "description": "Main gate",
    "latitude": 23.8103,
    "longitude": 90.4125,
    "radius": 100.0,
    "is_active": true,
    "created_by": 1,
    "created_at": "2026-01-01T00:00:00Z",
    "updated_at": "2026-01-01T00:00:00Z"
}))]
pub struct Location {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// meters
    pub radius: f64,
    pub is_active: bool,
    pub created_by: Option<u64>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

impl Location {
    pub fn center(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

#[derive(Debug, Clone)]
pub struct NewLocation {
    pub name: String,
    pub description: Option<String>,
    pub center: Coordinates,
    pub radius: f64,
    pub created_by: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct LocationPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius: Option<f64>,
    pub is_active: Option<bool>,
}

impl LocationPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.latitude.is_none()
            && self.longitude.is_none()
            && self.radius.is_none()
            && self.is_active.is_none()
    }

    pub fn apply(&self, location: &mut Location) {
        if let Some(name) = &self.name {
            location.name = name.clone();
        }
        if let Some(description) = &self.description {
            location.description = Some(description.clone());
        }
        if let Some(latitude) = self.latitude {
            location.latitude = latitude;
        }
        if let Some(longitude) = self.longitude {
            location.longitude = longitude;
        }
        if let Some(radius) = self.radius {
            location.radius = radius;
        }
        if let Some(is_active) = self.is_active {
            location.is_active = is_active;
        }
    }
}
