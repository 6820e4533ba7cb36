use crate::{
    api::attendance::MessageResponse,
    auth::auth::AuthUser,
    config::Config,
    error::AttendanceError,
    geofence::Coordinates,
    model::location::{Location, LocationPatch, NewLocation},
    service::AttendanceService,
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CreateLocation {
    #[schema(example = "Head Office")]
    pub name: Option<String>,
    #[schema(example = "Main gate")]
    pub description: Option<String>,
    #[schema(example = 23.8103)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125)]
    pub longitude: Option<f64>,
    /// Meters. Defaults to the configured radius (100 unless overridden).
    #[schema(example = 150.0)]
    pub radius: Option<f64>,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateLocation {
    pub name: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius: Option<f64>,
    pub is_active: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct LocationResponse {
    #[schema(example = "Location created successfully")]
    pub message: String,
    pub location: Location,
}

fn validate_radius(radius: f64) -> Result<(), AttendanceError> {
    if radius.is_finite() && radius > 0.0 {
        Ok(())
    } else {
        Err(AttendanceError::validation("Radius must be a positive number of meters."))
    }
}

fn not_found(id: u64) -> AttendanceError {
    AttendanceError::NotFound {
        entity: "Location",
        id,
    }
}

impl UpdateLocation {
    fn into_patch(self) -> Result<LocationPatch, AttendanceError> {
        Coordinates::new(self.latitude.unwrap_or(0.0), self.longitude.unwrap_or(0.0)).validate()?;
        if let Some(radius) = self.radius {
            validate_radius(radius)?;
        }
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AttendanceError::validation("Name cannot be empty."));
        }

        let patch = LocationPatch {
            name: self.name.map(|n| n.trim().to_string()),
            description: self.description,
            latitude: self.latitude,
            longitude: self.longitude,
            radius: self.radius,
            is_active: self.is_active,
        };
        if patch.is_empty() {
            return Err(AttendanceError::validation("No fields provided for update"));
        }
        Ok(patch)
    }
}

/// Active locations, newest first
#[utoipa::path(
    get,
    path = "/api/locations",
    responses(
        (status = 200, description = "Active locations", body = [Location]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Location"
)]
pub async fn list_locations(
    _auth: AuthUser,
    service: web::Data<AttendanceService>,
) -> Result<HttpResponse, AttendanceError> {
    let locations = service.locations().list_active().await?;
    Ok(HttpResponse::Ok().json(locations))
}

#[utoipa::path(
    get,
    path = "/api/locations/{id}",
    params(("id" = u64, Path, description = "Location id")),
    responses(
        (status = 200, description = "Location, active or not", body = Location),
        (status = 404, description = "Location not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Location"
)]
pub async fn get_location(
    _auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AttendanceError> {
    let id = path.into_inner();
    let location = service.locations().get(id).await?.ok_or(not_found(id))?;
    Ok(HttpResponse::Ok().json(location))
}

/// Create a geofence (admin)
#[utoipa::path(
    post,
    path = "/api/locations",
    request_body = CreateLocation,
    responses(
        (status = 201, description = "Location created", body = LocationResponse),
        (status = 400, description = "Name, latitude, and longitude are required"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Location"
)]
pub async fn create_location(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    config: web::Data<Config>,
    payload: web::Json<CreateLocation>,
) -> Result<HttpResponse, AttendanceError> {
    auth.require_admin()?;

    let payload = payload.into_inner();
    let name = payload.name.as_deref().map(str::trim).unwrap_or_default();
    let (Some(latitude), Some(longitude)) = (payload.latitude, payload.longitude) else {
        return Err(AttendanceError::validation(
            "Name, latitude, and longitude are required.",
        ));
    };
    if name.is_empty() {
        return Err(AttendanceError::validation(
            "Name, latitude, and longitude are required.",
        ));
    }

    let center = Coordinates::new(latitude, longitude);
    center.validate()?;
    let radius = payload.radius.unwrap_or(config.default_location_radius);
    validate_radius(radius)?;

    let location = service
        .locations()
        .create(NewLocation {
            name: name.to_string(),
            description: payload.description,
            center,
            radius,
            created_by: Some(auth.user_id),
        })
        .await?;

    info!(location_id = location.id, admin_id = auth.user_id, "Location created");
    Ok(HttpResponse::Created().json(LocationResponse {
        message: "Location created successfully".to_string(),
        location,
    }))
}

/// Update a geofence (admin)
#[utoipa::path(
    put,
    path = "/api/locations/{id}",
    params(("id" = u64, Path, description = "Location id")),
    request_body = UpdateLocation,
    responses(
        (status = 200, description = "Location updated", body = LocationResponse),
        (status = 400, description = "Invalid or empty update"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Location not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Location"
)]
pub async fn update_location(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
    payload: web::Json<UpdateLocation>,
) -> Result<HttpResponse, AttendanceError> {
    auth.require_admin()?;

    let id = path.into_inner();
    let patch = payload.into_inner().into_patch()?;
    let location = service
        .locations()
        .update(id, patch)
        .await?
        .ok_or(not_found(id))?;

    info!(location_id = id, admin_id = auth.user_id, "Location updated");
    Ok(HttpResponse::Ok().json(LocationResponse {
        message: "Location updated successfully".to_string(),
        location,
    }))
}

/// Deactivate a geofence (admin). Existing attendance keeps referring to it.
#[utoipa::path(
    delete,
    path = "/api/locations/{id}",
    params(("id" = u64, Path, description = "Location id")),
    responses(
        (status = 200, description = "Location deactivated", body = MessageResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Location not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Location"
)]
pub async fn delete_location(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AttendanceError> {
    auth.require_admin()?;

    let id = path.into_inner();
    if !service.locations().deactivate(id).await? {
        return Err(not_found(id));
    }

    info!(location_id = id, admin_id = auth.user_id, "Location deactivated");
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Location deleted successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_update() -> UpdateLocation {
        UpdateLocation {
            name: None,
            description: None,
            latitude: None,
            longitude: None,
            radius: None,
            is_active: None,
        }
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(matches!(
            empty_update().into_patch(),
            Err(AttendanceError::Validation(_))
        ));
    }

    #[test]
    fn update_rejects_bad_values() {
        let bad_latitude = UpdateLocation {
            latitude: Some(95.0),
            ..empty_update()
        };
        let bad_radius = UpdateLocation {
            radius: Some(0.0),
            ..empty_update()
        };
        assert!(bad_latitude.into_patch().is_err());
        assert!(bad_radius.into_patch().is_err());
    }

    #[test]
    fn update_trims_name() {
        let patch = UpdateLocation {
            name: Some("  Annex ".into()),
            is_active: Some(false),
            ..empty_update()
        }
        .into_patch()
        .unwrap();
        assert_eq!(patch.name.as_deref(), Some("Annex"));
        assert_eq!(patch.is_active, Some(false));
    }
}
