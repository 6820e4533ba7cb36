use crate::{
    auth::auth::AuthUser,
    error::AttendanceError,
    geofence::Coordinates,
    model::attendance::{AttendancePage, AttendanceRecord},
    service::{AttendanceQuery, AttendanceService, ManualEntry, TodayStatus},
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct CheckInReq {
    #[schema(example = 1)]
    pub location_id: Option<u64>,
    #[schema(example = 23.8103)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125)]
    pub longitude: Option<f64>,
}

#[derive(Deserialize, ToSchema)]
pub struct CheckOutReq {
    #[schema(example = 23.8103)]
    pub latitude: Option<f64>,
    #[schema(example = 90.4125)]
    pub longitude: Option<f64>,
}

#[derive(Serialize, ToSchema)]
pub struct AttendanceResponse {
    #[schema(example = "Check-in successful")]
    pub message: String,
    pub attendance: AttendanceRecord,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Attendance deleted successfully")]
    pub message: String,
}

fn respond(message: &str, attendance: AttendanceRecord) -> AttendanceResponse {
    AttendanceResponse {
        message: message.to_string(),
        attendance,
    }
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/checkin",
    request_body = CheckInReq,
    responses(
        (status = 201, description = "Checked in successfully", body = AttendanceResponse),
        (status = 400, description = "Missing fields, already checked in today, or outside the geofence", body = Object, example = json!({
            "error": "You are too far from the designated location.",
            "code": "OUT_OF_RANGE",
            "distance": 1113.19,
            "allowed_radius": 100.0
        })),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Location not found or inactive"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn check_in(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    payload: web::Json<CheckInReq>,
) -> Result<HttpResponse, AttendanceError> {
    let (Some(location_id), Some(latitude), Some(longitude)) =
        (payload.location_id, payload.latitude, payload.longitude)
    else {
        return Err(AttendanceError::validation(
            "Location ID, latitude, and longitude are required.",
        ));
    };

    let record = service
        .check_in(auth.user_id, location_id, Coordinates::new(latitude, longitude))
        .await?;

    Ok(HttpResponse::Created().json(respond("Check-in successful", record)))
}

/// Check-out endpoint
#[utoipa::path(
    post,
    path = "/api/attendance/checkout",
    request_body = CheckOutReq,
    responses(
        (status = 200, description = "Checked out successfully", body = AttendanceResponse),
        (status = 400, description = "Missing or invalid coordinates"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No active check-in found for today", body = Object, example = json!({
            "error": "No active check-in found for today.",
            "code": "NO_OPEN_SESSION"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn check_out(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    payload: web::Json<CheckOutReq>,
) -> Result<HttpResponse, AttendanceError> {
    let (Some(latitude), Some(longitude)) = (payload.latitude, payload.longitude) else {
        return Err(AttendanceError::validation(
            "Latitude and longitude are required.",
        ));
    };

    let record = service
        .check_out(auth.user_id, Coordinates::new(latitude, longitude))
        .await?;

    Ok(HttpResponse::Ok().json(respond("Check-out successful", record)))
}

/// Today's attendance state for the caller
#[utoipa::path(
    get,
    path = "/api/attendance/today",
    responses(
        (status = 200, description = "Today's state", body = TodayStatus),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn today(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
) -> Result<HttpResponse, AttendanceError> {
    let status = service.today_status(auth.user_id).await?;
    Ok(HttpResponse::Ok().json(status))
}

/// The caller's own attendance history, newest first
#[utoipa::path(
    get,
    path = "/api/attendance/me",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated history", body = AttendancePage),
        (status = 400, description = "Invalid date range"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn my_history(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<AttendanceQuery>,
) -> Result<HttpResponse, AttendanceError> {
    let page = service
        .list_my_history(auth.user_id, query.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// All attendance records (admin)
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Paginated records", body = AttendancePage),
        (status = 400, description = "Invalid date range"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn list_all(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    query: web::Query<AttendanceQuery>,
) -> Result<HttpResponse, AttendanceError> {
    auth.require_admin()?;

    let page = service.list_all(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Create a manual attendance record (admin)
#[utoipa::path(
    post,
    path = "/api/attendance/manual",
    request_body = ManualEntry,
    responses(
        (status = 201, description = "Attendance created", body = AttendanceResponse),
        (status = 400, description = "Missing fields, inverted times, or a second open session"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Location not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn create_manual(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    payload: web::Json<ManualEntry>,
) -> Result<HttpResponse, AttendanceError> {
    auth.require_admin()?;

    let entry = ManualEntry {
        record_id: None,
        ..payload.into_inner()
    };
    let record = service.manual_upsert(auth.user_id, entry).await?;

    Ok(HttpResponse::Created().json(respond("Attendance created successfully", record)))
}

/// Edit an attendance record (admin)
///
/// Only `check_in_time`, `check_out_time`, `status`, `notes`, `reason` and the check-out
/// coordinates are read. `"check_out_time": null` reopens the session.
#[utoipa::path(
    put,
    path = "/api/attendance/{id}",
    params(
        ("id" = u64, Path, description = "Attendance record id")
    ),
    request_body = ManualEntry,
    responses(
        (status = 200, description = "Attendance updated", body = AttendanceResponse),
        (status = 400, description = "Inverted times or a second open session"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Attendance record not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn update_manual(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
    payload: web::Json<ManualEntry>,
) -> Result<HttpResponse, AttendanceError> {
    auth.require_admin()?;

    let entry = ManualEntry {
        record_id: Some(path.into_inner()),
        ..payload.into_inner()
    };
    let record = service.manual_upsert(auth.user_id, entry).await?;

    Ok(HttpResponse::Ok().json(respond("Attendance updated successfully", record)))
}

/// Delete an attendance record (admin)
#[utoipa::path(
    delete,
    path = "/api/attendance/{id}",
    params(
        ("id" = u64, Path, description = "Attendance record id")
    ),
    responses(
        (status = 200, description = "Attendance deleted", body = MessageResponse),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Attendance record not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn delete(
    auth: AuthUser,
    service: web::Data<AttendanceService>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AttendanceError> {
    auth.require_admin()?;

    service.delete(auth.user_id, path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "Attendance deleted successfully".to_string(),
    }))
}
