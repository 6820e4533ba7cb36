use crate::api::attendance::{AttendanceResponse, CheckInReq, CheckOutReq, MessageResponse};
use crate::api::location::{CreateLocation, LocationResponse, UpdateLocation};
use crate::geofence::Coordinates;
use crate::model::attendance::{AttendancePage, AttendanceRecord, AttendanceStatus, SessionState};
use crate::model::location::Location;
use crate::model::role::Role;
use crate::model::user::{UserList, UserProfile};
use crate::models::{CreateUserReq, LoginReqDto, TokenPair, UpdateUserReq};
use crate::service::{ManualEntry, TodayStatus};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Geo Attendance API",
        version = "1.0.0",
        description = r#"
## Location-verified attendance

Employees check in only when their reported GPS position lies inside the circular
geofence of an active location. Each user gets one check-in per calendar day and
checks out once.

### Key Features
- **Check-in / Check-out** with geofence verification (haversine distance, inclusive radius)
- **Today's status** and personal **history**
- **Locations**: admin-managed geofences, soft deleted
- **Manual entries**: admins backfill or correct records; every edit records who and why

### Security
All `/api` endpoints require a **JWT Bearer** access token.
Administrative operations require the `admin` role.

### Errors
Errors are JSON: `{"error": "...", "code": "..."}`. `OUT_OF_RANGE` also carries
`distance` and `allowed_radius` in meters.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,
        crate::auth::handlers::me,
        crate::auth::handlers::create_user,
        crate::auth::handlers::list_users,
        crate::auth::handlers::update_user,
        crate::auth::handlers::delete_user,

        crate::api::attendance::check_in,
        crate::api::attendance::check_out,
        crate::api::attendance::today,
        crate::api::attendance::my_history,
        crate::api::attendance::list_all,
        crate::api::attendance::create_manual,
        crate::api::attendance::update_manual,
        crate::api::attendance::delete,

        crate::api::location::list_locations,
        crate::api::location::get_location,
        crate::api::location::create_location,
        crate::api::location::update_location,
        crate::api::location::delete_location
    ),
    components(
        schemas(
            LoginReqDto,
            TokenPair,
            CreateUserReq,
            UpdateUserReq,
            UserProfile,
            UserList,
            Role,
            Coordinates,
            CheckInReq,
            CheckOutReq,
            AttendanceRecord,
            AttendanceStatus,
            AttendanceResponse,
            AttendancePage,
            SessionState,
            TodayStatus,
            ManualEntry,
            MessageResponse,
            Location,
            CreateLocation,
            UpdateLocation,
            LocationResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login, token rotation and accounts"),
        (name = "Attendance", description = "Check-in, check-out and attendance records"),
        (name = "Location", description = "Geofenced work locations"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_attendance_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/attendance/checkin",
            "/api/attendance/checkout",
            "/api/attendance/today",
            "/api/attendance/me",
            "/api/attendance",
            "/api/attendance/manual",
            "/api/attendance/{id}",
            "/api/locations/{id}",
            "/api/users",
            "/api/users/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert!(
            doc.components
                .as_ref()
                .is_some_and(|c| c.security_schemes.contains_key("bearer_auth"))
        );
    }
}
