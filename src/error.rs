use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

/// Every failure the attendance core and its collaborators can report.
#[derive(Debug, thiserror::Error)]
pub enum AttendanceError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("You are too far from the designated location.")]
    OutOfRange { distance: f64, allowed_radius: f64 },

    #[error("You have already checked in today.")]
    AlreadyCheckedIn,

    #[error("No active check-in found for today.")]
    NoOpenSession,

    #[error("{0}")]
    Unauthenticated(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    /// Token signing or password hashing failed.
    #[error("internal failure: {0}")]
    Internal(String),
}

impl AttendanceError {
    pub fn code(&self) -> &'static str {
        match self {
            AttendanceError::Validation(_) => "VALIDATION_ERROR",
            AttendanceError::NotFound { .. } => "NOT_FOUND",
            AttendanceError::OutOfRange { .. } => "OUT_OF_RANGE",
            AttendanceError::AlreadyCheckedIn => "ALREADY_CHECKED_IN",
            AttendanceError::NoOpenSession => "NO_OPEN_SESSION",
            AttendanceError::Unauthenticated(_) => "UNAUTHENTICATED",
            AttendanceError::Forbidden(_) => "FORBIDDEN",
            AttendanceError::Storage(_) => "STORAGE_ERROR",
            AttendanceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AttendanceError::Validation(message.into())
    }
}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            AttendanceError::Validation(_)
            | AttendanceError::OutOfRange { .. }
            | AttendanceError::AlreadyCheckedIn => StatusCode::BAD_REQUEST,
            AttendanceError::NotFound { .. } | AttendanceError::NoOpenSession => {
                StatusCode::NOT_FOUND
            }
            AttendanceError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AttendanceError::Forbidden(_) => StatusCode::FORBIDDEN,
            AttendanceError::Storage(_) | AttendanceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AttendanceError::OutOfRange {
                distance,
                allowed_radius,
            } => json!({
                "error": self.to_string(),
                "code": self.code(),
                "distance": distance,
                "allowed_radius": allowed_radius,
            }),
            AttendanceError::Storage(_) | AttendanceError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                json!({
                    "error": "Internal Server Error",
                    "code": self.code(),
                })
            }
            _ => json!({
                "error": self.to_string(),
                "code": self.code(),
            }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Maps actix JSON/query extractor failures onto `Validation` so clients see one error shape.
pub fn payload_error(err: impl std::fmt::Display) -> actix_web::Error {
    AttendanceError::Validation(format!("Invalid request: {err}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    async fn render(err: AttendanceError) -> (StatusCode, serde_json::Value) {
        let resp = err.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn out_of_range_carries_distance_and_radius() {
        let (status, body) = render(AttendanceError::OutOfRange {
            distance: 1113.2,
            allowed_radius: 100.0,
        })
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "OUT_OF_RANGE");
        assert_eq!(body["distance"], 1113.2);
        assert_eq!(body["allowed_radius"], 100.0);
    }

    #[actix_web::test]
    async fn domain_errors_map_to_client_statuses() {
        let cases = [
            (AttendanceError::AlreadyCheckedIn, StatusCode::BAD_REQUEST),
            (AttendanceError::NoOpenSession, StatusCode::NOT_FOUND),
            (
                AttendanceError::NotFound {
                    entity: "Location",
                    id: 7,
                },
                StatusCode::NOT_FOUND,
            ),
            (
                AttendanceError::Unauthenticated("Missing token".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                AttendanceError::Forbidden("Admin only".into()),
                StatusCode::FORBIDDEN,
            ),
        ];

        for (err, expected) in cases {
            let message = err.to_string();
            let (status, body) = render(err).await;
            assert_eq!(status, expected);
            assert_eq!(body["error"], message);
        }
    }

    #[actix_web::test]
    async fn storage_errors_are_opaque() {
        let (status, body) = render(AttendanceError::Storage(sqlx::Error::PoolTimedOut)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "STORAGE_ERROR");
        assert_eq!(body["error"], "Internal Server Error");
    }
}
