use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: u8,
    pub employee_code: Option<String>,
    pub department: Option<String>,
    pub is_active: bool,
}

/// User row without the password hash.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct UserProfile {
    #[schema(example = 3)]
    pub id: u64,
    #[schema(example = "Jane Doe")]
    pub name: String,
    #[schema(example = "jane@company.com")]
    pub email: String,
    #[schema(example = 2)]
    pub role_id: u8,
    #[schema(example = "EMP-001", nullable = true)]
    pub employee_code: Option<String>,
    #[schema(example = "Engineering", nullable = true)]
    pub department: Option<String>,
    pub is_active: bool,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserList {
    pub users: Vec<UserProfile>,
}
