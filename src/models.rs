use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::model::role::Role;

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "jane@company.com", format = "email")]
    pub email: String,
    #[schema(example = "s3cret")]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateUserReq {
    #[schema(example = "Jane Doe")]
    pub name: String,
    #[schema(example = "jane@company.com", format = "email")]
    pub email: String,
    pub password: String,
    /// Defaults to `user`
    pub role: Option<Role>,
    #[schema(example = "EMP-001")]
    pub employee_code: Option<String>,
    #[schema(example = "Engineering")]
    pub department: Option<String>,
}

/// Admin patch of an account. Absent fields stay as they are.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateUserReq {
    #[schema(example = "Jane Doe")]
    pub name: Option<String>,
    #[schema(example = "jane@company.com", format = "email")]
    pub email: Option<String>,
    pub role: Option<Role>,
    #[schema(example = "EMP-001")]
    pub employee_code: Option<String>,
    #[schema(example = "Engineering")]
    pub department: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: u64,
    /// email
    pub sub: String,
    pub name: String,
    pub role: u8, // role id
    pub exp: usize,
    pub jti: String,

    pub token_type: TokenType,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum TokenType {
    Access,
    Refresh,
}
