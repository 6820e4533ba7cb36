use crate::config::Config;
use crate::{
    auth::jwt::verify_token,
    error::AttendanceError,
    model::role::Role,
    models::{Claims, TokenType},
};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl TryFrom<Claims> for AuthUser {
    type Error = AttendanceError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let role = Role::from_id(claims.role)
            .ok_or_else(|| AttendanceError::Unauthenticated("Invalid role".into()))?;

        Ok(AuthUser {
            user_id: claims.user_id,
            email: claims.sub,
            name: claims.name,
            role,
        })
    }
}

/// Decodes a `Bearer` access token. Refresh tokens are not accepted here.
pub fn authenticate(header: Option<&str>, secret: &str) -> Result<AuthUser, AttendanceError> {
    let header =
        header.ok_or_else(|| AttendanceError::Unauthenticated("Missing Authorization header".into()))?;

    let token = header.strip_prefix("Bearer ").ok_or_else(|| {
        AttendanceError::Unauthenticated("Authorization header must start with Bearer".into())
    })?;

    let claims = verify_token(token, secret)
        .map_err(|_| AttendanceError::Unauthenticated("Invalid or expired token".into()))?;

    if claims.token_type != TokenType::Access {
        return Err(AttendanceError::Unauthenticated("Access token required".into()));
    }

    AuthUser::try_from(claims)
}

impl FromRequest for AuthUser {
    type Error = AttendanceError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // set by auth_middleware on protected scopes
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let Some(config) = req.app_data::<Data<Config>>() else {
            return ready(Err(AttendanceError::Internal("Config missing".into())));
        };

        let header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok());

        ready(authenticate(header, &config.jwt_secret))
    }
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AttendanceError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AttendanceError::Forbidden("Admin only".into()))
        }
    }
}
