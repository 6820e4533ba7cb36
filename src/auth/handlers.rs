use crate::{
    api::attendance::MessageResponse,
    auth::{
        auth::AuthUser,
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::{hash_password, verify_password},
    },
    config::Config,
    error::AttendanceError,
    model::{
        role::Role,
        user::{User, UserList, UserProfile},
    },
    models::{Claims, CreateUserReq, LoginReqDto, TokenPair, TokenType, UpdateUserReq},
    utils::db_utils::{SqlUpdate, UpdateBuilder, execute_update},
};
use actix_web::{HttpRequest, HttpResponse, web};
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

const PROFILE_SELECT: &str = r#"
    SELECT id, name, email, role_id, employee_code, department, is_active, last_login_at
    FROM users
"#;

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn refresh_claims(req: &HttpRequest, config: &Config) -> Result<Claims, AttendanceError> {
    let token = bearer(req)
        .ok_or_else(|| AttendanceError::Unauthenticated("Missing refresh token".into()))?;

    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AttendanceError::Unauthenticated("Invalid or expired token".into()))?;

    if claims.token_type != TokenType::Refresh {
        return Err(AttendanceError::Unauthenticated("Refresh token required".into()));
    }
    Ok(claims)
}

/// Issues an access/refresh pair and records the refresh `jti`.
async fn issue_tokens(
    user: &AuthUser,
    pool: &MySqlPool,
    config: &Config,
) -> Result<TokenPair, AttendanceError> {
    let access_token = generate_access_token(user, &config.jwt_secret, config.access_token_ttl)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(user, &config.jwt_secret, config.refresh_token_ttl)?;

    debug!(
        user_id = user.user_id,
        jti = %refresh_claims.jti,
        "Storing refresh token"
    );

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(user.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(pool)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

async fn fetch_user(pool: &MySqlPool, user_id: u64) -> Result<User, AttendanceError> {
    sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password, role_id, employee_code, department, is_active
        FROM users
        WHERE id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AttendanceError::NotFound {
        entity: "User",
        id: user_id,
    })
}

fn as_auth_user(user: &User) -> Result<AuthUser, AttendanceError> {
    let role = Role::from_id(user.role_id)
        .ok_or_else(|| AttendanceError::Forbidden("Account has no valid role".into()))?;

    Ok(AuthUser {
        user_id: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        role,
    })
}

/// Login
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account is deactivated")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AttendanceError> {
    info!("Login request received");

    let email = user.email.trim().to_lowercase();
    if email.is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return Err(AttendanceError::validation("Email and password are required."));
    }

    let db_user = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password, role_id, employee_code, department, is_active
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?;

    let Some(db_user) = db_user else {
        info!("Invalid credentials: user not found");
        return Err(AttendanceError::Unauthenticated("Invalid credentials".into()));
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AttendanceError::Unauthenticated("Invalid credentials".into()));
    }

    if !db_user.is_active {
        info!(user_id = db_user.id, "Login refused: account deactivated");
        return Err(AttendanceError::Forbidden("Account is deactivated".into()));
    }

    let tokens = issue_tokens(&as_auth_user(&db_user)?, pool.get_ref(), &config).await?;

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = UTC_TIMESTAMP() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = db_user.id, "Login successful");
    Ok(HttpResponse::Ok().json(tokens))
}

/// Rotate a refresh token
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair; the presented refresh token is revoked", body = TokenPair),
        (status = 401, description = "Missing, invalid, expired or revoked refresh token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AttendanceError> {
    let claims = refresh_claims(&req, &config)?;

    // revoke the presented token; zero rows means unknown or already revoked
    let revoked = sqlx::query(
        "UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND revoked = FALSE",
    )
    .bind(&claims.jti)
    .execute(pool.get_ref())
    .await?;

    if revoked.rows_affected() == 0 {
        info!(user_id = claims.user_id, "Refresh with revoked or unknown token");
        return Err(AttendanceError::Unauthenticated("Refresh token revoked".into()));
    }

    // re-read the account so role changes and deactivation take effect
    let db_user = fetch_user(pool.get_ref(), claims.user_id).await?;
    if !db_user.is_active {
        return Err(AttendanceError::Forbidden("Account is deactivated".into()));
    }

    let tokens = issue_tokens(&as_auth_user(&db_user)?, pool.get_ref(), &config).await?;
    Ok(HttpResponse::Ok().json(tokens))
}

/// Logout (revokes the refresh token, always 204)
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> HttpResponse {
    let Ok(claims) = refresh_claims(&req, &config) else {
        return HttpResponse::NoContent().finish();
    };

    // idempotent
    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Caller's profile", body = UserProfile),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn me(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, AttendanceError> {
    let profile = fetch_profile(pool.get_ref(), auth.user_id).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// Create a user account
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserReq,
    responses(
        (status = 201, description = "User created", body = UserProfile),
        (status = 400, description = "Missing fields or email already registered"),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(skip(auth, pool, payload), fields(admin_id = auth.user_id))]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateUserReq>,
) -> Result<HttpResponse, AttendanceError> {
    auth.require_admin()?;

    let payload = payload.into_inner();
    let name = payload.name.trim();
    let email = payload.email.trim().to_lowercase();
    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AttendanceError::validation(
            "Name, email, and password are required.",
        ));
    }
    if !email.contains('@') {
        return Err(AttendanceError::validation("Email address is not valid."));
    }

    let hashed = hash_password(&payload.password)?;
    let role = payload.role.unwrap_or(Role::User);

    let result = sqlx::query(
        r#"
        INSERT INTO users (name, email, password, role_id, employee_code, department, is_active)
        VALUES (?, ?, ?, ?, ?, ?, TRUE)
        "#,
    )
    .bind(name)
    .bind(&email)
    .bind(&hashed)
    .bind(role.id())
    .bind(&payload.employee_code)
    .bind(&payload.department)
    .execute(pool.get_ref())
    .await;

    let id = match result {
        Ok(r) => r.last_insert_id(),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(AttendanceError::validation("Email is already registered."));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = id, "User created");

    let profile = fetch_profile(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(profile))
}

async fn fetch_profile(pool: &MySqlPool, id: u64) -> Result<UserProfile, AttendanceError> {
    let sql = format!("{PROFILE_SELECT} WHERE id = ?");
    sqlx::query_as::<_, UserProfile>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AttendanceError::NotFound { entity: "User", id })
}

/// Admins may not lock themselves out.
fn ensure_not_self(auth: &AuthUser, id: u64) -> Result<(), AttendanceError> {
    if auth.user_id == id {
        return Err(AttendanceError::validation(
            "Cannot deactivate your own account.",
        ));
    }
    Ok(())
}

impl UpdateUserReq {
    fn into_update(self, id: u64) -> Result<SqlUpdate, AttendanceError> {
        let name = self.name.map(|n| n.trim().to_string());
        if name.as_deref().is_some_and(str::is_empty) {
            return Err(AttendanceError::validation("Name cannot be empty."));
        }
        let email = self.email.map(|e| e.trim().to_lowercase());
        if email.as_deref().is_some_and(|e| !e.contains('@')) {
            return Err(AttendanceError::validation("Email address is not valid."));
        }

        UpdateBuilder::new("users")
            .set_some("name", name)
            .set_some("email", email)
            .set_some("role_id", self.role.map(|r| r.id() as u64))
            .set_some("employee_code", self.employee_code)
            .set_some("department", self.department)
            .set_some("is_active", self.is_active)
            .build("id", id)
    }
}

/// List user accounts (admin)
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All accounts, newest first", body = UserList),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> Result<HttpResponse, AttendanceError> {
    auth.require_admin()?;

    let sql = format!("{PROFILE_SELECT} ORDER BY created_at DESC, id DESC");
    let users = sqlx::query_as::<_, UserProfile>(&sql)
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(UserList { users }))
}

/// Update a user account (admin)
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = u64, Path, description = "User ID")),
    request_body = UpdateUserReq,
    responses(
        (status = 200, description = "User updated", body = UserProfile),
        (status = 400, description = "Invalid fields, email taken, or self-deactivation"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(skip(auth, pool, payload), fields(admin_id = auth.user_id))]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateUserReq>,
) -> Result<HttpResponse, AttendanceError> {
    auth.require_admin()?;
    let id = path.into_inner();
    let payload = payload.into_inner();
    if payload.is_active == Some(false) {
        ensure_not_self(&auth, id)?;
    }

    fetch_profile(pool.get_ref(), id).await?;
    let update = payload.into_update(id)?;
    debug!(sql = %update.sql, user_id = id, "Updating user");

    match execute_update(pool.get_ref(), update).await {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(AttendanceError::validation("Email is already registered."));
        }
        Err(e) => return Err(e.into()),
    }

    info!(user_id = id, "User updated");
    Ok(HttpResponse::Ok().json(fetch_profile(pool.get_ref(), id).await?))
}

/// Deactivate a user account (admin, soft delete)
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = u64, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deactivated", body = MessageResponse),
        (status = 400, description = "Cannot deactivate your own account"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
#[instrument(skip(auth, pool), fields(admin_id = auth.user_id))]
pub async fn delete_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> Result<HttpResponse, AttendanceError> {
    auth.require_admin()?;
    let id = path.into_inner();
    ensure_not_self(&auth, id)?;
    fetch_profile(pool.get_ref(), id).await?;

    sqlx::query("UPDATE users SET is_active = FALSE WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    // outstanding refresh tokens die with the account
    sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = ? AND revoked = FALSE")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    info!(user_id = id, "User deactivated");
    Ok(HttpResponse::Ok().json(MessageResponse {
        message: "User deleted successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::db_utils::SqlValue;

    fn admin() -> AuthUser {
        AuthUser {
            user_id: 1,
            email: "admin@company.com".into(),
            name: "Admin".into(),
            role: Role::Admin,
        }
    }

    #[test]
    fn admins_cannot_deactivate_themselves() {
        assert!(matches!(
            ensure_not_self(&admin(), 1),
            Err(AttendanceError::Validation(_))
        ));
        assert!(ensure_not_self(&admin(), 2).is_ok());
    }

    #[test]
    fn user_patch_touches_only_given_fields() {
        let patch = UpdateUserReq {
            email: Some("  Jane@Company.COM ".into()),
            role: Some(Role::Admin),
            is_active: Some(false),
            ..Default::default()
        };
        let update = patch.into_update(7).unwrap();

        assert_eq!(
            update.sql,
            "UPDATE users SET email = ?, role_id = ?, is_active = ? WHERE id = ?"
        );
        assert_eq!(
            update.values,
            vec![
                SqlValue::String("jane@company.com".into()),
                SqlValue::U64(1),
                SqlValue::Bool(false),
                SqlValue::U64(7),
            ]
        );
    }

    #[test]
    fn user_patch_rejects_blank_name_bad_email_and_empty_body() {
        let blank = UpdateUserReq {
            name: Some("   ".into()),
            ..Default::default()
        };
        assert!(matches!(blank.into_update(1), Err(AttendanceError::Validation(_))));

        let bad_email = UpdateUserReq {
            email: Some("not-an-email".into()),
            ..Default::default()
        };
        assert!(matches!(bad_email.into_update(1), Err(AttendanceError::Validation(_))));

        assert!(matches!(
            UpdateUserReq::default().into_update(1),
            Err(AttendanceError::Validation(_))
        ));
    }
}
