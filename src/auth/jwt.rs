use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::{
    auth::auth::AuthUser,
    error::AttendanceError,
    models::{Claims, TokenType},
};

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

fn issue(
    user: &AuthUser,
    token_type: TokenType,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), AttendanceError> {
    let claims = Claims {
        user_id: user.user_id,
        sub: user.email.clone(),
        name: user.name.clone(),
        role: user.role.id(),
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AttendanceError::Internal(e.to_string()))?;

    Ok((token, claims))
}

pub fn generate_access_token(
    user: &AuthUser,
    secret: &str,
    ttl: usize,
) -> Result<String, AttendanceError> {
    issue(user, TokenType::Access, secret, ttl).map(|(token, _)| token)
}

/// Returns the claims too; the caller persists `jti` so the token can be revoked.
pub fn generate_refresh_token(
    user: &AuthUser,
    secret: &str,
    ttl: usize,
) -> Result<(String, Claims), AttendanceError> {
    issue(user, TokenType::Refresh, secret, ttl)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    fn jane() -> AuthUser {
        AuthUser {
            user_id: 3,
            email: "jane@company.com".into(),
            name: "Jane Doe".into(),
            role: Role::User,
        }
    }

    #[test]
    fn access_token_round_trips() {
        let token = generate_access_token(&jane(), "secret", 60).unwrap();
        let claims = verify_token(&token, "secret").unwrap();

        assert_eq!(claims.user_id, 3);
        assert_eq!(claims.sub, "jane@company.com");
        assert_eq!(claims.role, Role::User.id());
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, claims) = generate_refresh_token(&jane(), "secret", 60).unwrap();
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert!(verify_token(&token, "other").is_err());
    }
}
