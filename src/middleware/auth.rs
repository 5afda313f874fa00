use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, models::CartOwner, state::AppState};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_PAYMENT_GATEWAY: &str = "payment_gateway";

pub const SESSION_HEADER: &str = "x-session-id";

/// Claims of the bearer tokens issued by the surrounding auth service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

pub fn ensure_any_role(user: &AuthUser, roles: &[&str]) -> Result<(), AppError> {
    if !roles.contains(&user.role.as_str()) {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_any_role(user, &[ROLE_ADMIN])
}

/// Signs a token the extractors accept. Used by tooling and tests.
pub fn issue_token(secret: &str, user_id: Uuid, role: &str, ttl_secs: i64) -> Result<String, AppError> {
    let exp = usize::try_from(Utc::now().timestamp() + ttl_secs)
        .map_err(|err| AppError::Internal(err.into()))?;
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|err| AppError::Internal(err.into()))
}

fn bearer_user(parts: &Parts, secret: &str) -> Result<Option<AuthUser>, AppError> {
    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let auth_str = auth_header.to_str().map_err(|_| AppError::Unauthorized)?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;

    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|err| {
        tracing::debug!(error = %err, "bearer token rejected");
        AppError::Unauthorized
    })?;

    let user_id = Uuid::parse_str(&decoded.claims.sub).map_err(|_| AppError::Unauthorized)?;
    Ok(Some(AuthUser {
        user_id,
        role: decoded.claims.role,
    }))
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        bearer_user(parts, &state.config.jwt_secret)?.ok_or(AppError::Unauthorized)
    }
}

/// The guest session id from `x-session-id`.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

fn session_id(parts: &Parts) -> Result<Option<SessionId>, AppError> {
    let Some(value) = parts.headers.get(SESSION_HEADER) else {
        return Ok(None);
    };
    let session = value
        .to_str()
        .map_err(|_| AppError::BadRequest("invalid x-session-id header".into()))?
        .trim();
    if session.is_empty() || session.len() > 128 {
        return Err(AppError::BadRequest("invalid x-session-id header".into()));
    }
    Ok(Some(SessionId(session.to_string())))
}

impl<S> FromRequestParts<S> for SessionId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_id(parts)?.ok_or_else(|| AppError::BadRequest("missing x-session-id header".into()))
    }
}

/// Whose cart a request addresses: the bearer user when a token is sent,
/// otherwise the guest session.
#[derive(Debug, Clone)]
pub struct CurrentCart(pub CartOwner);

impl FromRequestParts<AppState> for CurrentCart {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = bearer_user(parts, &state.config.jwt_secret)? {
            return Ok(CurrentCart(CartOwner::User(user.user_id)));
        }
        match session_id(parts)? {
            Some(SessionId(session)) => Ok(CurrentCart(CartOwner::Guest(session))),
            None => Err(AppError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/api/cart");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn issued_token_round_trips() {
        let user_id = Uuid::new_v4();
        let token = issue_token("secret", user_id, ROLE_ADMIN, 60).unwrap();
        let bearer = format!("Bearer {token}");

        let user = bearer_user(&parts(&[("authorization", &bearer)]), "secret")
            .unwrap()
            .unwrap();
        assert_eq!(user.user_id, user_id);
        assert!(user.is_admin());
    }

    #[test]
    fn token_signed_with_other_secret_is_unauthorized() {
        let token = issue_token("one", Uuid::new_v4(), "user", 60).unwrap();
        let bearer = format!("Bearer {token}");

        let result = bearer_user(&parts(&[("authorization", &bearer)]), "two");
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[test]
    fn blank_session_header_is_rejected() {
        assert!(session_id(&parts(&[("x-session-id", "  ")])).is_err());
        assert!(session_id(&parts(&[])).unwrap().is_none());
    }

    #[test]
    fn gateway_role_passes_payment_guard() {
        let gateway = AuthUser {
            user_id: Uuid::new_v4(),
            role: ROLE_PAYMENT_GATEWAY.into(),
        };
        assert!(ensure_any_role(&gateway, &[ROLE_ADMIN, ROLE_PAYMENT_GATEWAY]).is_ok());
        assert!(matches!(ensure_admin(&gateway), Err(AppError::Forbidden)));
    }
}
