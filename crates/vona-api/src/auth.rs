//! Bearer token authentication
//!
//! Shopper tokens are issued by the storefront backend and signed with a
//! shared HS256 secret. Only the `userId` claim is used.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

/// JWT claims
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Shopper id, absent for anonymous storefront sessions
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Expiration time, checked only when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

impl Claims {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            exp: None,
        }
    }

    pub fn with_expiry(mut self, exp: u64) -> Self {
        self.exp = Some(exp);
        self
    }
}

/// Caller identity extracted from a valid token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Option<String>,
}

impl AuthUser {
    /// The user id, or 401 when the token carried none
    pub fn require(&self) -> Result<&str, AppError> {
        self.user_id
            .as_deref()
            .ok_or_else(|| AppError::Unauthorized("Unauthorized: userId missing".to_string()))
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id.filter(|id| !id.trim().is_empty()),
        }
    }
}

/// Verify a token and return its claims
pub fn decode_token(token: &str, secret: &str) -> jsonwebtoken::errors::Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
}

/// Sign claims with the shared secret
pub fn encode_token(claims: &Claims, secret: &str) -> jsonwebtoken::errors::Result<String> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Token of a `Bearer` authorization header; the scheme is case-insensitive
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// JWT authentication middleware
///
/// Inserts an [`AuthUser`] into the request extensions. Requests without a
/// Bearer token, or with one that fails verification, get 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token);

    let Some(token) = token else {
        return AppError::Unauthorized("Missing or invalid authorization header".to_string())
            .into_response();
    };

    match decode_token(token, &state.config.auth.jwt_secret) {
        Ok(claims) => {
            let user = AuthUser::from(claims);
            debug!(user_id = ?user.user_id, "Token verified");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => AppError::Unauthorized(format!("Invalid token: {e}")).into_response(),
    }
}

/// Count every request for `/metrics`
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    state.increment_requests();
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip_without_exp() {
        let token = encode_token(&Claims::for_user("u1"), SECRET).unwrap();
        let claims = decode_token(&token, SECRET).unwrap();
        assert_eq!(claims.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = encode_token(&Claims::for_user("u1"), SECRET).unwrap();
        assert!(decode_token(&token, "other").is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let claims = Claims::for_user("u1").with_expiry(1_000);
        let token = encode_token(&claims, SECRET).unwrap();
        assert!(decode_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_bearer_scheme_is_case_insensitive() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), Some("abc"));
        assert_eq!(bearer_token("BEARER  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("abc"), None);
    }

    #[test]
    fn test_blank_user_id_is_anonymous() {
        let user = AuthUser::from(Claims::for_user("  "));
        assert!(user.user_id.is_none());
        assert!(user.require().is_err());
    }
}
