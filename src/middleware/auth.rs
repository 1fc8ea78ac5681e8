//! Bearer-token authentication for the wallet endpoints
//!
//! Tokens are HS256 JWTs issued elsewhere; the `sub` claim carries the user's UUID.

use crate::config::AuthConfig;
use crate::error::AppError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Claims this service reads from a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// Verifies tokens against the shared secret
#[derive(Clone)]
pub struct JwtVerifier {
    key: Arc<DecodingKey>,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self::from_secret(config.jwt_secret.as_bytes())
    }

    pub fn from_secret(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60;
        Self {
            key: Arc::new(DecodingKey::from_secret(secret)),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Uuid, AppError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::unauthorized("invalid token")
        })?;

        Uuid::parse_str(&data.claims.sub)
            .map_err(|_| AppError::unauthorized("token subject is not a user id"))
    }
}

/// Authenticated caller, resolved from `Authorization: Bearer <jwt>`
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl<S> FromRequestParts<S> for AuthUser
where
    JwtVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::unauthorized("missing authorization header"))?
            .to_str()
            .map_err(|_| AppError::unauthorized("malformed authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::unauthorized("expected bearer token"))?;

        let verifier = JwtVerifier::from_ref(state);
        let user_id = verifier.verify(token.trim())?;

        Ok(AuthUser { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &[u8], sub: &str, exp_offset: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset) as usize;
        encode(
            &Header::new(Algorithm::HS256),
            &Claims {
                sub: sub.to_string(),
                exp,
            },
            &EncodingKey::from_secret(secret),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_user_id() {
        let user_id = Uuid::new_v4();
        let verifier = JwtVerifier::from_secret(b"secret");
        let parsed = verifier
            .verify(&token(b"secret", &user_id.to_string(), 3600))
            .unwrap();
        assert_eq!(parsed, user_id);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = JwtVerifier::from_secret(b"secret");
        let err = verifier
            .verify(&token(b"other", &Uuid::new_v4().to_string(), 3600))
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn test_expired_token_rejected() {
        let verifier = JwtVerifier::from_secret(b"secret");
        assert!(verifier
            .verify(&token(b"secret", &Uuid::new_v4().to_string(), -3600))
            .is_err());
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        let verifier = JwtVerifier::from_secret(b"secret");
        assert!(verifier.verify(&token(b"secret", "alice", 3600)).is_err());
    }
}
