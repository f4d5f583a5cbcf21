use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Store,
    Courier,
}

/// Claims carried in the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_ids: Option<Vec<i64>>,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
    pub jti: String,
}

/// HS256 token service. Issuance here is claims-only (subject, role, store
/// membership); credential verification lives with an external directory.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    pub fn new(secret: &str, issuer: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
        }
    }

    pub fn create_token(
        &self,
        subject: i64,
        role: Role,
        store_ids: Option<Vec<i64>>,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            role,
            store_ids,
            exp: (now + Duration::hours(24)).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| AppError::Internal(format!("token encoding failed: {err}")))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AppError::Unauthorized("invalid token".to_string()))
    }
}

/// Authenticated caller, derived from verified token claims. The core
/// trusts these claims as-is.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: i64,
    pub role: Role,
    pub store_ids: Option<Vec<i64>>,
}

impl Identity {
    pub fn require_role(&self, role: Role) -> Result<(), AppError> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden("forbidden".to_string()))
        }
    }

    pub fn require_any_role(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden("forbidden".to_string()))
        }
    }
}

impl TryFrom<Claims> for Identity {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let subject = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Unauthorized("invalid token claims".to_string()))?;

        Ok(Self {
            subject,
            role: claims.role,
            store_ids: claims.store_ids,
        })
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing token".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("missing token".to_string()))?;

        let claims = state.jwt.verify_token(token)?;
        Identity::try_from(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_preserves_claims() {
        let service = JwtService::new("test-secret", "test-issuer");
        let token = service
            .create_token(42, Role::Store, Some(vec![1, 2]))
            .unwrap();

        let claims = service.verify_token(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.role, Role::Store);
        assert_eq!(claims.store_ids, Some(vec![1, 2]));

        let identity = Identity::try_from(claims).unwrap();
        assert_eq!(identity.subject, 42);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let issuing = JwtService::new("secret-a", "test-issuer");
        let verifying = JwtService::new("secret-b", "test-issuer");

        let token = issuing.create_token(1, Role::Courier, None).unwrap();
        assert!(verifying.verify_token(&token).is_err());
    }

    #[test]
    fn role_checks() {
        let identity = Identity {
            subject: 1,
            role: Role::Courier,
            store_ids: None,
        };

        assert!(identity.require_role(Role::Courier).is_ok());
        assert!(identity.require_role(Role::Admin).is_err());
        assert!(identity
            .require_any_role(&[Role::Store, Role::Courier])
            .is_ok());
    }
}
