/*!
 * # Authentication
 *
 * Bearer tokens are issued by the external identity provider and signed
 * with the shared HS256 secret. This module only verifies them and turns the
 * claims into request extractors:
 *
 * - [`AuthUser`] for any signed-in user
 * - [`AdminUser`] for routes restricted to the `admin` role
 */

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::services::customers::CustomerIdentity;
use crate::AppState;

pub const ADMIN_ROLE: &str = "admin";

/// Profile data carried in the token, used to name the gateway customer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
    pub iat: i64,
    pub exp: i64,
}

fn default_role() -> String {
    "user".to_string()
}

impl Claims {
    pub fn new(user_id: Uuid, email: impl Into<String>, role: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id.to_string(),
            email: Some(email.into()),
            role: role.into(),
            name: None,
            profile: None,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = Some(profile);
        self
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Access token required")]
    MissingToken,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Admin access required")]
    AdminRequired,
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AdminRequired => ServiceError::Forbidden(err.to_string()),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

/// HS256 verifier (and signer, for tooling and tests) over the shared secret
#[derive(Clone)]
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    debug!(error = %e, "rejected bearer token");
                    AuthError::InvalidToken
                }
            })
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, ServiceError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| ServiceError::InternalError(format!("token signing failed: {}", e)))
    }
}

/// Signed-in user, extracted from `Authorization: Bearer <jwt>`
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: String,
    pub profile: Option<UserProfile>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }

    pub fn identity(&self) -> CustomerIdentity {
        CustomerIdentity {
            user_id: self.user_id,
            email: self.email.clone(),
            profile: self.profile.clone(),
        }
    }
}

impl TryFrom<Claims> for AuthUser {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(Self {
            user_id,
            email: claims.email,
            name: claims.name,
            role: claims.role,
            profile: claims.profile,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let claims = state.auth.verify(token)?;
        Ok(AuthUser::try_from(claims)?)
    }
}

/// [`AuthUser`] whose role is `admin`
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthError::AdminRequired.into());
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    #[test]
    fn round_trips_claims_into_auth_user() {
        let verifier = JwtVerifier::new(SECRET);
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, "asha@example.com", "user", Duration::hours(1))
            .with_profile(UserProfile {
                full_name: Some("Asha Rao".into()),
                ..Default::default()
            });
        let token = verifier.sign(&claims).unwrap();

        let user = AuthUser::try_from(verifier.verify(&token).unwrap()).unwrap();
        assert_eq!(user.user_id, user_id);
        assert!(!user.is_admin());
        assert_eq!(user.identity().profile.unwrap().full_name.as_deref(), Some("Asha Rao"));
    }

    #[test]
    fn rejects_foreign_and_expired_tokens() {
        let user_id = Uuid::new_v4();
        let foreign = JwtVerifier::new("another-secret-that-is-also-long-enough")
            .sign(&Claims::new(user_id, "a@b.c", "user", Duration::hours(1)))
            .unwrap();
        assert_matches!(JwtVerifier::new(SECRET).verify(&foreign), Err(AuthError::InvalidToken));

        let verifier = JwtVerifier::new(SECRET);
        let expired = verifier
            .sign(&Claims::new(user_id, "a@b.c", "user", Duration::hours(-2)))
            .unwrap();
        assert_matches!(verifier.verify(&expired), Err(AuthError::TokenExpired));
    }

    #[test]
    fn auth_errors_map_to_401_and_403() {
        assert_matches!(ServiceError::from(AuthError::MissingToken), ServiceError::Unauthorized(_));
        assert_matches!(ServiceError::from(AuthError::AdminRequired), ServiceError::Forbidden(msg) if msg == "Admin access required");
    }
}
