//! Actor identity from bearer credentials.
//!
//! Tokens are issued elsewhere; this side only verifies them and binds the
//! subject id to the request or socket.

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id as UUID string)
    pub sub: String,
    pub exp: i64,
}

pub trait IdentityVerifier: Send + Sync {
    /// Resolve a credential to the actor's user id.
    fn verify(&self, token: &str) -> Result<Uuid, AppError>;
}

/// RS256 access-token validation.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn from_rsa_pem(public_key_pem: &str) -> Result<Self, AppError> {
        let key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|e| AppError::Config(format!("failed to parse RSA public key: {e}")))?;
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["sub", "exp"]);
        Ok(Self { key, validation })
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Uuid, AppError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            AppError::Unauthorized
        })?;
        Uuid::parse_str(&data.claims.sub).map_err(|_| AppError::Unauthorized)
    }
}

/// Shared verifier handle kept in app data.
pub type SharedVerifier = Arc<dyn IdentityVerifier>;

pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Represents an authenticated user extracted from a verified bearer token
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: Uuid,
}

impl FromRequest for User {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = match req.app_data::<web::Data<SharedVerifier>>() {
            None => {
                tracing::error!("no identity verifier registered");
                Err(AppError::Internal)
            }
            Some(verifier) => bearer_token(req)
                .ok_or(AppError::Unauthorized)
                .and_then(|token| verifier.verify(token))
                .map(|id| User { id }),
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/jwt_test_private.pem");
    const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/jwt_test_public.pem");

    fn token(sub: &str, exp_offset_secs: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: chrono::Utc::now().timestamp() + exp_offset_secs,
        };
        let key = EncodingKey::from_rsa_pem(PRIVATE_PEM.as_bytes()).unwrap();
        encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap()
    }

    fn verifier() -> JwtVerifier {
        JwtVerifier::from_rsa_pem(PUBLIC_PEM).unwrap()
    }

    #[test]
    fn test_valid_token_yields_subject() {
        let id = Uuid::new_v4();
        assert_eq!(verifier().verify(&token(&id.to_string(), 600)).unwrap(), id);
    }

    #[test]
    fn test_expired_token_rejected() {
        let id = Uuid::new_v4();
        assert_eq!(
            verifier().verify(&token(&id.to_string(), -3600)),
            Err(AppError::Unauthorized)
        );
    }

    #[test]
    fn test_non_uuid_subject_rejected() {
        assert_eq!(
            verifier().verify(&token("alice", 600)),
            Err(AppError::Unauthorized)
        );
    }

    #[test]
    fn test_hs256_token_rejected() {
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            exp: chrono::Utc::now().timestamp() + 600,
        };
        let forged = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(PUBLIC_PEM.as_bytes()),
        )
        .unwrap();
        assert_eq!(verifier().verify(&forged), Err(AppError::Unauthorized));
    }

    #[test]
    fn test_bad_pem_is_config_error() {
        assert!(matches!(
            JwtVerifier::from_rsa_pem("not a key"),
            Err(AppError::Config(_))
        ));
    }

    #[actix_web::test]
    async fn test_user_extractor() {
        let id = Uuid::new_v4();
        let shared: SharedVerifier = Arc::new(verifier());
        let data = web::Data::new(shared);

        let req = TestRequest::default()
            .app_data(data.clone())
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token(&id.to_string(), 600))))
            .to_http_request();
        let user = User::extract(&req).await.unwrap();
        assert_eq!(user.id, id);

        let anonymous = TestRequest::default().app_data(data).to_http_request();
        assert_eq!(
            User::extract(&anonymous).await.unwrap_err(),
            AppError::Unauthorized
        );
    }
}
