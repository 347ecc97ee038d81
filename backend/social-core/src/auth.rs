//! Bearer-token verification collaborator.
//!
//! Invoked by the surface layer before any mutation reaches the core;
//! components themselves only ever see verified subject ids.

use crate::config::AuthConfig;
use crate::error::{CoreError, CoreResult};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// Resolves a bearer credential to a verified subject identifier
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, authorization: &str) -> CoreResult<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// HS256 verifier over a shared secret
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, authorization: &str) -> CoreResult<String> {
        if authorization.is_empty() {
            return Err(CoreError::Unauthenticated(
                "missing authorization header".to_string(),
            ));
        }
        let token = authorization
            .strip_prefix("Bearer ")
            .unwrap_or(authorization);

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| CoreError::Unauthenticated(format!("invalid token: {}", e)))?;
        Ok(data.claims.sub)
    }
}
