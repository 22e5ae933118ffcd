//! Identity Tokens
//!
//! HMAC-signed JWTs carrying the participant's email as the subject.
//! One [`TokenVerifier`] is built from the configured secret and shared by
//! everything that needs to check or mint tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::AuthError;

/// Claims carried by an identity token
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    user_email: String,
    exp: i64,
}

/// Verifies and issues identity tokens from a single immutable secret
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenVerifier {
    /// Create a verifier; `ttl` applies to tokens minted with [`issue`](Self::issue)
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    /// Mint a token for `subject`
    pub fn issue(&self, subject: &str) -> Result<String, AuthError> {
        let claims = Claims {
            user_email: subject.to_string(),
            exp: (Utc::now() + self.ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Check signature and expiry, returning the subject
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        if data.claims.user_email.is_empty() {
            return Err(AuthError::InvalidClaims);
        }

        Ok(data.claims.user_email)
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
