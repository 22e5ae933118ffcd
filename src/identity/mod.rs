//! Identity Resolution
//!
//! Turns the opaque token presented at upgrade time into a stable subject
//! plus a display name. A failure here rejects the connection before the
//! WebSocket handshake completes.

mod directory;
mod token;

pub use directory::{DirectoryError, InMemoryUserDirectory, UserDirectory};
pub use token::TokenVerifier;

use async_trait::async_trait;
use std::sync::Arc;

/// Display name used when the directory has no entry for a subject
pub const UNKNOWN_USER: &str = "Unknown User";

/// A resolved participant identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable subject identifier (the user's email)
    pub subject: String,
    /// Human-readable name
    pub display_name: String,
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization token required")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Invalid token claims")]
    InvalidClaims,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Resolves identity tokens
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Resolver backed by JWT verification and a user directory
pub struct JwtIdentityResolver {
    verifier: Arc<TokenVerifier>,
    directory: Arc<dyn UserDirectory>,
}

impl JwtIdentityResolver {
    pub fn new(verifier: Arc<TokenVerifier>, directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            verifier,
            directory,
        }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Identity, AuthError> {
        let subject = self.verifier.verify(token)?;

        let display_name = match self.directory.display_name(&subject).await {
            Ok(Some(name)) => name,
            Ok(None) => {
                tracing::warn!(subject = %subject, "Subject not found in user directory");
                UNKNOWN_USER.to_string()
            }
            Err(e) => {
                tracing::warn!(subject = %subject, error = %e, "User directory lookup failed");
                UNKNOWN_USER.to_string()
            }
        };

        Ok(Identity {
            subject,
            display_name,
        })
    }
}

/// Extract the token from a `Bearer` authorization header value
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
