//! Connection authentication.
//!
//! A credential (bearer token) is presented during the WebSocket upgrade and
//! resolved to a [`UserId`] before any session state exists. Validation sits
//! behind the [`Authenticator`] trait; [`JwtAuthenticator`] checks HS256
//! tokens signed with the shared secret from `[auth]`.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;
use thiserror::Error;

use crate::config::AuthConfig;
use crate::protocol::UserId;

/// Shortest secret accepted without an explicit override.
pub const MIN_SECRET_LEN: usize = 32;

/// Why a credential was refused.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    MissingCredential,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token has no subject")]
    MissingSubject,
}

impl AuthError {
    /// Get a static error code string for metrics labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidToken(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => "expired",
                jsonwebtoken::errors::ErrorKind::InvalidSignature => "bad_signature",
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => "bad_issuer",
                _ => "invalid_token",
            },
            Self::MissingSubject => "missing_subject",
        }
    }
}

/// Resolves a presented credential to the user it belongs to.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, credential: &str) -> Result<UserId, AuthError>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(alias = "user_id")]
    sub: String,
}

/// HS256 JWT validator.
pub struct JwtAuthenticator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }
        Self {
            key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, credential: &str) -> Result<UserId, AuthError> {
        if credential.is_empty() {
            return Err(AuthError::MissingCredential);
        }
        let data = decode::<Claims>(credential, &self.key, &self.validation)?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::MissingSubject);
        }
        Ok(UserId::from(data.claims.sub))
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}
