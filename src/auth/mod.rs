//! Caller identity.
//!
//! Every catalog operation is scoped by the user id an [`IdentityProvider`]
//! resolves from an opaque bearer token. Unresolvable tokens mean "no user".

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;
use crate::{DriveError, Result};

/// Resolves bearer tokens to stable user identifiers.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The user behind `token`, or `None` if it cannot be verified.
    async fn verify(&self, token: &str) -> Option<String>;
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Expiration timestamp.
    pub exp: u64,
    /// Email, when the issuer includes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// HS256 JWT verification with a shared secret.
pub struct JwtIdentityProvider {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    /// Create a provider from a secret key, optionally requiring an audience.
    pub fn new(secret: &str, audience: Option<&str>) -> Self {
        let decoding_key = DecodingKey::from_secret(secret.as_bytes());
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }

        Self {
            decoding_key,
            validation,
        }
    }

    /// Create a provider from the `[auth]` config section.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        if config.jwt_secret.is_empty() {
            return Err(DriveError::Config("auth.jwt_secret is not set".to_string()));
        }
        Ok(Self::new(&config.jwt_secret, config.audience.as_deref()))
    }

    /// Decode and validate `token`.
    pub fn claims(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) if !data.claims.sub.is_empty() => Some(data.claims),
            Ok(_) => None,
            Err(e) => {
                debug!("JWT validation failed: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn verify(&self, token: &str) -> Option<String> {
        self.claims(token).map(|c| c.sub)
    }
}

/// Extract a bearer token from an `Authorization` header value or a
/// `token=` query parameter, header first.
pub fn bearer_token(authorization: Option<&str>, query: Option<&str>) -> Option<String> {
    let from_header = authorization
        .and_then(|h| h.trim().strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    if from_header.is_some() {
        return from_header;
    }

    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != "token" {
            return None;
        }
        urlencoding::decode(value)
            .ok()
            .map(|s| s.into_owned())
            .filter(|t| !t.is_empty())
    })
}

/// Resolve the caller of a request, failing with [`DriveError::Auth`].
pub async fn authenticate<P: IdentityProvider + ?Sized>(
    provider: &P,
    authorization: Option<&str>,
    query: Option<&str>,
) -> Result<String> {
    let token = bearer_token(authorization, query)
        .ok_or_else(|| DriveError::Auth("missing authorization".to_string()))?;
    provider
        .verify(&token)
        .await
        .ok_or_else(|| DriveError::Auth("invalid or expired token".to_string()))
}
