//! Session token issuance and validation
//!
//! Tokens are HS256 JWTs carrying [`Claims`]. A token is accepted when its
//! signature verifies, the current time is strictly before `exp`, and its
//! `jti` is not in the [`RevocationRegistry`]. Callers only ever see
//! `AuthError::InvalidToken`; the precise reason is logged at debug level.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use super::revocation::RevocationRegistry;
use crate::error::AuthError;
use crate::models::{Claims, Identity, IssuedToken};

const JTI_BYTES: usize = 16;

/// Signs and checks session tokens
pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    registry: Arc<RevocationRegistry>,
}

impl TokenAuthority {
    /// Create an authority signing with `secret`
    pub fn new(secret: &[u8], ttl: Duration, registry: Arc<RevocationRegistry>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            ttl,
            registry,
        }
    }

    /// Issue a fresh token for `identity`
    pub fn issue(&self, identity: &Identity) -> Result<IssuedToken, AuthError> {
        let iat = Utc::now().timestamp();
        let exp = i64::try_from(self.ttl.as_secs())
            .ok()
            .and_then(|ttl| iat.checked_add(ttl))
            .ok_or_else(|| AuthError::TokenIssue("token lifetime out of range".to_string()))?;
        let claims = Claims {
            sub: identity.username.clone(),
            admin_id: identity.admin_id,
            iat,
            exp,
            jti: generate_jti()?,
        };

        let token = self.sign(&claims)?;
        debug!(sub = %claims.sub, jti = %claims.jti, exp = claims.exp, "Issued session token");

        Ok(IssuedToken { token, claims })
    }

    /// Sign arbitrary claims with this authority's key
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenIssue(e.to_string()))
    }

    /// Validate a presented token and return its claims
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!(reason = %e, "Rejected session token");
                AuthError::InvalidToken
            })?
            .claims;

        // `exp` is exclusive; the decoder accepts `exp == now`
        if Utc::now().timestamp() >= claims.exp {
            debug!(jti = %claims.jti, reason = "expired", "Rejected session token");
            return Err(AuthError::InvalidToken);
        }

        if self.registry.is_revoked(&claims.jti) {
            debug!(jti = %claims.jti, reason = "revoked", "Rejected session token");
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }

    /// Revoke the token these claims came from
    pub fn revoke(&self, claims: &Claims) {
        self.registry.revoke(&claims.jti, claims.expires_at());
        debug!(jti = %claims.jti, "Revoked session token");
    }

    /// Configured token lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Registry consulted on every validation
    pub fn registry(&self) -> &Arc<RevocationRegistry> {
        &self.registry
    }
}

fn generate_jti() -> Result<String, AuthError> {
    let mut bytes = [0u8; JTI_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| AuthError::TokenIssue(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
