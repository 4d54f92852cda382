//! Session and login models
//!
//! Claims are the payload of the signed session token. `Identity` is what the
//! authentication layer hands to request handlers.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Session token claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the authenticated admin
    pub sub: String,

    /// Admin row ID, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<i64>,

    /// Issued-at, seconds since the epoch
    pub iat: i64,

    /// Expiry, seconds since the epoch (exclusive)
    pub exp: i64,

    /// Unique token ID, the revocation key
    pub jti: String,
}

impl Claims {
    /// Expiry as a timestamp
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Identity carried by these claims
    pub fn identity(&self) -> Identity {
        Identity {
            username: self.sub.clone(),
            admin_id: self.admin_id,
        }
    }
}

/// Who a request is authenticated as
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub admin_id: Option<i64>,
}

impl Identity {
    /// Identity with no admin ID attached
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            admin_id: None,
        }
    }

    /// Attach the admin row ID
    pub fn with_admin_id(mut self, id: i64) -> Self {
        self.admin_id = Some(id);
        self
    }
}

/// A freshly signed token and the claims inside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Body of `POST /login`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Successful login response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
}
