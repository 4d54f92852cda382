//! Authentication manager
//!
//! This module provides the main authentication interface for the application.
//! It handles login, logout, bearer token validation and first-admin setup.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::database::Database;
use crate::error::{ApiError, AuthError};
use crate::models::{Claims, Identity, LoginResponse};

use super::credentials::{hash_password, verify_password};
use super::ratelimit::{RateLimitConfig, RateLimiter};
use super::revocation::RevocationRegistry;
use super::session::TokenAuthority;

/// Authentication manager
///
/// Owns the token authority and the login rate limiter, and reads admin
/// credentials through the database.
pub struct AuthManager<D: Database> {
    db: Arc<D>,
    tokens: TokenAuthority,
    rate_limiter: RateLimiter,
    pbkdf2_rounds: u32,
    /// Hash of a random password, checked when the account has none
    decoy_hash: Option<String>,
}

impl<D: Database> AuthManager<D> {
    /// Create a new authentication manager
    pub fn new(
        db: Arc<D>,
        tokens: TokenAuthority,
        rate_limit: RateLimitConfig,
        pbkdf2_rounds: u32,
    ) -> Self {
        let decoy = hex::encode(rand::random::<[u8; 16]>());
        Self {
            db,
            tokens,
            rate_limiter: RateLimiter::new(rate_limit),
            pbkdf2_rounds,
            decoy_hash: hash_password(&decoy, pbkdf2_rounds).ok(),
        }
    }

    /// Build from configuration
    ///
    /// Fails if no signing secret is configured.
    pub fn from_config(
        db: Arc<D>,
        config: &AuthConfig,
        registry: Arc<RevocationRegistry>,
    ) -> Result<Self, AuthError> {
        let secret = config
            .jwt_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AuthError::TokenIssue("auth.jwt_secret is not configured".to_string()))?;

        let tokens = TokenAuthority::new(
            secret.as_bytes(),
            Duration::from_secs(config.token_ttl_secs),
            registry,
        );

        Ok(Self::new(
            db,
            tokens,
            RateLimitConfig::from(&config.rate_limit),
            config.pbkdf2_rounds,
        ))
    }

    /// Check credentials and issue a session token
    ///
    /// Unknown users and wrong passwords fail the same way, and both cost
    /// one hash verification. Failed attempts count against the caller's
    /// address.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        ip: Option<IpAddr>,
    ) -> Result<LoginResponse, ApiError> {
        if let Some(ip) = ip {
            if let Some(remaining) = self.rate_limiter.blocked_for(ip) {
                warn!(
                    client_ip = %ip,
                    retry_after_secs = remaining.as_secs(),
                    "Login refused for blocked address"
                );
                return Err(AuthError::RateLimited.into());
            }
        }

        let admin = self.db.find_admin(username).await?;
        let (stored, has_hash) = match admin.as_ref().and_then(|a| a.password_hash.clone()) {
            Some(hash) => (Some(hash), true),
            None => (self.decoy_hash.clone(), false),
        };

        let plaintext = password.to_string();
        let matched =
            tokio::task::spawn_blocking(move || verify_password(&plaintext, stored.as_deref()))
                .await
                .map_err(|e| ApiError::Internal(format!("Password check panicked: {}", e)))?
                && has_hash;

        let admin = match admin {
            Some(admin) if matched => admin,
            _ => {
                if let Some(ip) = ip {
                    self.rate_limiter.record_failure(ip);
                }
                info!(username, "Login failed");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if let Some(ip) = ip {
            self.rate_limiter.reset(ip);
        }

        let identity = Identity::new(&admin.username).with_admin_id(admin.id);
        let issued = self.tokens.issue(&identity)?;
        info!(username = %admin.username, "Login succeeded");

        Ok(LoginResponse {
            token: issued.token,
            username: admin.username,
        })
    }

    /// Validate a bearer token
    pub fn authenticate(&self, token: &str) -> Result<Claims, AuthError> {
        self.tokens.validate(token)
    }

    /// Revoke the session the claims belong to
    ///
    /// Returns once the revocation is visible to every later request.
    pub fn logout(&self, claims: &Claims) {
        self.tokens.revoke(claims);
        info!(username = %claims.sub, "Logged out");
    }

    /// Create the first admin account
    ///
    /// Refused once any admin exists.
    pub async fn setup_admin(&self, username: &str, password: &str) -> Result<i64, ApiError> {
        let plaintext = password.to_string();
        let rounds = self.pbkdf2_rounds;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&plaintext, rounds))
            .await
            .map_err(|e| ApiError::Internal(format!("Password hashing panicked: {}", e)))?
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        match self.db.create_first_admin(username, &password_hash).await? {
            Some(id) => {
                info!(username, admin_id = id, "Admin account created");
                Ok(id)
            }
            None => Err(ApiError::Input("Admin already exists".to_string())),
        }
    }

    /// Check if an address is currently blocked from logging in
    pub fn is_rate_limited(&self, ip: IpAddr) -> bool {
        self.rate_limiter.is_blocked(ip)
    }

    /// Drop stale rate limiter entries
    pub fn cleanup_rate_limits(&self) -> usize {
        self.rate_limiter.cleanup()
    }

    /// The token authority backing this manager
    pub fn tokens(&self) -> &TokenAuthority {
        &self.tokens
    }
}
