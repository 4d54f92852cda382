//! Authentication system for productivity-api
//!
//! This module provides authentication and session functionality:
//! - Password verification across stored hash formats
//! - Signed session token issuance and validation
//! - Token revocation on logout
//! - Rate limiting for failed logins

pub mod credentials;
pub mod manager;
pub mod ratelimit;
pub mod revocation;
pub mod session;

pub use credentials::{hash_password, verify_password, HashError, DEFAULT_PBKDF2_ROUNDS};
pub use manager::AuthManager;
pub use ratelimit::{RateLimitConfig, RateLimiter};
pub use revocation::{spawn_sweeper, RevocationRegistry};
pub use session::TokenAuthority;
