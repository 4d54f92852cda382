//! Admin account models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored admin credential record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCredential {
    /// Row ID
    pub id: i64,

    /// Login name (unique, case-sensitive)
    pub username: String,

    /// Encoded password hash; format is sniffed at verification time
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,

    /// When the admin was provisioned
    pub created_at: Option<DateTime<Utc>>,
}

impl AdminCredential {
    /// Create a credential record
    pub fn new(id: i64, username: impl Into<String>, password_hash: Option<String>) -> Self {
        Self {
            id,
            username: username.into(),
            password_hash,
            created_at: Some(Utc::now()),
        }
    }
}

/// Body of `POST /setup-admin`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SetupAdminRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}
