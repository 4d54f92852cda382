//! Employee productivity records
//!
//! Request bodies deserialize every field as optional so that missing fields
//! produce a 400 with a readable message instead of a serde rejection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored productivity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub role: String,
    pub productivity: i64,
    pub feedback: String,
    pub rating: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A validated record ready to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmployee {
    pub name: String,
    pub role: String,
    pub productivity: i64,
    pub feedback: String,
    pub rating: Option<i64>,
}

impl NewEmployee {
    /// Create a record with default productivity and empty feedback
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            productivity: 0,
            feedback: String::new(),
            rating: None,
        }
    }

    /// Set the productivity score
    pub fn with_productivity(mut self, productivity: i64) -> Self {
        self.productivity = productivity;
        self
    }

    /// Set the rating
    pub fn with_rating(mut self, rating: i64) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// Body of `POST /add`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AddEmployeeRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub productivity: Option<i64>,
    pub feedback: Option<String>,
    pub rating: Option<i64>,
}

impl AddEmployeeRequest {
    /// Check required fields and fill in defaults
    pub fn validate(self) -> Result<NewEmployee, String> {
        let name = non_blank(self.name).ok_or("Missing name or role")?;
        let role = non_blank(self.role).ok_or("Missing name or role")?;

        Ok(NewEmployee {
            name,
            role,
            productivity: self.productivity.unwrap_or(0),
            feedback: self.feedback.unwrap_or_default(),
            rating: self.rating,
        })
    }
}

/// Body of `PUT /employee/{id}`; absent fields keep their stored value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeUpdate {
    pub name: Option<String>,
    pub role: Option<String>,
    pub productivity: Option<i64>,
    pub feedback: Option<String>,
    pub rating: Option<i64>,
}

impl EmployeeUpdate {
    /// True when the update would change nothing
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.role.is_none()
            && self.productivity.is_none()
            && self.feedback.is_none()
            && self.rating.is_none()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
