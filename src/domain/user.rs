use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Borrower: applies for loans and sees only their own
    User,
    /// Reviewer: sees every application and decides them
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Always stored lower-cased
    pub email: String,
    pub phone: String,
    pub pan: Option<String>,
    pub role: Role,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        name: impl Into<String>,
        email: &str,
        phone: impl Into<String>,
        role: Role,
        password_hash: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: normalize_email(email),
            phone: phone.into(),
            pan: None,
            role,
            password_hash,
            created_at: Utc::now(),
        }
    }

    pub fn with_pan(mut self, pan: impl Into<String>) -> Self {
        self.pan = Some(pan.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
