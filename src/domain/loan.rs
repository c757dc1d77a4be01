use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, LoanPurpose, LoanQuote, UserId};

pub type LoanId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(LoanStatus::Pending),
            "approved" => Some(LoanStatus::Approved),
            "rejected" => Some(LoanStatus::Rejected),
            _ => None,
        }
    }

    /// A decided application is approved or rejected.
    pub fn is_decided(&self) -> bool {
        !matches!(self, LoanStatus::Pending)
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A submitted loan application.
///
/// The embedded quote is fixed at submission; only `status` and
/// `updated_at` change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplication {
    pub id: LoanId,
    pub user_id: UserId,
    /// Applicant name at submission time
    pub applicant_name: String,
    /// Applicant email at submission time
    pub applicant_email: String,
    pub purpose: LoanPurpose,
    pub quote: LoanQuote,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanApplication {
    pub fn new(
        user_id: UserId,
        applicant_name: impl Into<String>,
        applicant_email: impl Into<String>,
        purpose: LoanPurpose,
        quote: LoanQuote,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            applicant_name: applicant_name.into(),
            applicant_email: applicant_email.into(),
            purpose,
            quote,
            status: LoanStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn amount(&self) -> Amount {
        self.quote.principal
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}
