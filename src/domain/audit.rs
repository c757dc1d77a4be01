use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{LoanId, LoanStatus, UserId};

pub type AuditId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ApproveLoan,
    RejectLoan,
    UpdateLoan,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ApproveLoan => "APPROVE_LOAN",
            AuditAction::RejectLoan => "REJECT_LOAN",
            AuditAction::UpdateLoan => "UPDATE_LOAN",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "APPROVE_LOAN" => Some(AuditAction::ApproveLoan),
            "REJECT_LOAN" => Some(AuditAction::RejectLoan),
            "UPDATE_LOAN" => Some(AuditAction::UpdateLoan),
            _ => None,
        }
    }

    /// Action recorded when a loan is moved to `status`.
    pub fn for_status(status: LoanStatus) -> Self {
        match status {
            LoanStatus::Approved => AuditAction::ApproveLoan,
            LoanStatus::Rejected => AuditAction::RejectLoan,
            LoanStatus::Pending => AuditAction::UpdateLoan,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only record of an admin decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: AuditId,
    pub admin_id: UserId,
    pub action: AuditAction,
    pub loan_id: LoanId,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(admin_id: UserId, action: AuditAction, loan_id: LoanId) -> Self {
        Self {
            id: Uuid::new_v4(),
            admin_id,
            action,
            loan_id,
            details: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
