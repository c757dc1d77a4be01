use serde::{Deserialize, Serialize};

use crate::domain::{Amount, LoanPurpose};

/// Dashboard numbers for administrators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_applications: i64,
    pub pending_loans: i64,
    pub approved_loans: i64,
    pub rejected_loans: i64,
    /// Sum of requested principals across every application
    pub total_amount: Amount,
    /// Approved share of all applications, in percent with two decimals
    pub approval_rate: f64,
    /// Registered borrowers (admins excluded)
    pub total_users: i64,
    pub by_purpose: Vec<PurposeSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurposeSummary {
    pub purpose: LoanPurpose,
    pub count: i64,
    pub total_amount: Amount,
    pub percentage: f64,
}

/// `approved / total * 100`, rounded to two decimals; zero when there are no applications.
pub fn approval_rate(approved: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round2(approved as f64 / total as f64 * 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
