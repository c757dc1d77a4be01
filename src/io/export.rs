use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::LoanService;
use crate::domain::{AuditEntry, LoanApplication, LoanStatus, User};

/// Full dump of the lending book.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanBookSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub users: Vec<User>,
    pub loans: Vec<LoanApplication>,
    pub audit_log: Vec<AuditEntry>,
}

/// Writes service data out as CSV or JSON.
pub struct Exporter<'a> {
    service: &'a LoanService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LoanService) -> Self {
        Self { service }
    }

    /// Export loan applications to CSV, optionally filtered by status.
    pub async fn export_loans_csv<W: Write>(
        &self,
        writer: W,
        status: Option<LoanStatus>,
    ) -> Result<usize> {
        let loans = self.service.list_all_loans(status).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "created_at",
            "updated_at",
            "status",
            "applicant_name",
            "applicant_email",
            "purpose",
            "amount",
            "term_months",
            "annual_rate_percent",
            "monthly_payment",
            "total_payment",
            "total_interest",
        ])?;

        for loan in &loans {
            csv_writer.write_record([
                loan.id.to_string(),
                loan.created_at.to_rfc3339(),
                loan.updated_at.to_rfc3339(),
                loan.status.as_str().to_string(),
                loan.applicant_name.clone(),
                loan.applicant_email.clone(),
                loan.purpose.as_str().to_string(),
                loan.quote.principal.to_string(),
                loan.quote.term_months.to_string(),
                loan.quote.annual_rate_percent.to_string(),
                loan.quote.monthly_payment.to_string(),
                loan.quote.total_payment.to_string(),
                loan.quote.total_interest.to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(loans.len())
    }

    /// Export borrowers to CSV. Password hashes are never written.
    pub async fn export_users_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let users = self.service.list_users().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "name", "email", "phone", "pan", "created_at"])?;

        for user in &users {
            csv_writer.write_record([
                user.id.to_string(),
                user.name.clone(),
                user.email.clone(),
                user.phone.clone(),
                user.pan.clone().unwrap_or_default(),
                user.created_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(users.len())
    }

    pub async fn export_audit_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let entries = self.service.list_audit_log(None).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "timestamp", "admin_id", "action", "loan_id", "details"])?;

        for entry in &entries {
            csv_writer.write_record([
                entry.id.to_string(),
                entry.timestamp.to_rfc3339(),
                entry.admin_id.to_string(),
                entry.action.as_str().to_string(),
                entry.loan_id.to_string(),
                entry.details.clone().unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    pub async fn export_loans_json<W: Write>(
        &self,
        writer: W,
        status: Option<LoanStatus>,
    ) -> Result<usize> {
        let loans = self.service.list_all_loans(status).await?;
        write_json(writer, &loans)?;
        Ok(loans.len())
    }

    pub async fn export_users_json<W: Write>(&self, writer: W) -> Result<usize> {
        let users = self.service.list_users().await?;
        write_json(writer, &users)?;
        Ok(users.len())
    }

    /// Export users, loans and the audit trail as one JSON document.
    pub async fn export_snapshot_json<W: Write>(&self, writer: W) -> Result<LoanBookSnapshot> {
        let snapshot = LoanBookSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            users: self.service.list_users().await?,
            loans: self.service.list_all_loans(None).await?,
            audit_log: self.service.list_audit_log(None).await?,
        };

        write_json(writer, &snapshot)?;
        Ok(snapshot)
    }
}

fn write_json<W: Write, T: Serialize>(mut writer: W, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
