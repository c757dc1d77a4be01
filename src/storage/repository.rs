use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Amount, AuditAction, AuditEntry, LoanApplication, LoanId, LoanPurpose, LoanQuote, LoanStatus,
    Role, User, UserId,
};

use super::MIGRATION_001_INITIAL;

/// Application counts and requested total, straight from the loans table.
#[derive(Debug, Clone, Default)]
pub struct LoanStatusCounts {
    pub total: i64,
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub total_amount: Amount,
}

/// Helper struct for per-purpose aggregation
#[derive(Debug, Clone)]
pub struct PurposeAggregate {
    pub purpose: LoanPurpose,
    pub count: i64,
    pub total_amount: Amount,
}

/// Profile fields a user may change. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub pan: Option<String>,
}

const USER_COLUMNS: &str = "id, name, email, phone, pan, role, password_hash, created_at";

const LOAN_COLUMNS: &str = "id, user_id, applicant_name, applicant_email, purpose, principal, annual_rate_percent, term_months, monthly_payment, total_payment, total_interest, status, created_at, updated_at";

/// Repository for persisting and querying users, loan applications and the audit log.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations. The schema is idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // User operations
    // ========================

    /// Insert a user. Returns false if the email is already taken.
    pub async fn save_user(&self, user: &User) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, email, phone, pan, role, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.pan)
        .bind(user.role.as_str())
        .bind(&user.password_hash)
        .bind(timestamp(user.created_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e).context("Failed to save user"),
        }
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Look up by email. The caller passes an already normalized address.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by email")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// List users, newest first, optionally restricted to one role.
    pub async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        let rows = match role {
            Some(role) => {
                sqlx::query(&format!(
                    "SELECT {USER_COLUMNS} FROM users WHERE role = ? ORDER BY created_at DESC, rowid DESC"
                ))
                .bind(role.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC, rowid DESC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    pub async fn count_users(&self, role: Role) -> Result<i64> {
        let count: i64 = sqlx::query("SELECT COUNT(*) as count FROM users WHERE role = ?")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count users")?
            .get("count");
        Ok(count)
    }

    /// Apply profile changes and return the updated user, or `None` if it does not exist.
    pub async fn update_profile(&self, id: UserId, changes: &ProfileChanges) -> Result<Option<User>> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = COALESCE(?, name),
                phone = COALESCE(?, phone),
                pan = COALESCE(?, pan)
            WHERE id = ?
            "#,
        )
        .bind(&changes.name)
        .bind(&changes.phone)
        .bind(&changes.pan)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update profile")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_user(id).await
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let role_str: String = row.get("role");
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
            name: row.get("name"),
            email: row.get("email"),
            phone: row.get("phone"),
            pan: row.get("pan"),
            role: Role::from_str(&role_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid role: {}", role_str))?,
            password_hash: row.get("password_hash"),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
        })
    }

    // ========================
    // Loan operations
    // ========================

    /// Insert a new application together with its quote in one statement.
    pub async fn save_loan(&self, loan: &LoanApplication) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO loans ({LOAN_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(loan.id.to_string())
        .bind(loan.user_id.to_string())
        .bind(&loan.applicant_name)
        .bind(&loan.applicant_email)
        .bind(loan.purpose.as_str())
        .bind(loan.quote.principal)
        .bind(loan.quote.annual_rate_percent.to_string())
        .bind(i64::from(loan.quote.term_months))
        .bind(loan.quote.monthly_payment)
        .bind(loan.quote.total_payment)
        .bind(loan.quote.total_interest)
        .bind(loan.status.as_str())
        .bind(timestamp(loan.created_at))
        .bind(timestamp(loan.updated_at))
        .execute(&self.pool)
        .await
        .context("Failed to save loan")?;
        Ok(())
    }

    pub async fn get_loan(&self, id: LoanId) -> Result<Option<LoanApplication>> {
        let row = sqlx::query(&format!("SELECT {LOAN_COLUMNS} FROM loans WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch loan")?;

        row.as_ref().map(Self::row_to_loan).transpose()
    }

    /// All applications of one user, newest first.
    pub async fn list_loans_for_user(&self, user_id: UserId) -> Result<Vec<LoanApplication>> {
        let rows = sqlx::query(&format!(
            "SELECT {LOAN_COLUMNS} FROM loans WHERE user_id = ? ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list loans for user")?;

        rows.iter().map(Self::row_to_loan).collect()
    }

    /// All applications, newest first, optionally filtered by status.
    pub async fn list_loans(&self, status: Option<LoanStatus>) -> Result<Vec<LoanApplication>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {LOAN_COLUMNS} FROM loans WHERE status = ? ORDER BY created_at DESC, rowid DESC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {LOAN_COLUMNS} FROM loans ORDER BY created_at DESC, rowid DESC"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list loans")?;

        rows.iter().map(Self::row_to_loan).collect()
    }

    /// Set a loan's status and append the audit entry atomically.
    /// Only `status` and `updated_at` are written; the quote columns are never touched.
    /// Returns false if the loan does not exist.
    pub async fn update_loan_status(
        &self,
        loan_id: LoanId,
        status: LoanStatus,
        updated_at: DateTime<Utc>,
        entry: &AuditEntry,
    ) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin status update")?;

        let result = sqlx::query("UPDATE loans SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(timestamp(updated_at))
            .bind(loan_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to update loan status")?;

        if result.rows_affected() == 0 {
            tx.rollback().await.context("Failed to roll back status update")?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO audit_log (id, admin_id, action, loan_id, details, timestamp)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.admin_id.to_string())
        .bind(entry.action.as_str())
        .bind(entry.loan_id.to_string())
        .bind(&entry.details)
        .bind(timestamp(entry.timestamp))
        .execute(&mut *tx)
        .await
        .context("Failed to write audit entry")?;

        tx.commit().await.context("Failed to commit status update")?;
        Ok(true)
    }

    fn row_to_loan(row: &sqlx::sqlite::SqliteRow) -> Result<LoanApplication> {
        let id_str: String = row.get("id");
        let user_id_str: String = row.get("user_id");
        let purpose_str: String = row.get("purpose");
        let rate_str: String = row.get("annual_rate_percent");
        let term_months: i64 = row.get("term_months");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        let quote = LoanQuote {
            principal: row.get("principal"),
            annual_rate_percent: Decimal::from_str(&rate_str)
                .with_context(|| format!("Invalid stored rate: {}", rate_str))?,
            term_months: u32::try_from(term_months).context("Invalid stored term")?,
            monthly_payment: row.get("monthly_payment"),
            total_payment: row.get("total_payment"),
            total_interest: row.get("total_interest"),
        };

        Ok(LoanApplication {
            id: Uuid::parse_str(&id_str).context("Invalid loan ID")?,
            user_id: Uuid::parse_str(&user_id_str).context("Invalid loan user ID")?,
            applicant_name: row.get("applicant_name"),
            applicant_email: row.get("applicant_email"),
            purpose: LoanPurpose::from_str(&purpose_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid purpose: {}", purpose_str))?,
            quote,
            status: LoanStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid status: {}", status_str))?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            updated_at: parse_timestamp(&updated_at_str).context("Invalid updated_at timestamp")?,
        })
    }

    // ========================
    // Aggregates
    // ========================

    pub async fn loan_status_counts(&self) -> Result<LoanStatusCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) as pending,
                COALESCE(SUM(CASE WHEN status = 'approved' THEN 1 ELSE 0 END), 0) as approved,
                COALESCE(SUM(CASE WHEN status = 'rejected' THEN 1 ELSE 0 END), 0) as rejected,
                COALESCE(SUM(principal), 0) as total_amount
            FROM loans
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to count loans")?;

        Ok(LoanStatusCounts {
            total: row.get("total"),
            pending: row.get("pending"),
            approved: row.get("approved"),
            rejected: row.get("rejected"),
            total_amount: row.get("total_amount"),
        })
    }

    /// Application count and requested amount per purpose, largest amount first.
    pub async fn purpose_breakdown(&self) -> Result<Vec<PurposeAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT purpose, COUNT(*) as count, COALESCE(SUM(principal), 0) as total_amount
            FROM loans
            GROUP BY purpose
            ORDER BY total_amount DESC, purpose
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to aggregate loans by purpose")?;

        rows.iter()
            .map(|row| {
                let purpose_str: String = row.get("purpose");
                Ok(PurposeAggregate {
                    purpose: LoanPurpose::from_str(&purpose_str)
                        .ok_or_else(|| anyhow::anyhow!("Invalid purpose: {}", purpose_str))?,
                    count: row.get("count"),
                    total_amount: row.get("total_amount"),
                })
            })
            .collect()
    }

    // ========================
    // Audit log
    // ========================

    /// Audit entries, oldest first, optionally for a single loan.
    pub async fn list_audit_entries(&self, loan_id: Option<LoanId>) -> Result<Vec<AuditEntry>> {
        let rows = match loan_id {
            Some(id) => {
                sqlx::query(
                    "SELECT id, admin_id, action, loan_id, details, timestamp FROM audit_log WHERE loan_id = ? ORDER BY timestamp, rowid",
                )
                .bind(id.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, admin_id, action, loan_id, details, timestamp FROM audit_log ORDER BY timestamp, rowid",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to list audit entries")?;

        rows.iter()
            .map(|row| {
                let id_str: String = row.get("id");
                let admin_id_str: String = row.get("admin_id");
                let action_str: String = row.get("action");
                let loan_id_str: String = row.get("loan_id");
                let timestamp_str: String = row.get("timestamp");

                Ok(AuditEntry {
                    id: Uuid::parse_str(&id_str).context("Invalid audit ID")?,
                    admin_id: Uuid::parse_str(&admin_id_str).context("Invalid admin ID")?,
                    action: AuditAction::from_str(&action_str)
                        .ok_or_else(|| anyhow::anyhow!("Invalid audit action: {}", action_str))?,
                    loan_id: Uuid::parse_str(&loan_id_str).context("Invalid audit loan ID")?,
                    details: row.get("details"),
                    timestamp: parse_timestamp(&timestamp_str)
                        .context("Invalid audit timestamp")?,
                })
            })
            .collect()
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
