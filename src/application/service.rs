use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::domain::{
    normalize_email, Amount, AuditEntry, AuditAction, LoanApplication, LoanId, LoanPurpose,
    LoanQuote, LoanStatus, PurposeRateTable, Role, User, UserId,
};
use crate::storage::{ProfileChanges, Repository};

use super::auth::{hash_password, validate_password, verify_password, TokenSigner};
use super::reporting::{approval_rate, round2, AdminStats, PurposeSummary};
use super::AppError;

/// Bounds a submitted application must fall within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanLimits {
    pub min_amount: Amount,
    pub max_amount: Amount,
    pub min_term_months: u32,
    pub max_term_months: u32,
}

impl Default for LoanLimits {
    fn default() -> Self {
        Self {
            min_amount: 5_000,
            max_amount: 500_000,
            min_term_months: 3,
            max_term_months: 60,
        }
    }
}

/// Everything the service needs besides its database.
#[derive(Clone)]
pub struct ServiceSettings {
    pub rates: PurposeRateTable,
    pub limits: LoanLimits,
    pub tokens: TokenSigner,
}

impl ServiceSettings {
    pub fn new(token_secret: &str, token_ttl: Duration) -> Result<Self, AppError> {
        let tokens = TokenSigner::new(token_secret.as_bytes(), token_ttl)
            .map_err(|e| AppError::validation(e.to_string()))?;
        Ok(Self {
            rates: PurposeRateTable::default(),
            limits: LoanLimits::default(),
            tokens,
        })
    }

    pub fn with_rates(mut self, rates: PurposeRateTable) -> Self {
        self.rates = rates;
        self
    }

    pub fn with_limits(mut self, limits: LoanLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Registration form.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub pan: Option<String>,
}

/// A signed-in user with their bearer token.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// A borrower's loan request. The purpose is a free-form label.
#[derive(Debug, Clone)]
pub struct LoanRequest {
    pub amount: Amount,
    pub term_months: u32,
    pub purpose: String,
}

/// Outcome of ensuring the admin account exists.
pub struct SeedResult {
    pub admin: User,
    pub created: bool,
}

/// Application service providing the microloan operations.
/// This is the primary interface for any client (CLI, HTTP API).
pub struct LoanService {
    repo: Repository,
    settings: ServiceSettings,
}

impl LoanService {
    /// Create a new loan service with the given repository.
    pub fn new(repo: Repository, settings: ServiceSettings) -> Self {
        Self { repo, settings }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str, settings: ServiceSettings) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo, settings))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str, settings: ServiceSettings) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo, settings))
    }

    pub fn rates(&self) -> &PurposeRateTable {
        &self.settings.rates
    }

    pub fn limits(&self) -> LoanLimits {
        self.settings.limits
    }

    // ========================
    // Quotes
    // ========================

    /// Preview the installment for a request without persisting anything.
    /// Uses the same limits, rate table and calculator as [`LoanService::apply_for_loan`].
    pub fn quote(&self, amount: Amount, term_months: u32, purpose: &str) -> Result<LoanQuote, AppError> {
        self.check_limits(amount, term_months)?;
        let rate = self.settings.rates.resolve_rate(purpose);
        Ok(LoanQuote::compute(amount, rate, term_months)?)
    }

    fn check_limits(&self, amount: Amount, term_months: u32) -> Result<(), AppError> {
        let limits = self.settings.limits;
        if amount < limits.min_amount || amount > limits.max_amount {
            return Err(AppError::AmountOutOfRange {
                amount,
                min: limits.min_amount,
                max: limits.max_amount,
            });
        }
        if term_months < limits.min_term_months || term_months > limits.max_term_months {
            return Err(AppError::TermOutOfRange {
                months: term_months,
                min: limits.min_term_months,
                max: limits.max_term_months,
            });
        }
        Ok(())
    }

    // ========================
    // Users and authentication
    // ========================

    /// Register a borrower and sign them in.
    pub async fn register_user(&self, form: NewUser) -> Result<AuthSession, AppError> {
        let user = self.create_user(form, Role::User).await?;
        info!(user_id = %user.id, "registered user");
        Ok(self.session_for(user))
    }

    /// Check credentials. Unknown email and wrong password fail the same way.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::validation("Email and password required"));
        }

        let email = normalize_email(email);
        let user = match self.repo.get_user_by_email(&email).await? {
            Some(user) if verify_password(password, &user.password_hash) => user,
            _ => {
                warn!(email = %email, "failed login attempt");
                return Err(AppError::InvalidCredentials);
            }
        };

        Ok(self.session_for(user))
    }

    /// Resolve a bearer token to its current user.
    pub async fn authenticate(&self, token: &str) -> Result<User, AppError> {
        let claims = self
            .settings
            .tokens
            .verify(token, Utc::now())
            .map_err(|e| AppError::Unauthorized(e.to_string()))?;

        self.repo
            .get_user(claims.user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, AppError> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<User, AppError> {
        self.repo
            .get_user_by_email(&normalize_email(email))
            .await?
            .ok_or_else(|| AppError::UserNotFound(email.to_string()))
    }

    /// Update name, phone or PAN. Fields left `None` keep their value.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        name: Option<String>,
        phone: Option<String>,
        pan: Option<String>,
    ) -> Result<User, AppError> {
        let name = name.map(|n| n.trim().to_string());
        if name.as_deref() == Some("") {
            return Err(AppError::validation("Name must not be empty"));
        }
        let phone = phone.map(|p| p.trim().to_string());
        if let Some(phone) = &phone {
            validate_phone(phone)?;
        }
        let pan = pan
            .map(|p| p.trim().to_uppercase())
            .filter(|p| !p.is_empty());

        let changes = ProfileChanges { name, phone, pan };
        self.repo
            .update_profile(user_id, &changes)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }

    /// Create the admin account if it is missing. Existing accounts are left untouched.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<SeedResult, AppError> {
        if let Some(existing) = self.repo.get_user_by_email(&normalize_email(email)).await? {
            if !existing.is_admin() {
                return Err(AppError::EmailAlreadyRegistered(existing.email));
            }
            return Ok(SeedResult {
                admin: existing,
                created: false,
            });
        }

        let form = NewUser {
            name: "Admin".to_string(),
            email: email.to_string(),
            password: password.to_string(),
            phone: "0000000000".to_string(),
            pan: None,
        };
        let admin = self.create_user(form, Role::Admin).await?;
        info!(user_id = %admin.id, "created admin account");
        Ok(SeedResult {
            admin,
            created: true,
        })
    }

    /// Registered borrowers, newest first.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.repo.list_users(Some(Role::User)).await?)
    }

    async fn create_user(&self, form: NewUser, role: Role) -> Result<User, AppError> {
        let name = form.name.trim();
        let email = normalize_email(&form.email);
        let phone = form.phone.trim();

        if name.is_empty() || email.is_empty() || form.password.is_empty() || phone.is_empty() {
            return Err(AppError::validation(
                "Name, email, password, and phone are required",
            ));
        }
        validate_email(&email)?;
        validate_phone(phone)?;
        validate_password(&form.password).map_err(AppError::Validation)?;

        if self.repo.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::EmailAlreadyRegistered(email));
        }

        let mut user = User::new(name, &email, phone, role, hash_password(&form.password));
        if let Some(pan) = form.pan.map(|p| p.trim().to_uppercase()).filter(|p| !p.is_empty()) {
            user = user.with_pan(pan);
        }

        // a concurrent signup can take the address between the check and the insert
        if !self.repo.save_user(&user).await? {
            return Err(AppError::EmailAlreadyRegistered(email));
        }
        Ok(user)
    }

    fn session_for(&self, user: User) -> AuthSession {
        let token = self.settings.tokens.issue(&user, Utc::now());
        AuthSession { user, token }
    }

    // ========================
    // Loan applications
    // ========================

    /// Price and persist a new application for `user_id`.
    /// The quote is computed here, once, and stored with the application.
    pub async fn apply_for_loan(
        &self,
        user_id: UserId,
        request: LoanRequest,
    ) -> Result<LoanApplication, AppError> {
        self.check_limits(request.amount, request.term_months)?;

        let user = self.get_user(user_id).await?;
        let purpose = LoanPurpose::parse_lenient(&request.purpose);
        let quote = LoanQuote::for_purpose(
            &self.settings.rates,
            purpose,
            request.amount,
            request.term_months,
        )?;

        let loan = LoanApplication::new(user.id, user.name, user.email, purpose, quote);
        self.repo.save_loan(&loan).await?;

        info!(
            loan_id = %loan.id,
            user_id = %loan.user_id,
            amount = loan.quote.principal,
            emi = loan.quote.monthly_payment,
            "loan application submitted"
        );
        Ok(loan)
    }

    /// The caller's own applications, newest first.
    pub async fn list_my_loans(&self, user_id: UserId) -> Result<Vec<LoanApplication>, AppError> {
        Ok(self.repo.list_loans_for_user(user_id).await?)
    }

    /// Fetch one application. Borrowers only see their own; admins see all.
    /// Someone else's loan reads as not found.
    pub async fn get_loan_for(&self, requester: &User, id: LoanId) -> Result<LoanApplication, AppError> {
        let loan = self.get_loan(id).await?;
        if requester.is_admin() || loan.is_owned_by(requester.id) {
            Ok(loan)
        } else {
            Err(AppError::LoanNotFound(id.to_string()))
        }
    }

    pub async fn get_loan(&self, id: LoanId) -> Result<LoanApplication, AppError> {
        self.repo
            .get_loan(id)
            .await?
            .ok_or_else(|| AppError::LoanNotFound(id.to_string()))
    }

    // ========================
    // Administration
    // ========================

    /// Every application, newest first, optionally filtered by status.
    pub async fn list_all_loans(
        &self,
        status: Option<LoanStatus>,
    ) -> Result<Vec<LoanApplication>, AppError> {
        Ok(self.repo.list_loans(status).await?)
    }

    /// Move an application to `status` and record the decision in the audit log.
    pub async fn update_loan_status(
        &self,
        admin: &User,
        loan_id: LoanId,
        status: &str,
    ) -> Result<LoanApplication, AppError> {
        require_admin(admin)?;
        let status =
            LoanStatus::from_str(status).ok_or_else(|| AppError::InvalidStatus(status.to_string()))?;

        let previous = self.get_loan(loan_id).await?;
        let entry = AuditEntry::new(admin.id, AuditAction::for_status(status), loan_id)
            .with_details(format!("{} -> {}", previous.status, status));

        let updated = self
            .repo
            .update_loan_status(loan_id, status, entry.timestamp, &entry)
            .await?;
        if !updated {
            return Err(AppError::LoanNotFound(loan_id.to_string()));
        }

        info!(
            loan_id = %loan_id,
            admin_id = %admin.id,
            action = %entry.action,
            "loan status updated"
        );
        self.get_loan(loan_id).await
    }

    pub async fn admin_stats(&self) -> Result<AdminStats, AppError> {
        let counts = self.repo.loan_status_counts().await?;
        let total_users = self.repo.count_users(Role::User).await?;
        let breakdown = self.repo.purpose_breakdown().await?;

        let by_purpose = breakdown
            .into_iter()
            .map(|agg| PurposeSummary {
                purpose: agg.purpose,
                count: agg.count,
                total_amount: agg.total_amount,
                percentage: if counts.total_amount > 0 {
                    round2(agg.total_amount as f64 / counts.total_amount as f64 * 100.0)
                } else {
                    0.0
                },
            })
            .collect();

        Ok(AdminStats {
            total_applications: counts.total,
            pending_loans: counts.pending,
            approved_loans: counts.approved,
            rejected_loans: counts.rejected,
            total_amount: counts.total_amount,
            approval_rate: approval_rate(counts.approved, counts.total),
            total_users,
            by_purpose,
        })
    }

    pub async fn list_audit_log(&self, loan_id: Option<LoanId>) -> Result<Vec<AuditEntry>, AppError> {
        Ok(self.repo.list_audit_entries(loan_id).await?)
    }
}

pub fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::AdminRequired)
    }
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::validation(format!("Invalid email address: {}", email)))
    }
}

fn validate_phone(phone: &str) -> Result<(), AppError> {
    if phone.len() == 10 && phone.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AppError::validation(
            "Please enter a valid 10-digit phone number",
        ))
    }
}
