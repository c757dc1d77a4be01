// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::Duration;
use microloan::application::{AuthSession, LoanRequest, LoanService, NewUser, ServiceSettings};
use microloan::domain::{LoanApplication, User};
use tempfile::TempDir;

pub const TEST_PASSWORD: &str = "Str0ng!pass";
pub const ADMIN_EMAIL: &str = "admin@microloan.test";

pub fn test_settings() -> ServiceSettings {
    ServiceSettings::new("test-secret", Duration::hours(1)).unwrap()
}

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LoanService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LoanService::init(db_path.to_str().unwrap(), test_settings()).await?;
    Ok((service, temp_dir))
}

pub fn new_user(name: &str, email: &str) -> NewUser {
    NewUser {
        name: name.to_string(),
        email: email.to_string(),
        password: TEST_PASSWORD.to_string(),
        phone: "9876543210".to_string(),
        pan: None,
    }
}

/// Register a borrower with the standard test password.
pub async fn register(service: &LoanService, name: &str, email: &str) -> Result<AuthSession> {
    Ok(service.register_user(new_user(name, email)).await?)
}

pub async fn seed_admin(service: &LoanService) -> Result<User> {
    Ok(service.ensure_admin(ADMIN_EMAIL, TEST_PASSWORD).await?.admin)
}

pub async fn apply(
    service: &LoanService,
    user: &User,
    amount: i64,
    term_months: u32,
    purpose: &str,
) -> Result<LoanApplication> {
    let request = LoanRequest {
        amount,
        term_months,
        purpose: purpose.to_string(),
    };
    Ok(service.apply_for_loan(user.id, request).await?)
}
