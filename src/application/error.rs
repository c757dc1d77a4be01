use thiserror::Error;

use crate::domain::{Amount, QuoteError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Email already registered: {0}")]
    EmailAlreadyRegistered(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication required: {0}")]
    Unauthorized(String),

    #[error("Admin access required")]
    AdminRequired,

    #[error("Loan not found: {0}")]
    LoanNotFound(String),

    #[error("Invalid status: {0}. Expected pending, approved or rejected")]
    InvalidStatus(String),

    #[error("Amount {amount} is outside the allowed range {min}..={max}")]
    AmountOutOfRange { amount: Amount, min: Amount, max: Amount },

    #[error("Term of {months} months is outside the allowed range {min}..={max}")]
    TermOutOfRange { months: u32, min: u32, max: u32 },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot price loan: {0}")]
    Quote(#[from] QuoteError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }
}
