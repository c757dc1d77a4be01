use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Amount, LoanPurpose, PurposeRateTable};

/// Reasons a quote cannot be computed. Invalid input is always rejected;
/// the calculator never returns a zero-valued placeholder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuoteError {
    #[error("Principal must be positive, got {0}")]
    NonPositivePrincipal(Amount),

    #[error("Term must be at least one month")]
    ZeroTerm,

    #[error("Annual rate must not be negative, got {0}%")]
    NegativeRate(Decimal),

    #[error("Quote amounts exceed the representable range")]
    Overflow,
}

/// Fixed-installment pricing of a reducing-balance loan.
///
/// Computed once per submission and embedded in the loan application;
/// it is never recomputed for an existing application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanQuote {
    pub principal: Amount,
    pub annual_rate_percent: Decimal,
    pub term_months: u32,
    /// EMI, rounded to the whole currency unit
    pub monthly_payment: Amount,
    /// `monthly_payment * term_months`, so it carries the rounding drift
    pub total_payment: Amount,
    /// `total_payment - principal`. Can dip below zero when `P/n` rounds down
    /// by more than the interest, at 0% and at very small positive rates alike
    pub total_interest: Amount,
}

impl LoanQuote {
    pub fn compute(
        principal: Amount,
        annual_rate_percent: Decimal,
        term_months: u32,
    ) -> Result<Self, QuoteError> {
        let monthly_payment = monthly_payment(principal, annual_rate_percent, term_months)?;
        let total_payment = monthly_payment
            .checked_mul(Amount::from(term_months))
            .ok_or(QuoteError::Overflow)?;

        Ok(Self {
            principal,
            annual_rate_percent,
            term_months,
            monthly_payment,
            total_payment,
            total_interest: total_payment - principal,
        })
    }

    /// Quote at the rate the table assigns to `purpose`.
    pub fn for_purpose(
        rates: &PurposeRateTable,
        purpose: LoanPurpose,
        principal: Amount,
        term_months: u32,
    ) -> Result<Self, QuoteError> {
        Self::compute(principal, rates.rate_for(purpose), term_months)
    }
}

/// Periodic rate: annual percent / 12 / 100.
pub fn monthly_rate(annual_rate_percent: Decimal) -> Decimal {
    annual_rate_percent / dec!(12) / dec!(100)
}

/// EMI for the given loan, rounded half away from zero to the whole unit.
///
/// `P * r * (1+r)^n / ((1+r)^n - 1)`, or `P / n` when the rate is zero.
pub fn monthly_payment(
    principal: Amount,
    annual_rate_percent: Decimal,
    term_months: u32,
) -> Result<Amount, QuoteError> {
    if principal <= 0 {
        return Err(QuoteError::NonPositivePrincipal(principal));
    }
    if term_months == 0 {
        return Err(QuoteError::ZeroTerm);
    }
    if annual_rate_percent < Decimal::ZERO {
        return Err(QuoteError::NegativeRate(annual_rate_percent));
    }

    let p = Decimal::from(principal);
    let n = Decimal::from(term_months);
    let r = monthly_rate(annual_rate_percent);

    let exact = if r.is_zero() {
        p.checked_div(n).ok_or(QuoteError::Overflow)?
    } else {
        let growth = compound(r, term_months)?;
        let numerator = p
            .checked_mul(r)
            .and_then(|v| v.checked_mul(growth))
            .ok_or(QuoteError::Overflow)?;
        numerator
            .checked_div(growth - Decimal::ONE)
            .ok_or(QuoteError::Overflow)?
    };

    exact
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or(QuoteError::Overflow)
}

/// (1 + r)^n by squaring, so the cost grows with log n.
/// Terms whose growth factor leaves the `Decimal` range report `Overflow`.
fn compound(rate: Decimal, n: u32) -> Result<Decimal, QuoteError> {
    (Decimal::ONE + rate)
        .checked_powu(u64::from(n))
        .ok_or(QuoteError::Overflow)
}
