use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;

use crate::application::{LoanLimits, ServiceSettings};
use crate::domain::PurposeRateTable;

const DEFAULT_DATABASE: &str = "microloan.db";
const DEFAULT_BIND: &str = "127.0.0.1:5000";
const DEFAULT_TOKEN_SECRET: &str = "microloan-dev-secret";
const DEFAULT_TOKEN_TTL_HOURS: i64 = 7 * 24;
const MAX_TOKEN_TTL_HOURS: i64 = 365 * 24;

/// Process configuration, read from `MICROLOAN_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: String,
    pub bind_addr: String,
    pub token_secret: String,
    pub token_ttl_hours: i64,
    pub rates_file: Option<PathBuf>,
    pub limits: LoanLimits,
    pub log_json: bool,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DEFAULT_DATABASE.to_string(),
            bind_addr: DEFAULT_BIND.to_string(),
            token_secret: DEFAULT_TOKEN_SECRET.to_string(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            rates_file: None,
            limits: LoanLimits::default(),
            log_json: false,
            admin_email: None,
            admin_password: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; unset or unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let limits = LoanLimits {
            min_amount: parse_or(&lookup, "MICROLOAN_MIN_AMOUNT", defaults.limits.min_amount),
            max_amount: parse_or(&lookup, "MICROLOAN_MAX_AMOUNT", defaults.limits.max_amount),
            min_term_months: parse_or(&lookup, "MICROLOAN_MIN_TERM", defaults.limits.min_term_months),
            max_term_months: parse_or(&lookup, "MICROLOAN_MAX_TERM", defaults.limits.max_term_months),
        };

        Self {
            database: lookup("MICROLOAN_DATABASE").unwrap_or(defaults.database),
            bind_addr: lookup("MICROLOAN_BIND").unwrap_or(defaults.bind_addr),
            token_secret: lookup("MICROLOAN_TOKEN_SECRET")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.token_secret),
            token_ttl_hours: parse_or(&lookup, "MICROLOAN_TOKEN_TTL_HOURS", defaults.token_ttl_hours),
            rates_file: lookup("MICROLOAN_RATES_FILE")
                .filter(|s| !s.is_empty())
                .map(PathBuf::from),
            limits,
            log_json: bool_or(&lookup, "MICROLOAN_LOG_JSON", false),
            admin_email: lookup("ADMIN_EMAIL").filter(|s| !s.is_empty()),
            admin_password: lookup("ADMIN_PASSWORD").filter(|s| !s.is_empty()),
        }
    }

    pub fn uses_default_secret(&self) -> bool {
        self.token_secret == DEFAULT_TOKEN_SECRET
    }

    pub fn rate_table(&self) -> Result<PurposeRateTable> {
        match &self.rates_file {
            Some(path) => PurposeRateTable::load(path)
                .with_context(|| format!("Failed to load rate table from {}", path.display())),
            None => Ok(PurposeRateTable::default()),
        }
    }

    /// Settings for the loan service, with the rate table resolved.
    pub fn service_settings(&self) -> Result<ServiceSettings> {
        if self.limits.min_amount > self.limits.max_amount
            || self.limits.min_term_months > self.limits.max_term_months
            || self.limits.min_term_months == 0
            || self.limits.min_amount <= 0
        {
            anyhow::bail!("Invalid loan limits: {:?}", self.limits);
        }
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.token_ttl_hours) {
            anyhow::bail!(
                "Invalid token lifetime: {} hours (expected 1..={})",
                self.token_ttl_hours,
                MAX_TOKEN_TTL_HOURS
            );
        }

        let settings = ServiceSettings::new(&self.token_secret, Duration::hours(self.token_ttl_hours))?
            .with_rates(self.rate_table()?)
            .with_limits(self.limits);
        Ok(settings)
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(name)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn bool_or<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}
