use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declared use of the borrowed money. Selects the pricing rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanPurpose {
    Business,
    Education,
    Personal,
    Medical,
    HomeRenovation,
    DebtConsolidation,
    Other,
}

impl LoanPurpose {
    pub const ALL: [LoanPurpose; 7] = [
        LoanPurpose::Business,
        LoanPurpose::Education,
        LoanPurpose::Personal,
        LoanPurpose::Medical,
        LoanPurpose::HomeRenovation,
        LoanPurpose::DebtConsolidation,
        LoanPurpose::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoanPurpose::Business => "business",
            LoanPurpose::Education => "education",
            LoanPurpose::Personal => "personal",
            LoanPurpose::Medical => "medical",
            LoanPurpose::HomeRenovation => "home_renovation",
            LoanPurpose::DebtConsolidation => "debt_consolidation",
            LoanPurpose::Other => "other",
        }
    }

    /// Human label as shown on the application form.
    pub fn label(&self) -> &'static str {
        match self {
            LoanPurpose::Business => "Business",
            LoanPurpose::Education => "Education",
            LoanPurpose::Personal => "Personal",
            LoanPurpose::Medical => "Medical",
            LoanPurpose::HomeRenovation => "Home Renovation",
            LoanPurpose::DebtConsolidation => "Debt Consolidation",
            LoanPurpose::Other => "Other",
        }
    }

    /// Case-insensitive match that also ignores spaces, `-` and `_`,
    /// so "Home Renovation", "home-renovation" and "HOME_RENOVATION" agree.
    pub fn from_str(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "business" => Some(LoanPurpose::Business),
            "education" => Some(LoanPurpose::Education),
            "personal" => Some(LoanPurpose::Personal),
            "medical" => Some(LoanPurpose::Medical),
            "homerenovation" => Some(LoanPurpose::HomeRenovation),
            "debtconsolidation" => Some(LoanPurpose::DebtConsolidation),
            "other" => Some(LoanPurpose::Other),
            _ => None,
        }
    }

    /// Like [`LoanPurpose::from_str`] but unknown or empty labels become `Other`.
    pub fn parse_lenient(s: &str) -> Self {
        Self::from_str(s).unwrap_or(LoanPurpose::Other)
    }
}

impl std::fmt::Display for LoanPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Error, Debug)]
pub enum RateTableError {
    #[error("Negative rate {rate}% configured for {target}")]
    NegativeRate { target: String, rate: Decimal },

    #[error("Failed to read rate table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid rate table JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Purpose to annual-rate mapping. Purposes without an entry use `default_rate_percent`.
///
/// One table instance is shared by quote previews and loan submission, so a
/// preview always equals what gets persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurposeRateTable {
    pub default_rate_percent: Decimal,
    #[serde(default)]
    pub rates: BTreeMap<LoanPurpose, Decimal>,
}

impl Default for PurposeRateTable {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert(LoanPurpose::Business, dec!(12));
        rates.insert(LoanPurpose::Education, dec!(10));
        rates.insert(LoanPurpose::Personal, dec!(16));
        Self {
            default_rate_percent: dec!(14),
            rates,
        }
    }
}

impl PurposeRateTable {
    pub fn new(default_rate_percent: Decimal) -> Self {
        Self {
            default_rate_percent,
            rates: BTreeMap::new(),
        }
    }

    pub fn with_rate(mut self, purpose: LoanPurpose, annual_rate_percent: Decimal) -> Self {
        self.rates.insert(purpose, annual_rate_percent);
        self
    }

    /// Annual rate for a known purpose.
    pub fn rate_for(&self, purpose: LoanPurpose) -> Decimal {
        self.rates
            .get(&purpose)
            .copied()
            .unwrap_or(self.default_rate_percent)
    }

    /// Annual rate for a free-form label. Never fails: unmatched labels get the default.
    pub fn resolve_rate(&self, label: &str) -> Decimal {
        match LoanPurpose::from_str(label) {
            Some(purpose) => self.rate_for(purpose),
            None => self.default_rate_percent,
        }
    }

    pub fn validate(&self) -> Result<(), RateTableError> {
        if self.default_rate_percent < Decimal::ZERO {
            return Err(RateTableError::NegativeRate {
                target: "default".to_string(),
                rate: self.default_rate_percent,
            });
        }
        for (purpose, rate) in &self.rates {
            if *rate < Decimal::ZERO {
                return Err(RateTableError::NegativeRate {
                    target: purpose.label().to_string(),
                    rate: *rate,
                });
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, RateTableError> {
        let table: Self = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, RateTableError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Every purpose with its effective rate, in declaration order.
    pub fn effective_rates(&self) -> Vec<(LoanPurpose, Decimal)> {
        LoanPurpose::ALL
            .iter()
            .map(|purpose| (*purpose, self.rate_for(*purpose)))
            .collect()
    }
}
