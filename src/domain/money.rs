use std::fmt;

/// Loan money is carried in whole currency units (rupees).
/// Installments are rounded to the unit, so no sub-unit fraction ever exists.
pub type Amount = i64;

/// Format an amount with Indian digit grouping.
/// Example: 500000 -> "5,00,000", 4489 -> "4,489", -1 -> "-1"
pub fn format_amount(amount: Amount) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let digits = amount.unsigned_abs().to_string();
    if digits.len() <= 3 {
        return format!("{}{}", sign, digits);
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups = Vec::new();
    let mut rest = head;
    while rest.len() > 2 {
        let (left, right) = rest.split_at(rest.len() - 2);
        groups.push(right);
        rest = left;
    }
    groups.push(rest);
    groups.reverse();

    format!("{}{},{}", sign, groups.join(","), tail)
}

/// Parse a whole-unit amount, tolerating grouping commas and a currency sign.
/// Example: "50000" -> 50000, "5,00,000" -> 500000, "₹10,000" -> 10000
pub fn parse_amount(input: &str) -> Result<Amount, ParseAmountError> {
    let input = input.trim().trim_start_matches('₹').trim();
    let negative = input.starts_with('-');
    let digits: String = input
        .trim_start_matches('-')
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();

    if digits.is_empty() {
        return Err(ParseAmountError::Empty);
    }
    if digits.contains('.') {
        return Err(ParseAmountError::FractionalUnits);
    }

    let value: Amount = digits.parse().map_err(|_| ParseAmountError::InvalidFormat)?;
    Ok(if negative { -value } else { value })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    Empty,
    InvalidFormat,
    FractionalUnits,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::Empty => write!(f, "empty amount"),
            ParseAmountError::InvalidFormat => write!(f, "invalid amount format"),
            ParseAmountError::FractionalUnits => {
                write!(f, "amounts are whole currency units")
            }
        }
    }
}

impl std::error::Error for ParseAmountError {}
