//! Input validation helpers shared by the components.

use crate::models::Money;
use crate::ClinicError;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_CATEGORY_NAME_LEN: usize = 50;
/// Largest single amount accepted anywhere: 10,000,000,000.00.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000;

/// Trimmed value; empty is a validation error.
pub fn required(field: &str, value: &str) -> Result<String, ClinicError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClinicError::validation(field, "is required"));
    }
    Ok(trimmed.to_string())
}

/// Like [`required`] with an upper bound on character count.
pub fn required_max(field: &str, value: &str, max: usize) -> Result<String, ClinicError> {
    let value = required(field, value)?;
    if value.chars().count() > max {
        return Err(ClinicError::validation(
            field,
            format!("must be at most {} characters", max),
        ));
    }
    Ok(value)
}

/// Trimmed optional text; blank becomes `None`.
pub fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn non_negative(field: &str, amount: Money) -> Result<Money, ClinicError> {
    if amount.is_negative() {
        return Err(ClinicError::validation(field, "must not be negative"));
    }
    within_limit(field, amount)
}

pub fn positive(field: &str, amount: Money) -> Result<Money, ClinicError> {
    if !amount.is_positive() {
        return Err(ClinicError::validation(field, "must be greater than zero"));
    }
    within_limit(field, amount)
}

fn within_limit(field: &str, amount: Money) -> Result<Money, ClinicError> {
    let max = Money::from_cents(MAX_AMOUNT_CENTS);
    if amount > max {
        return Err(ClinicError::validation(field, format!("must be at most {}", max)));
    }
    Ok(amount)
}

/// Username: trimmed, lower-cased, 3-80 chars of `[a-z0-9._@-]`.
pub fn username(value: &str) -> Result<String, ClinicError> {
    let normalized = value.trim().to_lowercase();
    let len = normalized.chars().count();
    if !(3..=80).contains(&len) {
        return Err(ClinicError::validation(
            "username",
            "must be between 3 and 80 characters",
        ));
    }
    if !normalized
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '@' | '-'))
    {
        return Err(ClinicError::validation(
            "username",
            "may only contain letters, digits and . _ @ -",
        ));
    }
    Ok(normalized)
}

pub fn password(field: &str, value: &str) -> Result<(), ClinicError> {
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClinicError::validation(
            field,
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

/// `#rrggbb`, normalized to lower case.
pub fn hex_color(value: &str) -> Result<String, ClinicError> {
    let value = value.trim();
    let valid = value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        return Err(ClinicError::validation("color", "must look like #rrggbb"));
    }
    Ok(value.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trims() {
        assert_eq!(required("name", "  Max ").unwrap(), "Max");
        assert!(required("name", "   ").is_err());
        assert!(required_max("name", "abcdef", 5).is_err());
    }

    #[test]
    fn test_optional_blank_is_none() {
        assert_eq!(optional(Some("  ")), None);
        assert_eq!(optional(Some(" x ")), Some("x".into()));
        assert_eq!(optional(None), None);
    }

    #[test]
    fn test_username_rules() {
        assert_eq!(username("  Dr.House@Clinic ").unwrap(), "dr.house@clinic");
        assert!(username("ab").is_err());
        assert!(username("has space").is_err());
        assert!(username(&"a".repeat(81)).is_err());
    }

    #[test]
    fn test_amount_rules() {
        assert!(non_negative("amount", Money::ZERO).is_ok());
        assert!(non_negative("amount", Money::from_cents(-1)).is_err());
        assert!(positive("amount", Money::ZERO).is_err());
        assert!(positive("amount", Money::from_cents(1)).is_ok());
    }

    #[test]
    fn test_amount_upper_bound() {
        let max = Money::from_cents(MAX_AMOUNT_CENTS);
        assert_eq!(positive("amount", max).unwrap(), max);
        assert!(non_negative("amount_due", max).is_ok());

        let over = max + Money::from_cents(1);
        let err = positive("amount", over).unwrap_err();
        assert!(err.to_string().contains("at most 10000000000.00"), "{}", err);
        assert!(non_negative("amount_paid", over).is_err());
    }

    #[test]
    fn test_hex_color() {
        assert_eq!(hex_color("#A1B2C3").unwrap(), "#a1b2c3");
        assert!(hex_color("a1b2c3").is_err());
        assert!(hex_color("#12345g").is_err());
    }
}
