//! Input validation for API requests.
//!
//! Each function returns `Err(message)` with a user-facing message. Collect
//! several with `ValidationErrorBuilder::check` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Pragmatic email check: something@something.tld, no whitespace
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();

    /// Philippine mobile or landline numbers, loosely formatted
    static ref CONTACT_NUMBER_REGEX: Regex = Regex::new(
        r"^\+?[0-9][0-9 \-()]{6,19}$"
    ).unwrap();
}

pub const MIN_YEAR: i64 = 1900;
pub const MAX_YEAR: i64 = 2100;
pub const MAX_NOTES_LENGTH: usize = 500;

pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }
    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

/// Validate a person's first or last name
pub fn validate_person_name(name: &str, field_name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("{} is required", field_name));
    }
    if name.chars().count() > 100 {
        return Err(format!("{} is too long (max 100 characters)", field_name));
    }
    Ok(())
}

/// Password rules: at least 8 characters with an uppercase letter, a digit and a special character
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace()) {
        return Err("Password must contain at least one special character".to_string());
    }
    Ok(())
}

pub fn validate_contact_number(contact: &Option<String>) -> Result<(), String> {
    if let Some(c) = contact {
        let c = c.trim();
        if c.is_empty() {
            return Ok(());
        }
        if !CONTACT_NUMBER_REGEX.is_match(c) {
            return Err("Invalid contact number format".to_string());
        }
    }
    Ok(())
}

/// Validate a UUID format
pub fn validate_uuid(id: &str, field_name: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} is required", field_name));
    }

    if uuid::Uuid::parse_str(id).is_err() {
        return Err(format!("Invalid {} format", field_name));
    }

    Ok(())
}

/// Validate a required positive row id
pub fn validate_id(id: Option<i64>, field_name: &str) -> Result<i64, String> {
    match id {
        None => Err(format!("{} is required", field_name)),
        Some(v) if v <= 0 => Err(format!("{} must be a positive integer", field_name)),
        Some(v) => Ok(v),
    }
}

pub fn validate_year(year: i64) -> Result<(), String> {
    if !(MIN_YEAR..=MAX_YEAR).contains(&year) {
        return Err(format!("Year must be between {} and {}", MIN_YEAR, MAX_YEAR));
    }
    Ok(())
}

/// Validate a required, finite, strictly positive measurement
pub fn validate_positive(value: Option<f64>, field_name: &str) -> Result<f64, String> {
    match value {
        None => Err(format!("{} is required", field_name)),
        Some(v) if !v.is_finite() || v <= 0.0 => {
            Err(format!("{} must be a number greater than 0", field_name))
        }
        Some(v) => Ok(v),
    }
}

/// Validate a reference-data name (crop or barangay)
pub fn validate_label(name: &str, field_name: &str) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("{} is required", field_name));
    }
    if name.chars().count() > 120 {
        return Err(format!("{} is too long (max 120 characters)", field_name));
    }
    Ok(())
}

/// Trim optional notes and cap them at `MAX_NOTES_LENGTH` characters
pub fn normalize_notes(notes: Option<&str>) -> Option<String> {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| n.chars().take(MAX_NOTES_LENGTH).collect())
}

/// Interpret loose boolean query flags (`true`, `1`, `yes`, `me`, `self`)
pub fn is_truthy_flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_lowercase()).as_deref(),
        Some("true" | "1" | "yes" | "me" | "self")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("tech@guagua.gov.ph").is_ok());
        assert!(validate_email("  admin@example.com ").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("a b@example.com").is_err());
        assert!(validate_email("user@localhost").is_err());
    }

    #[test]
    fn test_validate_password_strength() {
        assert!(validate_password_strength("Harvest#2024").is_ok());

        assert_eq!(
            validate_password_strength("Ab1!").unwrap_err(),
            "Password must be at least 8 characters"
        );
        assert!(validate_password_strength("harvest#2024").is_err()); // no uppercase
        assert!(validate_password_strength("Harvest#abc").is_err()); // no digit
        assert!(validate_password_strength("Harvest2024").is_err()); // no special
    }

    #[test]
    fn test_validate_contact_number() {
        assert!(validate_contact_number(&None).is_ok());
        assert!(validate_contact_number(&Some("".into())).is_ok());
        assert!(validate_contact_number(&Some("+63 917 123 4567".into())).is_ok());
        assert!(validate_contact_number(&Some("09171234567".into())).is_ok());
        assert!(validate_contact_number(&Some("call me".into())).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000", "id").is_ok());
        assert!(validate_uuid("", "id").is_err());
        assert!(validate_uuid("not-a-uuid", "id").is_err());
    }

    #[test]
    fn test_validate_numbers() {
        assert_eq!(validate_id(Some(3), "crop_id"), Ok(3));
        assert!(validate_id(None, "crop_id").is_err());
        assert!(validate_id(Some(0), "crop_id").is_err());

        assert!(validate_year(2024).is_ok());
        assert!(validate_year(1800).is_err());

        assert_eq!(validate_positive(Some(2.5), "total_yield"), Ok(2.5));
        assert!(validate_positive(Some(0.0), "total_yield").is_err());
        assert!(validate_positive(Some(-1.0), "total_yield").is_err());
        assert!(validate_positive(Some(f64::NAN), "total_yield").is_err());
        assert!(validate_positive(None, "total_yield").is_err());
    }

    #[test]
    fn test_normalize_notes() {
        assert_eq!(normalize_notes(Some("  weekly  ")), Some("weekly".to_string()));
        assert_eq!(normalize_notes(Some("   ")), None);
        assert_eq!(normalize_notes(None), None);
        let long = "x".repeat(600);
        assert_eq!(normalize_notes(Some(&long)).unwrap().len(), MAX_NOTES_LENGTH);
    }

    #[test]
    fn test_truthy_flags() {
        for flag in ["true", "1", "YES", "me", "self"] {
            assert!(is_truthy_flag(Some(flag)), "{flag}");
        }
        assert!(!is_truthy_flag(Some("false")));
        assert!(!is_truthy_flag(None));
    }
}
