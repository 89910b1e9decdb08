use std::sync::OnceLock;

use regex::Regex;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid email regex")
    })
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+?[0-9 ()\-]{7,20}$").expect("valid phone regex"))
}

fn currency_regex() -> &'static Regex {
    static CURRENCY: OnceLock<Regex> = OnceLock::new();
    CURRENCY.get_or_init(|| Regex::new(r"^[A-Z]{3}$").expect("valid currency regex"))
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

pub fn is_valid_phone(phone: &str) -> bool {
    phone_regex().is_match(phone.trim())
}

/// ISO 4217 shape only: three uppercase letters.
pub fn is_valid_currency(code: &str) -> bool {
    currency_regex().is_match(code)
}

/// Trims and rejects blank or over-long free text.
pub fn clean_text(value: &str, field: &str, max_len: usize) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{} cannot be empty", field));
    }
    if trimmed.chars().count() > max_len {
        return Err(format!("{} must be at most {} characters", field, max_len));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert!(is_valid_email("ada@example.com"));
        assert!(is_valid_email(" grace.hopper+navy@mail.example.org "));
        assert!(!is_valid_email("ada@"));
        assert!(!is_valid_email("no-at-sign.com"));
    }

    #[test]
    fn phones() {
        assert!(is_valid_phone("+1 (555) 123-4567"));
        assert!(!is_valid_phone("call me"));
        assert!(!is_valid_phone("123"));
    }

    #[test]
    fn currencies() {
        assert!(is_valid_currency("USD"));
        assert!(!is_valid_currency("usd"));
        assert!(!is_valid_currency("EURO"));
    }

    #[test]
    fn clean_text_trims_and_bounds() {
        assert_eq!(clean_text("  hello ", "Body", 10).unwrap(), "hello");
        assert_eq!(clean_text("   ", "Body", 10).unwrap_err(), "Body cannot be empty");
        assert!(clean_text("abcdefghijk", "Body", 10).is_err());
    }
}
