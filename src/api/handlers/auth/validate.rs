//! Input validation for the registration and login payloads.
//!
//! Each check returns the message the client sees; handlers aggregate them
//! into a single 400 with per-field details.

use regex::Regex;

const PASSWORD_MIN_LEN: usize = 8;
const FULL_NAME_MIN_LEN: usize = 2;
const FULL_NAME_MAX_LEN: usize = 100;
const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 30;

fn valid_email_shape(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").map_or(false, |re| re.is_match(email))
}

fn valid_username_charset(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_]+$").map_or(false, |re| re.is_match(username))
}

/// Lowercased, trimmed form used everywhere an address is stored or compared.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn check_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if !valid_email_shape(email) {
        return Err("Invalid email address".to_string());
    }
    Ok(())
}

pub fn check_otp(otp: &str) -> Result<(), String> {
    if otp.len() != 6 || !otp.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err("OTP must be a 6-digit code".to_string());
    }
    Ok(())
}

pub fn check_password(password: &str) -> Result<(), String> {
    if password.len() < PASSWORD_MIN_LEN {
        return Err("Password must be at least 8 characters".to_string());
    }
    let has_upper = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lower = password.chars().any(|c| c.is_ascii_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_upper && has_lower && has_digit) {
        return Err(
            "Password must contain an uppercase letter, a lowercase letter, and a number"
                .to_string(),
        );
    }
    Ok(())
}

pub fn check_full_name(full_name: &str) -> Result<(), String> {
    let len = full_name.trim().chars().count();
    if !(FULL_NAME_MIN_LEN..=FULL_NAME_MAX_LEN).contains(&len) {
        return Err("Full name must be between 2 and 100 characters".to_string());
    }
    Ok(())
}

pub fn check_username(username: &str) -> Result<(), String> {
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        return Err("Username must be between 3 and 30 characters".to_string());
    }
    if !valid_username_charset(username) {
        return Err("Username may only contain letters, numbers, and underscores".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_trims_and_lowercases() {
        assert_eq!(
            normalize_email("  Student@UKTECH.net.in "),
            "student@uktech.net.in"
        );
    }

    #[test]
    fn email_shapes() {
        assert!(check_email("a@b.co").is_ok());
        assert!(check_email("").is_err());
        assert!(check_email("no-at-sign").is_err());
        assert!(check_email("spaces in@b.co").is_err());
        assert!(check_email("a@nodot").is_err());
    }

    #[test]
    fn otp_must_be_six_digits() {
        assert!(check_otp("123456").is_ok());
        assert!(check_otp("12345").is_err());
        assert!(check_otp("1234567").is_err());
        assert!(check_otp("12345a").is_err());
    }

    #[test]
    fn password_complexity() {
        assert!(check_password("Abcd1234").is_ok());
        assert!(check_password("Ab1").is_err());
        assert!(check_password("abcd1234").is_err(), "missing uppercase");
        assert!(check_password("ABCD1234").is_err(), "missing lowercase");
        assert!(check_password("Abcdefgh").is_err(), "missing digit");
    }

    #[test]
    fn full_name_bounds() {
        assert!(check_full_name("Al").is_ok());
        assert!(check_full_name("A").is_err());
        assert!(check_full_name(&"x".repeat(100)).is_ok());
        assert!(check_full_name(&"x".repeat(101)).is_err());
        assert!(check_full_name("  A  ").is_err(), "trimmed length counts");
    }

    #[test]
    fn username_charset_and_bounds() {
        assert!(check_username("ab_1").is_ok());
        assert!(check_username("ab").is_err());
        assert!(check_username(&"a".repeat(31)).is_err());
        assert!(check_username("ab-1").is_err());
        assert!(check_username("ab 1").is_err());
    }
}
