//! Email normalization and link building.

use regex::Regex;

/// Normalize an email for lookup and uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic format check on already-normalized input. Full validation belongs
/// to the form layer; this is the last line before persistence.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Build the activation link embedded in the registration email. The raw
/// token appears only here and in the recipient's inbox.
#[must_use]
pub fn build_activation_url(base_url: &str, raw_token: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!("{base}/account/activate/{raw_token}")
}

/// Build the password-reset link for the reset-request email.
#[must_use]
pub fn build_reset_url(base_url: &str, raw_token: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!("{base}/account/password-reset/{raw_token}")
}
