//! Input validation.
//!
//! Collects field-level errors so a handler can report every problem with a
//! request at once. The first message recorded for a field wins.

use std::collections::BTreeMap;
use std::fmt;

/// Field name to message map of validation failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    errors: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field` unless the field already has an error.
    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record `message` for `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors.get(field).map(String::as_str)
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    /// `Ok(())` when nothing was recorded, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_valid() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(field, message)| format!("{field}: {message}"))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

/// Maximum bytes bcrypt will consider.
const MAX_PASSWORD_BYTES: usize = 72;
const MIN_PASSWORD_BYTES: usize = 8;
const MAX_NAME_BYTES: usize = 500;

/// Loose structural check: `local@domain.tld`, no whitespace.
pub fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

pub fn validate_email(v: &mut ValidationErrors, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(is_email(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut ValidationErrors, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

pub fn validate_name(v: &mut ValidationErrors, name: &str) {
    v.check(!name.trim().is_empty(), "name", "must be provided");
    v.check(
        name.len() <= MAX_NAME_BYTES,
        "name",
        "must not be more than 500 bytes long",
    );
}

/// Validate the fields of a registration request.
pub fn validate_new_user(v: &mut ValidationErrors, name: &str, email: &str, password: &str) {
    validate_name(v, name);
    validate_email(v, email);
    validate_password_plaintext(v, password);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_for_a_field_wins() {
        let mut v = ValidationErrors::new();
        v.add_error("email", "must be provided");
        v.add_error("email", "must be a valid email address");
        assert_eq!(v.get("email"), Some("must be provided"));
        assert!(!v.is_valid());
    }

    #[test]
    fn into_result_is_ok_when_empty() {
        assert!(ValidationErrors::new().into_result().is_ok());
    }

    #[test]
    fn email_shapes() {
        assert!(is_email("alice@example.com"));
        assert!(is_email("a.b+c@mail.example.org"));
        assert!(!is_email("alice"));
        assert!(!is_email("alice@"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("alice@example"));
        assert!(!is_email("alice@@example.com"));
        assert!(!is_email("al ice@example.com"));
    }

    #[test]
    fn password_bounds() {
        let mut v = ValidationErrors::new();
        validate_password_plaintext(&mut v, "short");
        assert_eq!(v.get("password"), Some("must be at least 8 bytes long"));

        let mut v = ValidationErrors::new();
        validate_password_plaintext(&mut v, &"x".repeat(73));
        assert_eq!(v.get("password"), Some("must not be more than 72 bytes long"));

        let mut v = ValidationErrors::new();
        validate_password_plaintext(&mut v, "pa55word");
        assert!(v.is_valid());
    }

    #[test]
    fn new_user_reports_every_field() {
        let mut v = ValidationErrors::new();
        validate_new_user(&mut v, "", "nope", "");
        assert_eq!(v.errors().len(), 3);
        assert_eq!(
            v.to_string(),
            "email: must be a valid email address, name: must be provided, password: must be provided"
        );
    }
}
