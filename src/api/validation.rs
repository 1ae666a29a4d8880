//! Input validation for API requests.
//!
//! The `validate_*` functions return a human-readable message on failure.
//! Collect several of them with `ValidationErrorBuilder::check` from the
//! `error` module.

use lazy_static::lazy_static;
use regex::Regex;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::db::{PostDto, PostPatch, RegisterRequest};

/// Characters that satisfy the "special character" password rule
pub const PASSWORD_SPECIAL_CHARS: &str = "@!$#-_?+%^&*()";

pub const PASSWORD_MIN_LENGTH: usize = 8;

lazy_static! {
    /// Pragmatic email check: one @, no whitespace, a dot in the domain
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$"
    ).unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_REGEX.is_match(email)
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }
    if !is_valid_email(email) {
        return Err("Invalid email format".to_string());
    }
    Ok(())
}

/// Length check counted in characters, not bytes
pub fn validate_length(label: &str, value: &str, min: usize, max: usize) -> Result<(), String> {
    let len = value.chars().count();
    if len < min {
        if min == 1 {
            return Err(format!("{} is required", label));
        }
        return Err(format!("{} must be at least {} characters", label, min));
    }
    if len > max {
        return Err(format!("{} is too long (max {} characters)", label, max));
    }
    Ok(())
}

/// At least 8 characters with upper and lower case letters, a digit and a
/// character from [`PASSWORD_SPECIAL_CHARS`]
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err(format!(
            "Password must be at least {} characters long",
            PASSWORD_MIN_LENGTH
        ));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit".to_string());
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        return Err(format!(
            "Password must contain at least one special character ({})",
            PASSWORD_SPECIAL_CHARS
        ));
    }
    Ok(())
}

pub fn validate_register_request(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    errors.check("name", validate_length("Name", &req.name, 1, 64));
    errors.check("first_name", validate_length("First name", &req.first_name, 1, 64));
    errors.check(
        "display_name",
        validate_length("Display name", &req.display_name, 1, 64),
    );
    errors.check("email", validate_email(&req.email));
    if req.email != req.re_email {
        errors.add("re_email", "Email addresses do not match");
    }
    errors.check("password", validate_password(&req.password));
    if req.password != req.re_password {
        errors.add("re_password", "Passwords do not match");
    }

    errors.finish()
}

pub fn validate_post(post: &PostDto) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    errors.check("title", validate_length("Title", &post.title, 1, 128));
    errors.check("subtext", validate_length("Subtext", &post.subtext, 0, 256));
    errors.check("author", validate_length("Author", &post.author, 1, 128));
    errors.finish()
}

pub fn validate_post_patch(patch: &PostPatch) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(title) = &patch.title {
        errors.check("title", validate_length("Title", title, 1, 128));
    }
    if let Some(subtext) = &patch.subtext {
        errors.check("subtext", validate_length("Subtext", subtext, 0, 256));
    }
    if let Some(author) = &patch.author {
        errors.check("author", validate_length("Author", author, 1, 128));
    }
    errors.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("first.last+tag@sub.example.org").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@localhost").is_err());
        assert!(validate_email("us er@example.com").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("Secur3-Pass").is_ok());

        assert!(validate_password("S3-p").unwrap_err().contains("at least 8"));
        assert!(validate_password("secur3-pass").unwrap_err().contains("uppercase"));
        assert!(validate_password("SECUR3-PASS").unwrap_err().contains("lowercase"));
        assert!(validate_password("Secure-Pass").unwrap_err().contains("digit"));
        assert!(validate_password("Secur3Pass").unwrap_err().contains("special"));
    }

    #[test]
    fn test_validate_length() {
        assert!(validate_length("Title", "a", 1, 128).is_ok());
        assert_eq!(validate_length("Title", "", 1, 128).unwrap_err(), "Title is required");
        assert!(validate_length("Title", &"x".repeat(129), 1, 128).is_err());
        assert!(validate_length("Subtext", "", 0, 256).is_ok());
        // multi-byte characters count once
        assert!(validate_length("Name", &"ä".repeat(64), 1, 64).is_ok());
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            name: "Lovelace".to_string(),
            first_name: "Ada".to_string(),
            display_name: "ada".to_string(),
            email: "ada@example.com".to_string(),
            re_email: "ada@example.com".to_string(),
            password: "Secur3-Pass".to_string(),
            re_password: "Secur3-Pass".to_string(),
        }
    }

    #[test]
    fn test_validate_register_request() {
        assert!(validate_register_request(&register_request()).is_ok());

        let mut mismatched = register_request();
        mismatched.re_email = "other@example.com".to_string();
        mismatched.re_password = "Different-1".to_string();
        let err = validate_register_request(&mismatched).unwrap_err();
        assert!(err.message().contains("2 fields"));
    }

    #[test]
    fn test_validate_post_patch_only_checks_present_fields() {
        assert!(validate_post_patch(&PostPatch::default()).is_ok());

        let patch = PostPatch {
            title: Some(String::new()),
            ..Default::default()
        };
        assert!(validate_post_patch(&patch).is_err());
    }
}
