//! Input validation for registration, password changes and posts

use regex::Regex;
use std::sync::OnceLock;

use crate::error::AuthError;

pub const USERNAME_MAX: usize = 32;
pub const EMAIL_MAX: usize = 120;
pub const PASSWORD_MIN: usize = 8;
pub const PASSWORD_MAX: usize = 128;
pub const POST_MAX: usize = 140;
pub const LANGUAGE_MAX: usize = 5;

fn invalid(message: impl Into<String>) -> AuthError {
    AuthError::Validation(message.into())
}

pub fn validate_username(username: &str) -> Result<(), AuthError> {
    let length = username.chars().count();
    if !(3..=USERNAME_MAX).contains(&length) {
        return Err(invalid(format!(
            "Username must be between 3 and {} characters long",
            USERNAME_MAX
        )));
    }

    static USERNAME_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = USERNAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9_]+$").expect("username pattern is a valid regex")
    });

    if !regex.is_match(username) {
        return Err(invalid(
            "Username can only contain letters, numbers, and underscores",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), AuthError> {
    if email.is_empty() || email.len() > EMAIL_MAX {
        return Err(invalid(format!(
            "Email is required and must be at most {} characters long",
            EMAIL_MAX
        )));
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
            .expect("email pattern is a valid regex")
    });

    if !regex.is_match(email) {
        return Err(invalid("Invalid email format"));
    }
    Ok(())
}

/// Length bounds only; the hash makes the stored form fixed-size.
pub fn validate_password(password: &str) -> Result<(), AuthError> {
    let length = password.chars().count();
    if length < PASSWORD_MIN {
        return Err(invalid(format!(
            "Password must be at least {} characters long",
            PASSWORD_MIN
        )));
    }
    if length > PASSWORD_MAX {
        return Err(invalid(format!(
            "Password must be at most {} characters long",
            PASSWORD_MAX
        )));
    }
    Ok(())
}

pub fn validate_post_body(body: &str) -> Result<(), AuthError> {
    if body.trim().is_empty() {
        return Err(invalid("Post body is required"));
    }
    if body.chars().count() > POST_MAX {
        return Err(invalid(format!(
            "Post body must be at most {} characters long",
            POST_MAX
        )));
    }
    Ok(())
}

pub fn validate_language(language: Option<&str>) -> Result<(), AuthError> {
    match language {
        Some(language) if language.chars().count() > LANGUAGE_MAX => Err(invalid(format!(
            "Language must be at most {} characters long",
            LANGUAGE_MAX
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("snake_case_42").is_ok());
        assert!(validate_username("al").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("dash-ed").is_err());
        assert!(validate_username(&"a".repeat(USERNAME_MAX + 1)).is_err());
    }

    #[test]
    fn emails() {
        assert!(validate_email("bob@example.com").is_ok());
        assert!(validate_email("first.last+tag@mail.example.org").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("bob").is_err());
        assert!(validate_email("bob@localhost").is_err());
    }

    #[test]
    fn passwords_are_length_checked() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(PASSWORD_MAX + 1)).is_err());
        assert!(matches!(
            validate_password(""),
            Err(AuthError::Validation(_))
        ));
    }

    #[test]
    fn post_bodies() {
        assert!(validate_post_body("hello world").is_ok());
        assert!(validate_post_body("   ").is_err());
        assert!(validate_post_body(&"é".repeat(POST_MAX)).is_ok());
        assert!(validate_post_body(&"é".repeat(POST_MAX + 1)).is_err());
    }

    #[test]
    fn languages() {
        assert!(validate_language(None).is_ok());
        assert!(validate_language(Some("en")).is_ok());
        assert!(validate_language(Some("pt-BR")).is_ok());
        assert!(validate_language(Some("english")).is_err());
        assert!(validate_language(Some(&"é".repeat(LANGUAGE_MAX))).is_ok());
        assert!(validate_language(Some(&"é".repeat(LANGUAGE_MAX + 1))).is_err());
    }
}
