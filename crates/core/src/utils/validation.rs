/// Input validation utilities
use regex::Regex;

lazy_static::lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"
    ).unwrap();
}

/// Returns a bare `String` reason rather than `CoreError` so callers (model
/// `validate()` methods included) can wrap it in whichever error kind fits
/// the call site.
pub fn validate_email_address(email: &str) -> Result<(), String> {
    if email.len() > crate::constants::MAX_EMAIL_ADDRESS_LENGTH {
        return Err(format!("Email address exceeds maximum length: {email}"));
    }
    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(format!("Invalid email address: {email}"))
    }
}

pub fn validate_attachment_size(size: usize, max_size: usize) -> Result<(), String> {
    if size <= max_size {
        Ok(())
    } else {
        Err(format!(
            "Attachment size {size} exceeds maximum {max_size}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email_address("test@example.com").is_ok());
        assert!(validate_email_address("user+tag@example.co.uk").is_ok());
        assert!(validate_email_address("invalid").is_err());
        assert!(validate_email_address("@example.com").is_err());
    }

    #[test]
    fn test_validate_attachment_size() {
        assert!(validate_attachment_size(1000, 2000).is_ok());
        assert!(validate_attachment_size(3000, 2000).is_err());
    }
}
