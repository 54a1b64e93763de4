//! Domain error types.

use thiserror::Error;

/// Coarse classification of a domain failure.
///
/// The HTTP boundary maps each kind to a status code; nothing below it
/// needs to know about HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input shape or a rule the caller can fix by changing the request.
    Validation,
    /// A referenced entity does not exist.
    NotFound,
    /// The request conflicts with the current state of the system.
    Conflict,
}

/// A field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    /// Name of the offending field, as exposed over the API.
    pub field: &'static str,
    /// Human-readable explanation.
    pub reason: String,
}

impl ValidationError {
    /// Creates a validation error for a field.
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Checks that a required text field is non-empty and within `max_chars`.
pub(crate) fn require_text(
    field: &'static str,
    value: &str,
    max_chars: Option<usize>,
) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    check_length(field, value, max_chars)
}

/// Checks that a text field is within `max_chars` characters.
pub(crate) fn check_length(
    field: &'static str,
    value: &str,
    max_chars: Option<usize>,
) -> Result<(), ValidationError> {
    if let Some(max) = max_chars
        && value.chars().count() > max
    {
        return Err(ValidationError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_field() {
        let err = ValidationError::new("sku", "must not be empty");
        assert_eq!(err.to_string(), "Invalid sku: must not be empty");
    }

    #[test]
    fn require_text_rejects_blank() {
        assert!(require_text("name", "   ", None).is_err());
        assert!(require_text("name", "Shoe", Some(50)).is_ok());
    }

    #[test]
    fn length_counts_characters_not_bytes() {
        // Five Arabic letters are ten bytes in UTF-8.
        assert!(check_length("name_ar", "أحمرر", Some(5)).is_ok());
        assert!(check_length("name_ar", "أحمررر", Some(5)).is_err());
    }
}
