//! Customer feedback messages.

use chrono::{DateTime, Utc};
use common::FeedbackId;
use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, require_text};
use crate::user::validate_email;

const EMAIL_MAX: usize = 254;

/// A stored feedback message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    pub id: FeedbackId,
    pub email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(fields: FeedbackInput, created_at: DateTime<Utc>) -> Self {
        Self {
            id: FeedbackId::new(),
            email: fields.email,
            message: fields.message,
            created_at,
        }
    }
}

/// Feedback as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedbackInput {
    pub email: String,
    pub message: String,
}

impl FeedbackInput {
    /// Requires a plausible email address and a non-empty message.
    pub fn validate(self) -> Result<Self, ValidationError> {
        require_text("email", &self.email, Some(EMAIL_MAX))?;
        validate_email(&self.email)?;
        require_text("message", &self.message, None)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(email: &str, message: &str) -> FeedbackInput {
        FeedbackInput {
            email: email.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn accepts_valid_feedback() {
        let fields = input("buyer@shop.eg", "Fast delivery").validate().unwrap();
        let feedback = Feedback::new(fields, Utc::now());
        assert_eq!(feedback.email, "buyer@shop.eg");
    }

    #[test]
    fn rejects_bad_email_and_blank_message() {
        assert_eq!(input("buyer", "hi").validate().unwrap_err().field, "email");
        assert_eq!(input("", "hi").validate().unwrap_err().field, "email");
        assert_eq!(
            input("buyer@shop.eg", "  ").validate().unwrap_err().field,
            "message"
        );
    }
}
