//! Validation errors shared across Jarvis crates.
//!
//! Validation errors are raised synchronously by the composer and by forms. They
//! block the action that triggered them and never mutate shared state.

use thiserror::Error;

/// A user input was rejected before any request was issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The message to send is empty or whitespace only.
    #[error("message is empty")]
    EmptyMessage,

    /// A send is already in flight for this chat.
    #[error("a response is still streaming")]
    Busy,

    /// A project name is required.
    #[error("name is required")]
    EmptyName,

    /// A chat title is required.
    #[error("title is required")]
    EmptyTitle,

    /// The prompt editor content is not valid JSON.
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// The quick specification text is blank.
    #[error("Please enter some text specification.")]
    EmptySpecification,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(
            ValidationError::InvalidJson("expected value".into()).to_string(),
            "Invalid JSON: expected value"
        );
        assert_eq!(ValidationError::EmptyMessage.to_string(), "message is empty");
    }
}
