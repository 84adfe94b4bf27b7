//! Error types for chorder

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChorderError {
    /// A required selection or precondition is missing; state is unchanged.
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid chord '{label}': {message}")]
    Parse { label: String, message: String },
    /// Imported document is not JSON or does not have the row-map shape.
    #[error("Invalid document: {0}")]
    Format(String),
}

impl ChorderError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn parse(label: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            label: label.to_string(),
            message: message.into(),
        }
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ChorderError>;
