//! Error types shared by the alert store, scheduler and notification hub.

use std::io;

use thiserror::Error;

use super::alerts::model::AlertId;

/// Result type alias for alert operations.
pub type AlertResult<T> = Result<T, AlertError>;

#[derive(Debug, Error)]
pub enum AlertError {
    /// Alert id unknown to the store
    #[error("alert not found: {0}")]
    NotFound(AlertId),

    /// Alert record that cannot be evaluated (missing or unparseable time/date)
    #[error("malformed alert {id}: {reason}")]
    Malformed { id: AlertId, reason: String },

    /// Import payload that is not a usable alert list
    #[error("invalid alerts data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AlertError {
    pub fn malformed(id: AlertId, reason: impl Into<String>) -> Self {
        Self::Malformed {
            id,
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(AlertError::NotFound(7).to_string(), "alert not found: 7");
        let err = AlertError::malformed(3, "missing time");
        assert_eq!(err.to_string(), "malformed alert 3: missing time");
        assert!(!err.is_not_found());
        assert!(AlertError::NotFound(1).is_not_found());
    }
}
