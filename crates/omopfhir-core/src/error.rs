use thiserror::Error;

/// Core error types for OMOP/FHIR code translation
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid mapping input: {0}")]
    InvalidInput(String),

    #[error("Invalid vocabulary map entry for '{omop_vocabulary_id}': {message}")]
    InvalidVocabularyMapEntry {
        omop_vocabulary_id: String,
        message: String,
    },

    #[error("Invalid code map entry for concept {omop_concept}: {message}")]
    InvalidCodeMapEntry { omop_concept: i64, message: String },

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a new InvalidInput error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a new InvalidVocabularyMapEntry error
    pub fn invalid_vocabulary_map_entry(
        omop_vocabulary_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidVocabularyMapEntry {
            omop_vocabulary_id: omop_vocabulary_id.into(),
            message: message.into(),
        }
    }

    /// Create a new InvalidCodeMapEntry error
    pub fn invalid_code_map_entry(omop_concept: i64, message: impl Into<String>) -> Self {
        Self::InvalidCodeMapEntry {
            omop_concept,
            message: message.into(),
        }
    }

    /// Create a new InvalidDate error
    pub fn invalid_date(message: impl Into<String>) -> Self {
        Self::InvalidDate(message.into())
    }

    /// Check if this error was caused by caller-supplied data
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::InvalidVocabularyMapEntry { .. }
                | Self::InvalidCodeMapEntry { .. }
                | Self::InvalidDate(_)
                | Self::JsonError(_)
        )
    }

    /// Get error category for logging/monitoring
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_)
            | Self::InvalidVocabularyMapEntry { .. }
            | Self::InvalidCodeMapEntry { .. }
            | Self::InvalidDate(_) => ErrorCategory::Validation,
            Self::JsonError(_) => ErrorCategory::Serialization,
        }
    }
}

/// Error categories for monitoring and classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Serialization,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Serialization => write!(f, "serialization"),
        }
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::invalid_input("empty FHIR system URI");
        assert_eq!(err.to_string(), "Invalid mapping input: empty FHIR system URI");

        let err = CoreError::invalid_vocabulary_map_entry("LOCAL1", "no system given");
        assert_eq!(
            err.to_string(),
            "Invalid vocabulary map entry for 'LOCAL1': no system given"
        );
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            CoreError::invalid_input("x").category(),
            ErrorCategory::Validation
        );
        assert!(CoreError::invalid_date("2099-13-01").is_client_error());
        assert_eq!(ErrorCategory::Validation.to_string(), "validation");
    }
}
