use omopfhir_core::CoreError;
use omopfhir_storage::StorageError;
use thiserror::Error;

/// Errors raised while translating codes or ingesting mapping files.
///
/// "Nothing matched" is never an error: resolver lookups return `Ok(None)`
/// for that, so an `Err` always means bad input or a failing backend.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Invalid mapping input: {0}")]
    InvalidInput(String),

    #[error("Unknown FHIR code system: {0}")]
    UnknownSystem(String),

    #[error("No FHIR code system for OMOP vocabulary: {0}")]
    UnknownVocabulary(String),

    #[error("Malformed mapping file at line {line}: {reason}")]
    MalformedMappingFile { line: u64, reason: String },

    #[error("Concept creation failed: {0}")]
    ConceptCreationFailed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MappingError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn malformed(line: u64, reason: impl Into<String>) -> Self {
        Self::MalformedMappingFile {
            line,
            reason: reason.into(),
        }
    }

    /// Errors that concern one coding and must not fail a whole search.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_) | Self::UnknownSystem(_) | Self::UnknownVocabulary(_)
        )
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<CoreError> for MappingError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(message) => Self::InvalidInput(message),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

/// Result type for mapping operations.
pub type Result<T> = std::result::Result<T, MappingError>;
