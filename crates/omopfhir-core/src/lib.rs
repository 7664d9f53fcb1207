pub mod coding;
pub mod error;
pub mod omop;
pub mod registry;

pub use coding::{Coding, CodingMatch};
pub use error::{CoreError, ErrorCategory, Result};
pub use omop::{
    Concept, ConceptRelationship, ConceptRelationshipKey, Relationship, Vocabulary,
    DEFAULT_VALID_END, DEFAULT_VALID_START, GENERATED_CONCEPT_CODE, METADATA_DOMAIN,
    VOCABULARY_CONCEPT_CLASS, VOCABULARY_VOCABULARY_ID,
};
pub use registry::{CodeSystemMapping, StaticCodeSystemRegistry, KNOWN_CODE_SYSTEMS};
