//! OMOP CDM vocabulary entities touched by the mapping engine.

use serde::{Deserialize, Serialize};
use time::Date;
use time::macros::date;

/// Domain of the metadata concept that represents a vocabulary.
pub const METADATA_DOMAIN: &str = "Metadata";
/// Concept class (and vocabulary id) of vocabulary metadata concepts.
pub const VOCABULARY_CONCEPT_CLASS: &str = "Vocabulary";
pub const VOCABULARY_VOCABULARY_ID: &str = "Vocabulary";
/// Concept code stamped on concepts generated for local vocabularies.
pub const GENERATED_CONCEPT_CODE: &str = "OMOPonFHIR generated";

pub const DEFAULT_VALID_START: Date = date!(1970 - 01 - 01);
pub const DEFAULT_VALID_END: Date = date!(2099 - 12 - 31);

/// A row of the OMOP `concept` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub id: i64,
    pub name: String,
    pub domain_id: String,
    pub vocabulary_id: String,
    pub concept_class_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_concept: Option<String>,
    pub concept_code: String,
    pub valid_start_date: Date,
    pub valid_end_date: Date,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

impl Concept {
    /// The metadata concept that an OMOP `vocabulary` row points at.
    pub fn vocabulary_metadata(id: i64, vocabulary_name: impl Into<String>) -> Self {
        Self {
            id,
            name: vocabulary_name.into(),
            domain_id: METADATA_DOMAIN.to_string(),
            vocabulary_id: VOCABULARY_VOCABULARY_ID.to_string(),
            concept_class_id: VOCABULARY_CONCEPT_CLASS.to_string(),
            standard_concept: None,
            concept_code: GENERATED_CONCEPT_CODE.to_string(),
            valid_start_date: DEFAULT_VALID_START,
            valid_end_date: DEFAULT_VALID_END,
            invalid_reason: None,
        }
    }
}

/// A row of the OMOP `vocabulary` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vocabulary {
    pub id: String,
    pub name: String,
    pub reference: String,
    pub version: String,
    pub vocabulary_concept_id: i64,
}

/// A row of the OMOP `relationship` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    pub name: String,
    pub is_hierarchical: bool,
    pub defines_ancestry: bool,
    pub reverse_relationship_id: String,
    #[serde(default)]
    pub relationship_concept_id: i64,
}

impl Relationship {
    /// The non-hierarchical equivalence relationship between two vocabularies,
    /// named `"{source} - {target} eq"`.
    pub fn equivalence(source_vocabulary: &str, target_vocabulary: &str) -> Self {
        let id = format!("{source_vocabulary} - {target_vocabulary} eq");
        Self {
            name: id.clone(),
            id,
            is_hierarchical: false,
            defines_ancestry: false,
            reverse_relationship_id: format!("{target_vocabulary} - {source_vocabulary} eq"),
            relationship_concept_id: 0,
        }
    }
}

/// Composite key of the `concept_relationship` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptRelationshipKey {
    pub source_concept_id: i64,
    pub target_concept_id: i64,
    pub relationship_id: String,
}

/// A row of the OMOP `concept_relationship` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptRelationship {
    pub source_concept_id: i64,
    pub target_concept_id: i64,
    pub relationship_id: String,
    pub valid_start_date: Date,
    pub valid_end_date: Date,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
}

impl ConceptRelationship {
    /// A relationship valid from the epoch until 2099-12-31.
    pub fn new(
        source_concept_id: i64,
        target_concept_id: i64,
        relationship_id: impl Into<String>,
    ) -> Self {
        Self {
            source_concept_id,
            target_concept_id,
            relationship_id: relationship_id.into(),
            valid_start_date: DEFAULT_VALID_START,
            valid_end_date: DEFAULT_VALID_END,
            invalid_reason: None,
        }
    }

    pub fn key(&self) -> ConceptRelationshipKey {
        ConceptRelationshipKey {
            source_concept_id: self.source_concept_id,
            target_concept_id: self.target_concept_id,
            relationship_id: self.relationship_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalence_relationship_ids() {
        let rel = Relationship::equivalence("LOCALLAB", "LOINC");
        assert_eq!(rel.id, "LOCALLAB - LOINC eq");
        assert_eq!(rel.reverse_relationship_id, "LOINC - LOCALLAB eq");
        assert!(!rel.is_hierarchical);
        assert!(!rel.defines_ancestry);
    }

    #[test]
    fn test_vocabulary_metadata_concept() {
        let concept = Concept::vocabulary_metadata(2_000_000_000, "Local lab codes");
        assert_eq!(concept.domain_id, "Metadata");
        assert_eq!(concept.concept_class_id, "Vocabulary");
        assert_eq!(concept.concept_code, "OMOPonFHIR generated");
        assert_eq!(concept.valid_end_date, date!(2099 - 12 - 31));
    }

    #[test]
    fn test_concept_relationship_key_and_validity() {
        let cr = ConceptRelationship::new(1, 2, "A - B eq");
        assert_eq!(cr.valid_start_date, date!(1970 - 01 - 01));
        assert_eq!(
            cr.key(),
            ConceptRelationshipKey {
                source_concept_id: 1,
                target_concept_id: 2,
                relationship_id: "A - B eq".into(),
            }
        );
    }

    #[test]
    fn test_concept_json_uses_iso_dates() {
        let concept = Concept::vocabulary_metadata(7, "X");
        let json = serde_json::to_value(&concept).unwrap();
        assert_eq!(json["validEndDate"], "2099-12-31");
        assert_eq!(json["conceptCode"], "OMOPonFHIR generated");
        let back: Concept = serde_json::from_value(json).unwrap();
        assert_eq!(back, concept);
    }
}
