//! Entry types held by the local mapping stores.

use omopfhir_core::{Coding, CoreError};
use serde::{Deserialize, Serialize};

/// Binding between an OMOP vocabulary id and the FHIR system it represents.
///
/// At least one of `fhir_url_system` / `other_system_name` is always set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyMapEntry {
    pub omop_vocabulary_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fhir_url_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_system_name: Option<String>,
}

impl VocabularyMapEntry {
    /// Builds an entry, trimming every field.
    ///
    /// # Errors
    ///
    /// Fails when the vocabulary id is blank or both system fields are blank.
    pub fn new(
        omop_vocabulary_id: impl Into<String>,
        fhir_url_system: Option<String>,
        other_system_name: Option<String>,
    ) -> Result<Self, CoreError> {
        let entry = Self {
            omop_vocabulary_id: omop_vocabulary_id.into().trim().to_string(),
            fhir_url_system: normalize(fhir_url_system),
            other_system_name: normalize(other_system_name),
        };
        entry.validate()?;
        Ok(entry)
    }

    /// Binds `system` as a URL when it starts with `http`, otherwise as an
    /// other-system name.
    pub fn for_system(omop_vocabulary_id: impl Into<String>, system: &str) -> Result<Self, CoreError> {
        let system = system.trim().to_string();
        if system.starts_with("http") {
            Self::new(omop_vocabulary_id, Some(system), None)
        } else {
            Self::new(omop_vocabulary_id, None, Some(system))
        }
    }

    /// Re-checks the invariants, e.g. after deserializing a request body.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.omop_vocabulary_id.trim().is_empty() {
            return Err(CoreError::invalid_vocabulary_map_entry(
                "",
                "OMOP vocabulary id is empty",
            ));
        }
        if is_blank(&self.fhir_url_system) && is_blank(&self.other_system_name) {
            return Err(CoreError::invalid_vocabulary_map_entry(
                &self.omop_vocabulary_id,
                "either fhirUrlSystem or otherSystemName must be set",
            ));
        }
        Ok(())
    }

    /// The URL system if present, otherwise the other-system name.
    pub fn fhir_system(&self) -> Option<&str> {
        self.fhir_url_system
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.other_system_name.as_deref())
            .filter(|s| !s.trim().is_empty())
    }

    /// Whether `system_name` equals either stored system field.
    pub fn matches_system(&self, system_name: &str) -> bool {
        let system_name = system_name.trim();
        self.fhir_url_system.as_deref().map(str::trim) == Some(system_name)
            || self.other_system_name.as_deref().map(str::trim) == Some(system_name)
    }
}

/// Ad hoc binding of an OMOP concept id to a FHIR coding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeMapEntry {
    pub omop_concept: i64,
    pub fhir_system: String,
    pub fhir_code: String,
    #[serde(default)]
    pub fhir_display: String,
}

impl CodeMapEntry {
    pub fn new(
        omop_concept: i64,
        fhir_system: impl Into<String>,
        fhir_code: impl Into<String>,
        fhir_display: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let entry = Self {
            omop_concept,
            fhir_system: fhir_system.into().trim().to_string(),
            fhir_code: fhir_code.into().trim().to_string(),
            fhir_display: fhir_display.into(),
        };
        entry.validate()?;
        Ok(entry)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.fhir_system.trim().is_empty() || self.fhir_code.trim().is_empty() {
            return Err(CoreError::invalid_code_map_entry(
                self.omop_concept,
                "fhirSystem and fhirCode must not be empty",
            ));
        }
        Ok(())
    }

    pub fn to_coding(&self) -> Coding {
        let coding = Coding::new(&self.fhir_system, &self.fhir_code);
        if self.fhir_display.is_empty() {
            coding
        } else {
            coding.with_display(&self.fhir_display)
        }
    }
}

/// US state name to two-letter postal abbreviation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoLetterStateMapEntry {
    pub state_name: String,
    pub two_letter: String,
}

impl TwoLetterStateMapEntry {
    pub fn new(state_name: impl Into<String>, two_letter: impl Into<String>) -> Self {
        Self {
            state_name: state_name.into().trim().to_string(),
            two_letter: two_letter.into().trim().to_string(),
        }
    }
}

/// Result of an insert-if-absent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert<T> {
    /// The row did not exist and was inserted.
    Created(T),
    /// A row with the same natural key already existed and was returned as is.
    Existing(T),
}

impl<T> Upsert<T> {
    pub fn was_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Self::Created(v) | Self::Existing(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Created(v) | Self::Existing(v) => v,
        }
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().is_none_or(|v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_entry_requires_a_system() {
        let err = VocabularyMapEntry::new("LOCAL1", None, Some("  ".into())).unwrap_err();
        assert!(matches!(err, CoreError::InvalidVocabularyMapEntry { .. }));

        assert!(VocabularyMapEntry::new(" ", Some("http://x".into()), None).is_err());
    }

    #[test]
    fn test_vocabulary_entry_for_system() {
        let url = VocabularyMapEntry::for_system("LOCAL1", "http://example.org/local1").unwrap();
        assert_eq!(url.fhir_url_system.as_deref(), Some("http://example.org/local1"));
        assert_eq!(url.other_system_name, None);

        let other = VocabularyMapEntry::for_system("LOCAL2", "urn:oid:1.2.3").unwrap();
        assert_eq!(other.fhir_url_system, None);
        assert_eq!(other.other_system_name.as_deref(), Some("urn:oid:1.2.3"));
        assert_eq!(other.fhir_system(), Some("urn:oid:1.2.3"));
    }

    #[test]
    fn test_vocabulary_entry_matches_either_system() {
        let entry = VocabularyMapEntry::new(
            "LOCAL1",
            Some("http://example.org/local1".into()),
            Some("Local One".into()),
        )
        .unwrap();
        assert!(entry.matches_system("http://example.org/local1"));
        assert!(entry.matches_system(" Local One "));
        assert!(!entry.matches_system("local one"));
        assert_eq!(entry.fhir_system(), Some("http://example.org/local1"));
    }

    #[test]
    fn test_code_map_entry_to_coding() {
        let entry = CodeMapEntry::new(99001, "http://loinc.org", "1234-5", "Test").unwrap();
        let coding = entry.to_coding();
        assert_eq!(coding.system.as_deref(), Some("http://loinc.org"));
        assert_eq!(coding.display.as_deref(), Some("Test"));

        assert!(CodeMapEntry::new(1, "", "x", "").is_err());
    }

    #[test]
    fn test_upsert_accessors() {
        let created = Upsert::Created(5);
        assert!(created.was_created());
        assert_eq!(*created.get(), 5);
        assert_eq!(Upsert::Existing("a").into_inner(), "a");
    }
}
