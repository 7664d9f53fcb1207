//! Compiled mapping between well-known FHIR code system URIs and OMOP
//! vocabulary ids.
//!
//! The table is fixed at build time. Codes from any other system go through the
//! persistent vocabulary map in `omopfhir-storage`.

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::error::{CoreError, Result};

/// One `(FHIR URI, OMOP vocabulary)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeSystemMapping {
    pub fhir_uri: &'static str,
    pub omop_vocabulary: &'static str,
}

const fn mapping(fhir_uri: &'static str, omop_vocabulary: &'static str) -> CodeSystemMapping {
    CodeSystemMapping {
        fhir_uri,
        omop_vocabulary,
    }
}

pub const KNOWN_CODE_SYSTEMS: &[CodeSystemMapping] = &[
    mapping("http://www.whocc.no/atc", "ATC"),
    mapping("http://www.ama-assn.org/go/cpt", "CPT4"),
    mapping("urn:oid:2.16.840.1.113883.6.285", "HCPCS"),
    mapping("http://hl7.org/fhir/sid/icd-9-cm", "ICD9CM"),
    mapping("http://hl7.org/fhir/sid/icd-9-proc", "ICD9Proc"),
    mapping("http://hl7.org/fhir/sid/icd-10", "ICD10"),
    mapping("http://hl7.org/fhir/sid/icd-10-cm", "ICD10CM"),
    mapping("http://www.iccbba.org/isbt128", "ISBT128"),
    mapping("http://loinc.org", "LOINC"),
    mapping("http://hl7.org/fhir/sid/ndc", "NDC"),
    mapping("http://hl7.org/fhir/ndfrt", "NDFRT"),
    mapping("http://www.nlm.nih.gov/research/umls/rxnorm", "RxNorm"),
    mapping("http://snomed.info/sct", "SNOMED"),
    mapping("http://unitsofmeasure.org", "UCUM"),
];

static REGISTRY: LazyLock<StaticCodeSystemRegistry> =
    LazyLock::new(|| StaticCodeSystemRegistry::from_mappings(KNOWN_CODE_SYSTEMS));

/// Bidirectional lookup over [`KNOWN_CODE_SYSTEMS`].
#[derive(Debug)]
pub struct StaticCodeSystemRegistry {
    by_uri: HashMap<&'static str, &'static str>,
    by_vocabulary: HashMap<&'static str, &'static str>,
}

impl StaticCodeSystemRegistry {
    /// The process-wide registry built from [`KNOWN_CODE_SYSTEMS`].
    pub fn global() -> &'static Self {
        &REGISTRY
    }

    pub fn from_mappings(mappings: &[CodeSystemMapping]) -> Self {
        let mut by_uri = HashMap::with_capacity(mappings.len());
        let mut by_vocabulary = HashMap::with_capacity(mappings.len());
        for m in mappings {
            by_uri.insert(m.fhir_uri, m.omop_vocabulary);
            by_vocabulary.insert(m.omop_vocabulary, m.fhir_uri);
        }
        Self {
            by_uri,
            by_vocabulary,
        }
    }

    /// OMOP vocabulary id for a FHIR system URI.
    ///
    /// Returns `Ok(None)` for a URI that is not in the table and
    /// `Err(CoreError::InvalidInput)` for a blank one.
    pub fn vocabulary_for_uri(&self, uri: &str) -> Result<Option<&'static str>> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(CoreError::invalid_input("FHIR code system URI is empty"));
        }
        Ok(self.by_uri.get(uri).copied())
    }

    /// FHIR system URI for an OMOP vocabulary id.
    ///
    /// Returns `Ok(None)` for an unknown vocabulary and
    /// `Err(CoreError::InvalidInput)` for a blank one.
    pub fn uri_for_vocabulary(&self, vocabulary_id: &str) -> Result<Option<&'static str>> {
        let vocabulary_id = vocabulary_id.trim();
        if vocabulary_id.is_empty() {
            return Err(CoreError::invalid_input("OMOP vocabulary id is empty"));
        }
        Ok(self.by_vocabulary.get(vocabulary_id).copied())
    }

    /// Whether the URI is one of the compiled code systems.
    pub fn is_known_uri(&self, uri: &str) -> bool {
        matches!(self.vocabulary_for_uri(uri), Ok(Some(_)))
    }

    pub fn len(&self) -> usize {
        self.by_uri.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uri.is_empty()
    }
}
