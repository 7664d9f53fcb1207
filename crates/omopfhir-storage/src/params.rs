//! Generic predicate protocol used to query the OMOP `concept` table.
//!
//! A [`ParameterWrapper`] carries parallel lists of field names, operators and
//! values. Entry `i` of each list forms one condition; the conditions of one
//! wrapper are joined by its [`BooleanRelationship`], and wrappers are AND-ed
//! together by the backend.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// How the values of a wrapper are typed when compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Long,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Equal,
    NotEqual,
    Like,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

impl Operator {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::NotEqual => "<>",
            Self::Like => "LIKE",
            Self::LessThan => "<",
            Self::LessOrEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterOrEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanRelationship {
    #[default]
    And,
    Or,
}

impl BooleanRelationship {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Queryable attributes of a Concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConceptField {
    ConceptId,
    ConceptName,
    DomainId,
    VocabularyId,
    ConceptClassId,
    StandardConcept,
    ConceptCode,
    ValidStartDate,
    ValidEndDate,
    InvalidReason,
}

impl ConceptField {
    /// Accepts the attribute name (`vocabularyId`) or the column name
    /// (`vocabulary_id`).
    pub fn from_name(name: &str) -> Option<Self> {
        let field = match name.trim() {
            "conceptId" | "id" | "concept_id" => Self::ConceptId,
            "conceptName" | "name" | "concept_name" => Self::ConceptName,
            "domainId" | "domain_id" => Self::DomainId,
            "vocabularyId" | "vocabulary_id" => Self::VocabularyId,
            "conceptClassId" | "concept_class_id" => Self::ConceptClassId,
            "standardConcept" | "standard_concept" => Self::StandardConcept,
            "conceptCode" | "concept_code" => Self::ConceptCode,
            "validStartDate" | "valid_start_date" => Self::ValidStartDate,
            "validEndDate" | "valid_end_date" => Self::ValidEndDate,
            "invalidReason" | "invalid_reason" => Self::InvalidReason,
            _ => return None,
        };
        Some(field)
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::ConceptId => "concept_id",
            Self::ConceptName => "concept_name",
            Self::DomainId => "domain_id",
            Self::VocabularyId => "vocabulary_id",
            Self::ConceptClassId => "concept_class_id",
            Self::StandardConcept => "standard_concept",
            Self::ConceptCode => "concept_code",
            Self::ValidStartDate => "valid_start_date",
            Self::ValidEndDate => "valid_end_date",
            Self::InvalidReason => "invalid_reason",
        }
    }
}

/// One predicate group of a concept search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterWrapper {
    pub parameter_type: ParameterType,
    pub field_names: Vec<String>,
    pub operators: Vec<Operator>,
    pub values: Vec<String>,
    #[serde(default)]
    pub boolean_relationship: BooleanRelationship,
}

/// A single validated `field op value` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition<'a> {
    pub field: ConceptField,
    pub operator: Operator,
    pub value: &'a str,
    pub parameter_type: ParameterType,
}

impl ParameterWrapper {
    pub fn new(parameter_type: ParameterType) -> Self {
        Self {
            parameter_type,
            field_names: Vec::new(),
            operators: Vec::new(),
            values: Vec::new(),
            boolean_relationship: BooleanRelationship::And,
        }
    }

    #[must_use]
    pub fn with_condition(
        mut self,
        field_name: impl Into<String>,
        operator: Operator,
        value: impl Into<String>,
    ) -> Self {
        self.field_names.push(field_name.into());
        self.operators.push(operator);
        self.values.push(value.into());
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, relationship: BooleanRelationship) -> Self {
        self.boolean_relationship = relationship;
        self
    }

    /// Zips the three lists into conditions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidQuery` if the lists differ in length, are
    /// empty, or name an unknown field.
    pub fn conditions(&self) -> Result<Vec<Condition<'_>>, StorageError> {
        let n = self.field_names.len();
        if n == 0 {
            return Err(StorageError::invalid_query("parameter has no conditions"));
        }
        if self.operators.len() != n || self.values.len() != n {
            return Err(StorageError::invalid_query(format!(
                "parameter lists differ in length: {} fields, {} operators, {} values",
                n,
                self.operators.len(),
                self.values.len()
            )));
        }

        self.field_names
            .iter()
            .zip(&self.operators)
            .zip(&self.values)
            .map(|((name, operator), value)| {
                let field = ConceptField::from_name(name).ok_or_else(|| {
                    StorageError::invalid_query(format!("unknown concept field '{name}'"))
                })?;
                Ok(Condition {
                    field,
                    operator: *operator,
                    value: value.as_str(),
                    parameter_type: self.parameter_type,
                })
            })
            .collect()
    }
}

/// Ordering of concept search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: ConceptField,
    pub descending: bool,
}

impl SortSpec {
    pub fn ascending(field: ConceptField) -> Self {
        Self {
            field,
            descending: false,
        }
    }

    pub fn descending(field: ConceptField) -> Self {
        Self {
            field,
            descending: true,
        }
    }
}

/// `vocabulary_id = ? AND concept_code = ?`
pub fn concept_code_params(vocabulary_id: &str, concept_code: &str) -> Vec<ParameterWrapper> {
    vec![
        ParameterWrapper::new(ParameterType::String)
            .with_condition("vocabularyId", Operator::Equal, vocabulary_id)
            .with_condition("conceptCode", Operator::Equal, concept_code),
    ]
}

/// `concept_name = ? AND vocabulary_id = ? AND concept_code = ?`
pub fn concept_name_code_params(
    concept_name: &str,
    vocabulary_id: &str,
    concept_code: &str,
) -> Vec<ParameterWrapper> {
    vec![
        ParameterWrapper::new(ParameterType::String)
            .with_condition("conceptName", Operator::Equal, concept_name)
            .with_condition("vocabularyId", Operator::Equal, vocabulary_id)
            .with_condition("conceptCode", Operator::Equal, concept_code),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_and_columns() {
        assert_eq!(
            ConceptField::from_name("vocabularyId"),
            Some(ConceptField::VocabularyId)
        );
        assert_eq!(
            ConceptField::from_name("concept_code"),
            Some(ConceptField::ConceptCode)
        );
        assert_eq!(ConceptField::from_name("drop table"), None);
        assert_eq!(ConceptField::ValidEndDate.column(), "valid_end_date");
    }

    #[test]
    fn test_conditions_zip_lists() {
        let params = concept_code_params("LOINC", "1234-5");
        let conditions = params[0].conditions().unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].field, ConceptField::VocabularyId);
        assert_eq!(conditions[1].value, "1234-5");
    }

    #[test]
    fn test_conditions_reject_mismatched_lists() {
        let mut wrapper = ParameterWrapper::new(ParameterType::String)
            .with_condition("conceptCode", Operator::Equal, "x");
        wrapper.values.push("y".into());
        assert!(matches!(
            wrapper.conditions(),
            Err(StorageError::InvalidQuery { .. })
        ));

        assert!(ParameterWrapper::new(ParameterType::Long).conditions().is_err());
    }

    #[test]
    fn test_conditions_reject_unknown_field() {
        let wrapper = ParameterWrapper::new(ParameterType::String).with_condition(
            "1=1; --",
            Operator::Equal,
            "x",
        );
        assert!(wrapper.conditions().is_err());
    }

    #[test]
    fn test_wrapper_deserializes() {
        let wrapper: ParameterWrapper = serde_json::from_value(serde_json::json!({
            "parameterType": "string",
            "fieldNames": ["conceptCode", "conceptCode"],
            "operators": ["equal", "equal"],
            "values": ["a", "b"],
            "booleanRelationship": "or"
        }))
        .unwrap();
        assert_eq!(wrapper.boolean_relationship, BooleanRelationship::Or);
        assert_eq!(wrapper.conditions().unwrap().len(), 2);
    }
}
