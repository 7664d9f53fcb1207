//! Evaluation of [`ParameterWrapper`] predicates against in-memory concepts.

use std::cmp::Ordering;

use omopfhir_core::Concept;
use omopfhir_storage::{
    BooleanRelationship, ConceptField, Condition, Operator, ParameterType, ParameterWrapper,
    SortSpec, StorageError,
};
use time::Date;
use time::macros::format_description;

/// A concept attribute lifted out for comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FieldValue<'a> {
    Null,
    Long(i64),
    Date(Date),
    Text(&'a str),
}

pub fn field_value(concept: &Concept, field: ConceptField) -> FieldValue<'_> {
    match field {
        ConceptField::ConceptId => FieldValue::Long(concept.id),
        ConceptField::ConceptName => FieldValue::Text(&concept.name),
        ConceptField::DomainId => FieldValue::Text(&concept.domain_id),
        ConceptField::VocabularyId => FieldValue::Text(&concept.vocabulary_id),
        ConceptField::ConceptClassId => FieldValue::Text(&concept.concept_class_id),
        ConceptField::StandardConcept => concept
            .standard_concept
            .as_deref()
            .map_or(FieldValue::Null, FieldValue::Text),
        ConceptField::ConceptCode => FieldValue::Text(&concept.concept_code),
        ConceptField::ValidStartDate => FieldValue::Date(concept.valid_start_date),
        ConceptField::ValidEndDate => FieldValue::Date(concept.valid_end_date),
        ConceptField::InvalidReason => concept
            .invalid_reason
            .as_deref()
            .map_or(FieldValue::Null, FieldValue::Text),
    }
}

/// Whether `concept` satisfies every wrapper.
pub fn matches_all(concept: &Concept, params: &[ParameterWrapper]) -> Result<bool, StorageError> {
    for wrapper in params {
        if !matches_wrapper(concept, wrapper)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn matches_wrapper(concept: &Concept, wrapper: &ParameterWrapper) -> Result<bool, StorageError> {
    let conditions = wrapper.conditions()?;
    let mut results = Vec::with_capacity(conditions.len());
    for condition in &conditions {
        results.push(evaluate(concept, condition)?);
    }
    Ok(match wrapper.boolean_relationship {
        BooleanRelationship::And => results.iter().all(|r| *r),
        BooleanRelationship::Or => results.iter().any(|r| *r),
    })
}

fn evaluate(concept: &Concept, condition: &Condition<'_>) -> Result<bool, StorageError> {
    let actual = field_value(concept, condition.field);
    if actual == FieldValue::Null {
        // NULL never satisfies a comparison
        return Ok(false);
    }

    if condition.operator == Operator::Like {
        let text = match actual {
            FieldValue::Text(t) => t.to_string(),
            FieldValue::Long(n) => n.to_string(),
            FieldValue::Date(d) => d.to_string(),
            FieldValue::Null => return Ok(false),
        };
        return Ok(like(&text, condition.value));
    }

    let ordering = match (condition.parameter_type, actual) {
        (ParameterType::Long, FieldValue::Long(n)) => n.cmp(&parse_long(condition.value)?),
        (ParameterType::Date, FieldValue::Date(d)) => d.cmp(&parse_date(condition.value)?),
        (ParameterType::String, FieldValue::Text(t)) => t.cmp(condition.value),
        (ParameterType::String, FieldValue::Long(n)) => n.cmp(&parse_long(condition.value)?),
        (ParameterType::String, FieldValue::Date(d)) => d.cmp(&parse_date(condition.value)?),
        (ty, _) => {
            return Err(StorageError::invalid_query(format!(
                "{ty:?} parameter cannot be compared with {}",
                condition.field.column()
            )));
        }
    };

    Ok(match condition.operator {
        Operator::Equal => ordering == Ordering::Equal,
        Operator::NotEqual => ordering != Ordering::Equal,
        Operator::LessThan => ordering == Ordering::Less,
        Operator::LessOrEqual => ordering != Ordering::Greater,
        Operator::GreaterThan => ordering == Ordering::Greater,
        Operator::GreaterOrEqual => ordering != Ordering::Less,
        Operator::Like => unreachable!("handled above"),
    })
}

fn parse_long(value: &str) -> Result<i64, StorageError> {
    value
        .trim()
        .parse()
        .map_err(|_| StorageError::invalid_query(format!("'{value}' is not an integer")))
}

fn parse_date(value: &str) -> Result<Date, StorageError> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| StorageError::invalid_query(format!("'{value}' is not a YYYY-MM-DD date")))
}

/// SQL `LIKE` matching: `%` is any run of characters, `_` is one character.
pub fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();

    let (mut t, mut p) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((bp, bt)) = backtrack {
            p = bp + 1;
            t = bt + 1;
            backtrack = Some((bp, bt + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

pub fn compare(a: &Concept, b: &Concept, sort: Option<&SortSpec>) -> Ordering {
    let Some(sort) = sort else {
        return a.id.cmp(&b.id);
    };
    let ordering = field_value(a, sort.field)
        .cmp(&field_value(b, sort.field))
        .then(a.id.cmp(&b.id));
    if sort.descending {
        ordering.reverse()
    } else {
        ordering
    }
}
