//! FHIR `Coding` element and coding comparison.

use serde::{Deserialize, Serialize};

/// A FHIR Coding: a code from a code system identified by its canonical URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Outcome of comparing two codings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodingMatch {
    /// Same system and same code.
    Equal,
    /// Same code, but the systems differ or one of them is missing.
    CodeOnlyMatch,
    /// The codes differ.
    NoMatch,
}

impl Coding {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            code: Some(code.into()),
            display: None,
        }
    }

    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Trimmed system URI, `None` when missing or blank.
    pub fn system_str(&self) -> Option<&str> {
        non_blank(self.system.as_deref())
    }

    /// Trimmed code, `None` when missing or blank.
    pub fn code_str(&self) -> Option<&str> {
        non_blank(self.code.as_deref())
    }

    /// Compare two codings by system and code. Display text is ignored.
    pub fn compare(&self, other: &Coding) -> CodingMatch {
        let code_matches = matches!(
            (self.code_str(), other.code_str()),
            (Some(a), Some(b)) if a == b
        );
        if !code_matches {
            return CodingMatch::NoMatch;
        }

        let system_matches = matches!(
            (self.system_str(), other.system_str()),
            (Some(a), Some(b)) if a == b
        );
        if system_matches {
            CodingMatch::Equal
        } else {
            CodingMatch::CodeOnlyMatch
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_equal() {
        let a = Coding::new("A", "1");
        let b = Coding::new("A", "1").with_display("ignored");
        assert_eq!(a.compare(&b), CodingMatch::Equal);
    }

    #[test]
    fn test_compare_code_only() {
        let a = Coding::new("A", "1");
        let b = Coding::new("B", "1");
        assert_eq!(a.compare(&b), CodingMatch::CodeOnlyMatch);

        let no_system = Coding {
            code: Some("1".into()),
            ..Default::default()
        };
        assert_eq!(a.compare(&no_system), CodingMatch::CodeOnlyMatch);
    }

    #[test]
    fn test_compare_no_match() {
        let a = Coding::new("A", "1");
        let b = Coding::new("A", "2");
        assert_eq!(a.compare(&b), CodingMatch::NoMatch);

        let empty = Coding::default();
        assert_eq!(empty.compare(&Coding::default()), CodingMatch::NoMatch);
    }

    #[test]
    fn test_blank_fields_are_absent() {
        let c = Coding::new("  ", " 1234-5 ");
        assert_eq!(c.system_str(), None);
        assert_eq!(c.code_str(), Some("1234-5"));
    }

    #[test]
    fn test_serialization_skips_missing_fields() {
        let json = serde_json::to_value(Coding::new("http://loinc.org", "1234-5")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"system": "http://loinc.org", "code": "1234-5"})
        );
    }
}
