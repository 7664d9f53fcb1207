//! Parser for local mapping files.
//!
//! ```text
//! # comments and blank lines are ignored anywhere
//! LOCALLAB^Local Lab Codes,LOINC
//! http://example.org/local-lab,http://loinc.org
//! SOURCE_CODESYSTEM,SOURCE_CODE,SOURCE_DESC,TARGET_CODE
//! http://example.org/local-lab,GLU,Glucose,2345-7
//! ```
//!
//! Comment lines are dropped before csv tokenization, so quotes inside a
//! comment never open a field. The three header lines are read by a small
//! state machine. Any structural problem rejects the file as
//! [`MappingError::MalformedMappingFile`]; data rows are only split into
//! fields here and validated one by one later. Unknown columns are ignored.

use std::io::Read;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::warn;

use super::report::SkipReason;
use crate::error::{MappingError, Result};

pub const SOURCE_CODESYSTEM: &str = "SOURCE_CODESYSTEM";
pub const SOURCE_CODE: &str = "SOURCE_CODE";
pub const SOURCE_DESC: &str = "SOURCE_DESC";
pub const TARGET_CODE: &str = "TARGET_CODE";

/// Column positions taken from the column header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub source_codesystem: usize,
    pub source_code: usize,
    pub source_desc: Option<usize>,
    pub target_code: usize,
}

impl ColumnLayout {
    fn from_header(names: &[String], line: u64) -> Result<Self> {
        let mut codesystem = None;
        let mut code = None;
        let mut desc = None;
        let mut target = None;

        for (index, name) in names.iter().enumerate() {
            let slot = match name.as_str() {
                SOURCE_CODESYSTEM => &mut codesystem,
                SOURCE_CODE => &mut code,
                SOURCE_DESC => &mut desc,
                TARGET_CODE => &mut target,
                other => {
                    warn!(line, column = %other, "Ignoring unknown mapping file column");
                    continue;
                }
            };
            if slot.replace(index).is_some() {
                return Err(MappingError::malformed(
                    line,
                    format!("duplicate column '{name}'"),
                ));
            }
        }

        let require = |slot: Option<usize>, name: &str| {
            slot.ok_or_else(|| {
                MappingError::malformed(line, format!("missing mandatory column {name}"))
            })
        };

        Ok(Self {
            source_codesystem: require(codesystem, SOURCE_CODESYSTEM)?,
            source_code: require(code, SOURCE_CODE)?,
            source_desc: desc,
            target_code: require(target, TARGET_CODE)?,
        })
    }

    /// Columns a row needs; a missing trailing `SOURCE_DESC` is tolerated.
    pub fn required_width(&self) -> usize {
        self.source_codesystem
            .max(self.source_code)
            .max(self.target_code)
            + 1
    }

    /// Picks the mapped fields out of a data record.
    pub fn row(&self, record: &MappingRecord) -> std::result::Result<MappingRow, SkipReason> {
        let expected = self.required_width();
        if record.fields.len() < expected {
            return Err(SkipReason::TooFewColumns {
                expected,
                found: record.fields.len(),
            });
        }

        let field = |index: usize| record.fields[index].clone();
        let source_code = field(self.source_code);
        let target_code = field(self.target_code);
        if source_code.is_empty() || target_code.is_empty() {
            return Err(SkipReason::EmptyCode);
        }

        Ok(MappingRow {
            line: record.line,
            source_codesystem: field(self.source_codesystem),
            source_code,
            source_desc: self
                .source_desc
                .and_then(|index| record.fields.get(index))
                .filter(|desc| !desc.is_empty())
                .cloned(),
            target_code,
        })
    }
}

/// Everything the three header lines declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingFileHeader {
    /// Line of the vocabulary header.
    pub vocabulary_line: u64,
    /// Abbreviation used as the OMOP `vocabulary_id` of the source codes.
    pub source_vocabulary: String,
    pub source_vocabulary_name: String,
    /// Existing OMOP vocabulary the codes map into.
    pub target_vocabulary: String,
    pub fhir_source_system: String,
    pub fhir_target_system: String,
    pub columns: ColumnLayout,
}

/// A data line split into trimmed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRecord {
    pub line: u64,
    pub fields: Vec<String>,
}

/// A data row with its mapped columns resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRow {
    pub line: u64,
    pub source_codesystem: String,
    pub source_code: String,
    pub source_desc: Option<String>,
    pub target_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingFile {
    pub header: MappingFileHeader,
    pub records: Vec<MappingRecord>,
}

enum ParseState {
    ReadHeader1,
    ReadHeader2 {
        source: (String, String),
        target: String,
    },
    ReadColumnHeader {
        source: (String, String),
        target: String,
        systems: (String, String),
    },
    ReadDataRows(MappingFileHeader),
}

impl ParseState {
    fn expecting(&self) -> &'static str {
        match self {
            Self::ReadHeader1 => "the vocabulary header",
            Self::ReadHeader2 { .. } => "the code system header",
            Self::ReadColumnHeader { .. } => "the column header",
            Self::ReadDataRows(_) => "data rows",
        }
    }
}

/// Parses a whole mapping file.
///
/// # Errors
///
/// `MalformedMappingFile` for structural problems, `Io` when reading fails.
pub fn parse_mapping_file<R: Read>(mut input: R) -> Result<MappingFile> {
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let raw = String::from_utf8(raw).map_err(|e| {
        let valid = &e.as_bytes()[..e.utf8_error().valid_up_to()];
        let line = valid.iter().filter(|b| **b == b'\n').count() as u64 + 1;
        MappingError::malformed(line, "invalid UTF-8")
    })?;
    let source = SourceLines::without_comments(&raw);

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(source.text.as_bytes());

    let mut state = ParseState::ReadHeader1;
    let mut records = Vec::new();
    let mut last_line = 0;
    let mut vocabulary_line = 0;

    for result in reader.records() {
        let record = result.map_err(|e| csv_error(e, &source))?;
        let line = record
            .position()
            .map_or(last_line + 1, |p| source.file_line(p.line()));
        last_line = line;

        if is_blank(&record) {
            continue;
        }
        let fields: Vec<String> = record.iter().map(str::to_string).collect();

        state = match state {
            ParseState::ReadHeader1 => {
                vocabulary_line = line;
                let [source, target] = exactly_two(fields, line, "SOURCE^Name,TARGET")?;
                let (abbrev, name) = source
                    .split_once('^')
                    .map(|(a, n)| (a.trim().to_string(), n.trim().to_string()))
                    .filter(|(a, n)| !a.is_empty() && !n.is_empty())
                    .ok_or_else(|| {
                        MappingError::malformed(
                            line,
                            format!("source vocabulary '{source}' is not ABBREV^DisplayName"),
                        )
                    })?;
                ParseState::ReadHeader2 {
                    source: (abbrev, name),
                    target,
                }
            }
            ParseState::ReadHeader2 { source, target } => {
                let [source_system, target_system] =
                    exactly_two(fields, line, "FHIR source system,FHIR target system")?;
                ParseState::ReadColumnHeader {
                    source,
                    target,
                    systems: (source_system, target_system),
                }
            }
            ParseState::ReadColumnHeader {
                source,
                target,
                systems,
            } => {
                let columns = ColumnLayout::from_header(&fields, line)?;
                ParseState::ReadDataRows(MappingFileHeader {
                    vocabulary_line,
                    source_vocabulary: source.0,
                    source_vocabulary_name: source.1,
                    target_vocabulary: target,
                    fhir_source_system: systems.0,
                    fhir_target_system: systems.1,
                    columns,
                })
            }
            ParseState::ReadDataRows(header) => {
                records.push(MappingRecord { line, fields });
                ParseState::ReadDataRows(header)
            }
        };
    }

    match state {
        ParseState::ReadDataRows(header) => Ok(MappingFile { header, records }),
        other => Err(MappingError::malformed(
            last_line,
            format!("file ended while expecting {}", other.expecting()),
        )),
    }
}

/// The input minus its comment lines, with the file line of every kept line.
struct SourceLines {
    text: String,
    numbers: Vec<u64>,
}

impl SourceLines {
    fn without_comments(raw: &str) -> Self {
        let mut text = String::with_capacity(raw.len());
        let mut numbers = Vec::new();
        for (index, line) in raw.lines().enumerate() {
            if line.trim_start().starts_with('#') {
                continue;
            }
            text.push_str(line);
            text.push('\n');
            numbers.push(index as u64 + 1);
        }
        Self { text, numbers }
    }

    /// Maps a 1-based line of the filtered text back to the file.
    fn file_line(&self, line: u64) -> u64 {
        usize::try_from(line)
            .ok()
            .and_then(|line| line.checked_sub(1))
            .and_then(|index| self.numbers.get(index))
            .or(self.numbers.last())
            .copied()
            .unwrap_or(0)
    }
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(str::is_empty)
}

fn exactly_two(fields: Vec<String>, line: u64, expected: &str) -> Result<[String; 2]> {
    let found = fields.len();
    let [a, b]: [String; 2] = fields.try_into().map_err(|_| {
        MappingError::malformed(
            line,
            format!("expected exactly 2 values ({expected}), found {found}"),
        )
    })?;
    if a.is_empty() || b.is_empty() {
        return Err(MappingError::malformed(
            line,
            format!("empty value in header ({expected})"),
        ));
    }
    Ok([a, b])
}

fn csv_error(err: csv::Error, source: &SourceLines) -> MappingError {
    let line = err.position().map_or(0, |p| source.file_line(p.line()));
    match err.into_kind() {
        csv::ErrorKind::Io(io) => MappingError::Io(io),
        kind => MappingError::malformed(line, format!("{kind:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = "\
# local lab mapping
LOCALLAB^Local Lab Codes,LOINC

http://example.org/local-lab,http://loinc.org
SOURCE_CODESYSTEM,SOURCE_CODE,SOURCE_DESC,TARGET_CODE
http://example.org/local-lab,GLU,Glucose,2345-7
  # a comment between rows
LOCALLAB,HGB,,718-7
";

    fn parse(text: &str) -> Result<MappingFile> {
        parse_mapping_file(text.as_bytes())
    }

    fn rejection_line(text: &str) -> (u64, String) {
        match parse(text).unwrap_err() {
            MappingError::MalformedMappingFile { line, reason } => (line, reason),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_well_formed() {
        let file = parse(WELL_FORMED).unwrap();
        assert_eq!(file.header.vocabulary_line, 2);
        assert_eq!(file.header.source_vocabulary, "LOCALLAB");
        assert_eq!(file.header.source_vocabulary_name, "Local Lab Codes");
        assert_eq!(file.header.target_vocabulary, "LOINC");
        assert_eq!(file.header.fhir_source_system, "http://example.org/local-lab");
        assert_eq!(file.header.fhir_target_system, "http://loinc.org");
        assert_eq!(file.records.len(), 2);
        assert_eq!(file.records[0].line, 6);
        assert_eq!(file.records[1].line, 8);

        let layout = file.header.columns;
        let first = layout.row(&file.records[0]).unwrap();
        assert_eq!(first.source_code, "GLU");
        assert_eq!(first.source_desc.as_deref(), Some("Glucose"));
        assert_eq!(first.target_code, "2345-7");

        let second = layout.row(&file.records[1]).unwrap();
        assert_eq!(second.source_codesystem, "LOCALLAB");
        assert!(second.source_desc.is_none());
    }

    #[test]
    fn test_columns_in_any_order() {
        let text = "A^Alpha,LOINC\nurn:a,http://loinc.org\nTARGET_CODE,SOURCE_CODE,SOURCE_CODESYSTEM\n1-1,x,urn:a\n";
        let file = parse(text).unwrap();
        let row = file.header.columns.row(&file.records[0]).unwrap();
        assert_eq!(row.target_code, "1-1");
        assert_eq!(row.source_code, "x");
        assert_eq!(row.source_codesystem, "urn:a");
        assert!(row.source_desc.is_none());
    }

    #[test]
    fn test_missing_mandatory_column() {
        let text = "A^Alpha,LOINC\nurn:a,http://loinc.org\nSOURCE_CODESYSTEM,SOURCE_CODE,SOURCE_DESC\nurn:a,x,y\n";
        let (line, reason) = rejection_line(text);
        assert_eq!(line, 3);
        assert!(reason.contains(TARGET_CODE));
    }

    #[test]
    fn test_unknown_and_duplicate_columns() {
        let unknown = "A^Alpha,LOINC\nurn:a,urn:b\nSOURCE_CODESYSTEM,SOURCE_CODE,target_code\n";
        assert!(rejection_line(unknown).1.contains("missing mandatory column"));

        let extra = "A^Alpha,LOINC\nurn:a,urn:b\nSOURCE_CODESYSTEM,NOTES,SOURCE_CODE,TARGET_CODE\nurn:a,checked by lab,x,1-1\n";
        let file = parse(extra).unwrap();
        let layout = file.header.columns;
        assert_eq!(layout.source_code, 2);
        assert_eq!(layout.target_code, 3);
        let row = layout.row(&file.records[0]).unwrap();
        assert_eq!(row.source_code, "x");
        assert_eq!(row.target_code, "1-1");

        let duplicate =
            "A^Alpha,LOINC\nurn:a,urn:b\nSOURCE_CODESYSTEM,SOURCE_CODE,SOURCE_CODE,TARGET_CODE\n";
        assert!(rejection_line(duplicate).1.contains("duplicate column"));
    }

    #[test]
    fn test_quote_inside_comment() {
        let text = "A^Alpha,LOINC\n# note,\"unbalanced\nurn:a,http://loinc.org\nSOURCE_CODESYSTEM,SOURCE_CODE,TARGET_CODE\nurn:a,x,1-1\n";
        let file = parse(text).unwrap();
        assert_eq!(file.header.vocabulary_line, 1);
        assert_eq!(file.header.fhir_source_system, "urn:a");
        assert_eq!(file.records.len(), 1);
        assert_eq!(file.records[0].line, 5);
    }

    #[test]
    fn test_lines_after_comments_keep_file_numbers() {
        let text = "# a\n# b\nA^Alpha,LOINC\n# c\nurn:a\n";
        let (line, _) = rejection_line(text);
        assert_eq!(line, 5);

        match parse_mapping_file(&b"A^Alpha,LOINC\n\xff\n"[..]).unwrap_err() {
            MappingError::MalformedMappingFile { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("UTF-8"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_header_value_counts() {
        let (line, _) = rejection_line("A^Alpha,LOINC,EXTRA\n");
        assert_eq!(line, 1);

        let (line, _) = rejection_line("A^Alpha,LOINC\nurn:a\n");
        assert_eq!(line, 2);
    }

    #[test]
    fn test_source_vocabulary_needs_caret() {
        assert!(rejection_line("ALPHA,LOINC\n").1.contains("ABBREV^DisplayName"));
        assert!(rejection_line("^Alpha,LOINC\n").1.contains("ABBREV^DisplayName"));
        assert!(rejection_line("A^,LOINC\n").1.contains("ABBREV^DisplayName"));
    }

    #[test]
    fn test_truncated_file() {
        let (line, reason) = rejection_line("# only a comment\nA^Alpha,LOINC\n");
        assert_eq!(line, 2);
        assert!(reason.contains("code system header"));
        assert!(parse("").is_err());
    }

    #[test]
    fn test_short_rows_are_row_level() {
        let text = "A^Alpha,LOINC\nurn:a,urn:b\nSOURCE_CODESYSTEM,SOURCE_CODE,TARGET_CODE\nurn:a,x\nurn:a,,1-1\n";
        let file = parse(text).unwrap();
        let layout = file.header.columns;
        assert_eq!(
            layout.row(&file.records[0]).unwrap_err(),
            SkipReason::TooFewColumns {
                expected: 3,
                found: 2
            }
        );
        assert_eq!(layout.row(&file.records[1]).unwrap_err(), SkipReason::EmptyCode);
    }
}
