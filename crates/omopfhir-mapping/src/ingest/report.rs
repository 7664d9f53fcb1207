//! Outcomes of ingesting mapping files.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Why a single data row was skipped. The rest of the file still loads.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SkipReason {
    #[error("expected at least {expected} columns, found {found}")]
    TooFewColumns { expected: usize, found: usize },

    #[error("source or target code is empty")]
    EmptyCode,

    #[error("code system '{found}' is neither the declared source system nor the source vocabulary")]
    CodeSystemMismatch { found: String },

    #[error("target concept {vocabulary}/{code} does not exist")]
    TargetConceptMissing { vocabulary: String, code: String },

    #[error("could not create source concept: {reason}")]
    ConceptCreationFailed { reason: String },
}

impl SkipReason {
    /// The row contradicts the file's own header rather than being
    /// incomplete or pointing at missing CDM content.
    pub fn contradicts_header(&self) -> bool {
        matches!(self, Self::CodeSystemMismatch { .. })
    }
}

/// A skipped row with its line number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub line: u64,
    pub reason: SkipReason,
}

/// What happened to a file as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum FileOutcome {
    /// Every row was read; individual rows may still have been skipped.
    Processed,
    /// A structural problem rejected the file before any row was loaded.
    Rejected { line: u64, reason: String },
    /// A backend failed mid-file. The file stays in the watched directory.
    Failed { error: String },
}

impl FileOutcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-file ingestion report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionReport {
    pub file: PathBuf,
    pub outcome: FileOutcome,
    pub rows_read: usize,
    pub rows_linked: usize,
    pub skipped: Vec<SkippedRow>,
    pub vocabulary_created: bool,
    pub concepts_created: usize,
    pub relationships_created: usize,
    pub concept_relationships_created: usize,
    /// Where the file ended up; `None` if deleted or left in place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_to: Option<PathBuf>,
}

impl IngestionReport {
    pub(crate) fn new(file: PathBuf) -> Self {
        Self {
            file,
            outcome: FileOutcome::Processed,
            rows_read: 0,
            rows_linked: 0,
            skipped: Vec::new(),
            vocabulary_created: false,
            concepts_created: 0,
            relationships_created: 0,
            concept_relationships_created: 0,
            moved_to: None,
        }
    }

    pub(crate) fn skip(&mut self, line: u64, reason: SkipReason) {
        self.skipped.push(SkippedRow { line, reason });
    }
}

/// Summary of one pass over the watched directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub files_seen: usize,
    pub processed: usize,
    pub rejected: usize,
    pub failed: usize,
    pub reports: Vec<IngestionReport>,
}

impl PassSummary {
    pub(crate) fn record(&mut self, report: IngestionReport) {
        self.files_seen += 1;
        match report.outcome {
            FileOutcome::Processed => self.processed += 1,
            FileOutcome::Rejected { .. } => self.rejected += 1,
            FileOutcome::Failed { .. } => self.failed += 1,
        }
        self.reports.push(report);
    }
}
