//! Loads local mapping files into the OMOP vocabulary tables.
//!
//! For each file the pipeline makes sure the source vocabulary exists,
//! creates one concept per new source code and links it to the existing
//! target concept through a `"{source} - {target} eq"` relationship. Every
//! write is a `create_if_absent`, so loading the same file twice changes
//! nothing the second time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use omopfhir_core::{
    Concept, ConceptRelationship, Relationship, StaticCodeSystemRegistry, Vocabulary,
};
use omopfhir_storage::{
    ConceptMatch, DynVocabularyMapStore, MappingStores, OmopServices, Upsert, VocabularyMapEntry,
};
use time::OffsetDateTime;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::disposition::{FileDisposition, PROCESSED_DIR, REJECTED_DIR};
use super::parser::{MappingFileHeader, MappingRow, parse_mapping_file};
use super::report::{FileOutcome, IngestionReport, PassSummary, SkipReason};
use crate::allocator::ConceptIdAllocator;
use crate::error::{MappingError, Result};

/// Where the pipeline reads files and where they go afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionSettings {
    pub directory: PathBuf,
    pub processed: FileDisposition,
    pub rejected: FileDisposition,
}

impl IngestionSettings {
    /// Watches `directory`, moving files into its `processed/` and
    /// `rejected/` subdirectories.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        let directory = directory.into();
        Self {
            processed: FileDisposition::MoveTo(directory.join(PROCESSED_DIR)),
            rejected: FileDisposition::MoveTo(directory.join(REJECTED_DIR)),
            directory,
        }
    }

    #[must_use]
    pub fn with_processed(mut self, disposition: FileDisposition) -> Self {
        self.processed = disposition;
        self
    }

    #[must_use]
    pub fn with_rejected(mut self, disposition: FileDisposition) -> Self {
        self.rejected = disposition;
        self
    }
}

enum RowOutcome {
    Linked,
    Skipped(SkipReason),
}

/// Per-file state carried across rows.
#[derive(Default)]
struct FileState {
    vocabulary_ready: bool,
    relationship_id: Option<String>,
}

pub struct LocalMappingIngestionPipeline {
    services: OmopServices,
    vocabulary_map: DynVocabularyMapStore,
    registry: &'static StaticCodeSystemRegistry,
    allocator: Arc<ConceptIdAllocator>,
    settings: IngestionSettings,
    pass_lock: Mutex<()>,
}

impl LocalMappingIngestionPipeline {
    pub fn new(
        services: OmopServices,
        stores: &MappingStores,
        allocator: Arc<ConceptIdAllocator>,
        settings: IngestionSettings,
    ) -> Self {
        Self {
            services,
            vocabulary_map: stores.vocabulary_map.clone(),
            registry: StaticCodeSystemRegistry::global(),
            allocator,
            settings,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &IngestionSettings {
        &self.settings
    }

    /// Ingests every regular file in the watched directory, in name order.
    ///
    /// Passes never overlap: a call made while another pass runs waits for
    /// it to finish.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let _pass = self.pass_lock.lock().await;
        let directory = &self.settings.directory;
        fs::create_dir_all(directory).await?;

        let mut summary = PassSummary::default();
        for path in list_files(directory).await? {
            let mut report = self.ingest_file(&path).await;
            let disposition = match report.outcome {
                FileOutcome::Processed => Some(&self.settings.processed),
                FileOutcome::Rejected { .. } => Some(&self.settings.rejected),
                FileOutcome::Failed { .. } => None,
            };
            if let Some(disposition) = disposition {
                match disposition.apply(&path).await {
                    Ok(moved_to) => report.moved_to = moved_to,
                    Err(e) => {
                        error!(file = %path.display(), error = %e, "Failed to remove mapping file from the watched directory");
                    }
                }
            }
            summary.record(report);
        }

        if summary.files_seen > 0 {
            info!(
                files = summary.files_seen,
                processed = summary.processed,
                rejected = summary.rejected,
                failed = summary.failed,
                "Local mapping ingestion pass finished"
            );
        } else {
            debug!(directory = %directory.display(), "No local mapping files");
        }
        Ok(summary)
    }

    /// Loads one file without moving it.
    pub async fn ingest_file(&self, path: &Path) -> IngestionReport {
        let mut report = IngestionReport::new(path.to_path_buf());
        match self.load(path, &mut report).await {
            Ok(()) => {
                info!(
                    file = %path.display(),
                    rows = report.rows_read,
                    linked = report.rows_linked,
                    skipped = report.skipped.len(),
                    concepts_created = report.concepts_created,
                    "Loaded local mapping file"
                );
            }
            Err(MappingError::MalformedMappingFile { line, reason }) => {
                error!(file = %path.display(), line, reason = %reason, "Rejected local mapping file");
                report.outcome = FileOutcome::Rejected { line, reason };
            }
            Err(e) => {
                error!(file = %path.display(), error = %e, "Local mapping file left for the next pass");
                report.outcome = FileOutcome::Failed {
                    error: e.to_string(),
                };
            }
        }
        report
    }

    async fn load(&self, path: &Path, report: &mut IngestionReport) -> Result<()> {
        let bytes = fs::read(path).await?;
        let file = parse_mapping_file(bytes.as_slice())?;
        let header = &file.header;

        if self
            .services
            .vocabularies
            .find_by_id(&header.target_vocabulary)
            .await?
            .is_none()
        {
            return Err(MappingError::malformed(
                header.vocabulary_line,
                format!("target vocabulary '{}' does not exist", header.target_vocabulary),
            ));
        }

        let mut state = FileState::default();
        for record in &file.records {
            report.rows_read += 1;
            if !state.vocabulary_ready {
                self.ensure_source_vocabulary(header, report).await?;
                state.vocabulary_ready = true;
            }

            let outcome = match header.columns.row(record) {
                Ok(row) => self.link_row(header, &row, &mut state, report).await?,
                Err(reason) => RowOutcome::Skipped(reason),
            };
            match outcome {
                RowOutcome::Linked => report.rows_linked += 1,
                RowOutcome::Skipped(reason) => {
                    if reason.contradicts_header() {
                        error!(file = %path.display(), line = record.line, reason = %reason, "Skipping mapping row");
                    } else {
                        warn!(file = %path.display(), line = record.line, reason = %reason, "Skipping mapping row");
                    }
                    report.skip(record.line, reason);
                }
            }
        }
        Ok(())
    }

    /// Creates the source vocabulary, its metadata concept and its
    /// vocabulary-map binding when missing.
    async fn ensure_source_vocabulary(
        &self,
        header: &MappingFileHeader,
        report: &mut IngestionReport,
    ) -> Result<()> {
        let existing = self
            .services
            .vocabularies
            .find_by_id(&header.source_vocabulary)
            .await?;

        let ours = match existing {
            Some(vocabulary) => vocabulary.reference == header.fhir_source_system,
            None => {
                let metadata = self
                    .metadata_concept(&header.source_vocabulary_name, report)
                    .await?;
                let vocabulary = Vocabulary {
                    id: header.source_vocabulary.clone(),
                    name: header.source_vocabulary_name.clone(),
                    reference: header.fhir_source_system.clone(),
                    version: OffsetDateTime::now_utc().date().to_string(),
                    vocabulary_concept_id: metadata.id,
                };
                let upsert = self.services.vocabularies.create_if_absent(&vocabulary).await?;
                if upsert.was_created() {
                    info!(vocabulary = %vocabulary.id, concept_id = metadata.id, "Created local vocabulary");
                    report.vocabulary_created = true;
                }
                true
            }
        };

        if ours {
            self.bind_source_system(header).await?;
        }
        Ok(())
    }

    async fn metadata_concept(
        &self,
        vocabulary_name: &str,
        report: &mut IngestionReport,
    ) -> Result<Concept> {
        let candidate = Concept::vocabulary_metadata(0, vocabulary_name);
        let key = ConceptMatch::NameVocabularyAndCode;
        let found = self
            .services
            .concepts
            .search_with_params(0, 1, &key.params_for(&candidate), None)
            .await?;
        if let Some(existing) = found.into_iter().next() {
            return Ok(existing);
        }

        let candidate = Concept {
            id: self.allocator.next_id().await?,
            ..candidate
        };
        match self.services.concepts.create_if_absent(&candidate, key).await {
            Ok(Upsert::Created(concept)) => {
                report.concepts_created += 1;
                Ok(concept)
            }
            Ok(Upsert::Existing(concept)) => Ok(concept),
            Err(e) if e.is_already_exists() => Err(MappingError::ConceptCreationFailed(
                format!("vocabulary concept '{vocabulary_name}': {e}"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Binds a source system the static registry does not know to the
    /// vocabulary, unless the system is bound already.
    async fn bind_source_system(&self, header: &MappingFileHeader) -> Result<()> {
        let system = header.fhir_source_system.as_str();
        if self.registry.vocabulary_for_uri(system)?.is_some() {
            return Ok(());
        }
        if self
            .vocabulary_map
            .lookup_vocabulary_by_fhir_system(system)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let entry = VocabularyMapEntry::for_system(header.source_vocabulary.clone(), system)?;
        match self.vocabulary_map.save(&entry).await {
            Ok(()) => {
                info!(vocabulary = %entry.omop_vocabulary_id, system, "Bound FHIR system to local vocabulary");
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                warn!(
                    vocabulary = %entry.omop_vocabulary_id,
                    system,
                    "Vocabulary is already bound to another FHIR system"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn link_row(
        &self,
        header: &MappingFileHeader,
        row: &MappingRow,
        state: &mut FileState,
        report: &mut IngestionReport,
    ) -> Result<RowOutcome> {
        if row.source_codesystem != header.fhir_source_system
            && row.source_codesystem != header.source_vocabulary
        {
            return Ok(RowOutcome::Skipped(SkipReason::CodeSystemMismatch {
                found: row.source_codesystem.clone(),
            }));
        }

        let Some(target) = self
            .services
            .concepts
            .find_by_code(&header.target_vocabulary, &row.target_code)
            .await?
        else {
            return Ok(RowOutcome::Skipped(SkipReason::TargetConceptMissing {
                vocabulary: header.target_vocabulary.clone(),
                code: row.target_code.clone(),
            }));
        };

        let source = match self.source_concept(header, row, &target, report).await? {
            Ok(source) => source,
            Err(reason) => return Ok(RowOutcome::Skipped(reason)),
        };

        let relationship_id = match state.relationship_id.clone() {
            Some(id) => id,
            None => {
                let relationship =
                    Relationship::equivalence(&header.source_vocabulary, &header.target_vocabulary);
                let upsert = self
                    .services
                    .relationships
                    .create_if_absent(&relationship)
                    .await?;
                if upsert.was_created() {
                    info!(relationship = %relationship.id, "Created relationship");
                    report.relationships_created += 1;
                }
                let id = upsert.into_inner().id;
                state.relationship_id = Some(id.clone());
                id
            }
        };

        let link = ConceptRelationship::new(source.id, target.id, relationship_id);
        if self
            .services
            .concept_relationships
            .create_if_absent(&link)
            .await?
            .was_created()
        {
            report.concept_relationships_created += 1;
        }
        Ok(RowOutcome::Linked)
    }

    /// Finds the source concept or creates it after the target's domain,
    /// class and validity.
    async fn source_concept(
        &self,
        header: &MappingFileHeader,
        row: &MappingRow,
        target: &Concept,
        report: &mut IngestionReport,
    ) -> Result<std::result::Result<Concept, SkipReason>> {
        if let Some(existing) = self
            .services
            .concepts
            .find_by_code(&header.source_vocabulary, &row.source_code)
            .await?
        {
            return Ok(Ok(existing));
        }

        let candidate = Concept {
            id: self.allocator.next_id().await?,
            name: row
                .source_desc
                .clone()
                .unwrap_or_else(|| header.source_vocabulary.clone()),
            domain_id: target.domain_id.clone(),
            vocabulary_id: header.source_vocabulary.clone(),
            concept_class_id: target.concept_class_id.clone(),
            standard_concept: None,
            concept_code: row.source_code.clone(),
            valid_start_date: target.valid_start_date,
            valid_end_date: target.valid_end_date,
            invalid_reason: None,
        };

        match self
            .services
            .concepts
            .create_if_absent(&candidate, ConceptMatch::VocabularyAndCode)
            .await
        {
            Ok(Upsert::Created(concept)) => {
                report.concepts_created += 1;
                Ok(Ok(concept))
            }
            Ok(Upsert::Existing(concept)) => Ok(Ok(concept)),
            // the allocated id was taken by another writer
            Err(e) if e.is_already_exists() => Ok(Err(SkipReason::ConceptCreationFailed {
                reason: e.to_string(),
            })),
            Err(e) => Err(e.into()),
        }
    }
}

/// Regular, non-hidden files of `directory` sorted by name.
async fn list_files(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(directory).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}
