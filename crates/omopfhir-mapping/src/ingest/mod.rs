//! Local mapping-file ingestion.
//!
//! Files dropped into a watched directory are parsed by [`parser`], loaded
//! by [`LocalMappingIngestionPipeline`] and then moved out of the directory
//! according to their [`FileDisposition`].

mod disposition;
pub mod parser;
mod pipeline;
mod report;
mod scheduler;

pub use disposition::{FileDisposition, PROCESSED_DIR, REJECTED_DIR};
pub use parser::{MappingFile, MappingFileHeader, parse_mapping_file};
pub use pipeline::{IngestionSettings, LocalMappingIngestionPipeline};
pub use report::{FileOutcome, IngestionReport, PassSummary, SkipReason, SkippedRow};
pub use scheduler::{
    DEFAULT_INGESTION_DELAY, IngestionHandle, IngestionScheduler, LOCAL_CODEMAPPING_FILE_PATH,
    ingestion_directory,
};
