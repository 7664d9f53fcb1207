//! # omopfhir-server
//!
//! Runs the vocabulary mapping engine as a service: loads configuration,
//! connects the OMOP CDM and the local mapping store, schedules local
//! mapping ingestion and exposes a small admin and lookup API.

pub mod api_error;
pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;
pub mod state;

pub use api_error::{ApiError, OperationOutcome};
pub use config::AppConfig;
pub use server::{OmopFhirServer, ServerBuilder, build_app};
pub use state::AppState;
