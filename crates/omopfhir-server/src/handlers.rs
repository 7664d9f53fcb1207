use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use omopfhir_core::Coding;
use omopfhir_storage::{CodeMapEntry, TwoLetterStateMapEntry, VocabularyMapEntry};
use serde::{Deserialize, Serialize};

use crate::api_error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'a str,
    ingestion: bool,
}

pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            ingestion: state.pipeline.is_some(),
        }),
    )
}

// ---- vocabulary map ----

pub async fn list_vocabulary_map(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = state.stores.vocabulary_map.get().await?;
    Ok(Json(entries))
}

pub async fn create_vocabulary_map(
    State(state): State<AppState>,
    Json(body): Json<VocabularyMapEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = VocabularyMapEntry::new(
        body.omop_vocabulary_id,
        body.fhir_url_system,
        body.other_system_name,
    )?;
    state.stores.vocabulary_map.save(&entry).await?;
    tracing::info!(vocabulary = %entry.omop_vocabulary_id, "Vocabulary map entry created");
    Ok((StatusCode::CREATED, Json(entry)))
}

/// The path id wins over the id in the body.
pub async fn update_vocabulary_map(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<VocabularyMapEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = VocabularyMapEntry::new(id, body.fhir_url_system, body.other_system_name)?;
    state.stores.vocabulary_map.update(&entry).await?;
    tracing::info!(vocabulary = %entry.omop_vocabulary_id, "Vocabulary map entry updated");
    Ok(Json(entry))
}

pub async fn delete_vocabulary_map(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.stores.vocabulary_map.delete(&id).await?;
    tracing::info!(vocabulary = %id, "Vocabulary map entry deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---- code map ----

pub async fn list_code_map(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let entries = state.stores.code_map.get().await?;
    Ok(Json(entries))
}

pub async fn create_code_map(
    State(state): State<AppState>,
    Json(body): Json<CodeMapEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = CodeMapEntry::new(
        body.omop_concept,
        body.fhir_system,
        body.fhir_code,
        body.fhir_display,
    )?;
    state.stores.code_map.save(&entry).await?;
    tracing::info!(concept_id = entry.omop_concept, system = %entry.fhir_system, "Code map entry created");
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn update_code_map(
    State(state): State<AppState>,
    Path(concept_id): Path<i64>,
    Json(body): Json<CodeMapEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = CodeMapEntry::new(concept_id, body.fhir_system, body.fhir_code, body.fhir_display)?;
    state.stores.code_map.update(&entry).await?;
    tracing::info!(concept_id, "Code map entry updated");
    Ok(Json(entry))
}

pub async fn delete_code_map(
    State(state): State<AppState>,
    Path(concept_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.stores.code_map.delete(concept_id).await?;
    tracing::info!(concept_id, "Code map entry deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---- state map ----

pub async fn list_state_map(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let entries = state.stores.state_map.get().await?;
    Ok(Json(entries))
}

fn state_entry(state_name: String, two_letter: String) -> Result<TwoLetterStateMapEntry, ApiError> {
    let entry = TwoLetterStateMapEntry::new(state_name, two_letter);
    if entry.state_name.is_empty() || entry.two_letter.is_empty() {
        return Err(ApiError::bad_request(
            "stateName and twoLetter must not be empty",
        ));
    }
    Ok(entry)
}

pub async fn create_state_map(
    State(state): State<AppState>,
    Json(body): Json<TwoLetterStateMapEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state_entry(body.state_name, body.two_letter)?;
    state.stores.state_map.save(&entry).await?;
    tracing::info!(state = %entry.state_name, "State map entry created");
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn update_state_map(
    State(state): State<AppState>,
    Path(state_name): Path<String>,
    Json(body): Json<TwoLetterStateMapEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state_entry(state_name, body.two_letter)?;
    state.stores.state_map.update(&entry).await?;
    tracing::info!(state = %entry.state_name, "State map entry updated");
    Ok(Json(entry))
}

pub async fn delete_state_map(
    State(state): State<AppState>,
    Path(state_name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.stores.state_map.delete(&state_name).await?;
    tracing::info!(state = %state_name, "State map entry deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---- lookups ----

#[derive(Debug, Deserialize)]
pub struct CodingQuery {
    pub system: Option<String>,
    pub code: Option<String>,
}

pub async fn lookup_concept(
    State(state): State<AppState>,
    Query(query): Query<CodingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let coding = Coding {
        system: query.system,
        code: query.code,
        display: None,
    };
    match state.resolver.resolve_omop_concept(&coding).await? {
        Some(concept) => Ok(Json(concept)),
        None => Err(ApiError::not_found(format!(
            "no concept for {}|{}",
            coding.system_str().unwrap_or_default(),
            coding.code_str().unwrap_or_default()
        ))),
    }
}

pub async fn lookup_coding(
    State(state): State<AppState>,
    Path(concept_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let concept = state
        .resolver
        .concept_by_id(concept_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Concept {concept_id}")))?;
    let coding = state.resolver.resolve_coding(&concept).await?;
    Ok(Json(coding))
}

// ---- ingestion ----

/// Runs one ingestion pass now. Waits for a scheduled pass in progress.
pub async fn run_ingestion(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let pipeline = state
        .pipeline
        .as_ref()
        .ok_or_else(|| ApiError::not_found("local mapping ingestion is disabled"))?;
    let summary = pipeline.run_pass().await?;
    tracing::info!(
        files = summary.files_seen,
        processed = summary.processed,
        rejected = summary.rejected,
        "Ingestion pass triggered over HTTP"
    );
    Ok(Json(summary))
}
