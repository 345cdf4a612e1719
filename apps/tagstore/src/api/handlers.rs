//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    types::{
        CountsQuery, CountsResponse, ExportRequest, ExportResponse, FlagRequest, FlagResponse,
        FlushRequest, FlushResponse, HealthResponse, OffensiveRequest, RecordResponse,
        RecordsQuery, RecordsResponse, SaveRequest, SaveResponse, StatusResponse,
        VocabularyResponse,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tagstore_core::{ExportFormat, TagError};

/// Validation failures are the caller's fault; everything else is ours.
fn error_status(e: &TagError) -> StatusCode {
    match e {
        TagError::InvalidRecord(_) | TagError::InvalidTags(_) | TagError::ConfigError(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// =============================================================================
// HEALTH / STATUS / VOCABULARY
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Store and mirror status.
pub async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.service.status().await {
        Ok(status) => (StatusCode::OK, Json(StatusResponse::success(status))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(StatusResponse::error(format!("Status failed: {}", e))),
        ),
    }
}

/// Tag options and reference text.
pub async fn vocabulary_handler() -> impl IntoResponse {
    Json(VocabularyResponse::default())
}

// =============================================================================
// SAVE / AUTOSAVE / FLUSH
// =============================================================================

/// Save a tag set into the caller's buffer.
pub async fn save_handler(
    State(state): State<AppState>,
    Json(request): Json<SaveRequest>,
) -> impl IntoResponse {
    match state
        .service
        .save(&request.user, &request.item, request.tags)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(SaveResponse::success(outcome))),
        Err(e) => (
            error_status(&e),
            Json(SaveResponse::error(format!("Save failed: {}", e))),
        ),
    }
}

/// Autosave tick; saves only when the form changed and the interval passed.
pub async fn autosave_handler(
    State(state): State<AppState>,
    Json(request): Json<SaveRequest>,
) -> impl IntoResponse {
    match state
        .service
        .autosave(&request.user, &request.item, request.tags)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(SaveResponse::success(outcome))),
        Err(e) => (
            error_status(&e),
            Json(SaveResponse::error(format!("Autosave failed: {}", e))),
        ),
    }
}

/// Flush the caller's buffer.
pub async fn flush_handler(
    State(state): State<AppState>,
    Json(request): Json<FlushRequest>,
) -> impl IntoResponse {
    let summary = state.service.flush(&request.user).await;
    Json(FlushResponse {
        success: summary.retained == 0 && summary.dropped == 0,
        summary,
    })
}

// =============================================================================
// FLAG / OFFENSIVE
// =============================================================================

/// Flag or reject an image.
pub async fn flag_handler(
    State(state): State<AppState>,
    Json(request): Json<FlagRequest>,
) -> impl IntoResponse {
    match state
        .service
        .flag(&request.user, &request.item, request.kind)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(FlagResponse::success(outcome))),
        Err(e) => (
            error_status(&e),
            Json(FlagResponse::error(format!("Flag failed: {}", e))),
        ),
    }
}

/// Report an offensive image.
pub async fn offensive_handler(
    State(state): State<AppState>,
    Json(request): Json<OffensiveRequest>,
) -> impl IntoResponse {
    match state
        .service
        .mark_offensive(&request.user, &request.item)
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(FlagResponse::success(outcome))),
        Err(e) => (
            error_status(&e),
            Json(FlagResponse::error(format!("Report failed: {}", e))),
        ),
    }
}

// =============================================================================
// COUNTS / EXPORT
// =============================================================================

/// Local and remote counts, optionally for one uid.
pub async fn counts_handler(
    State(state): State<AppState>,
    Query(query): Query<CountsQuery>,
) -> impl IntoResponse {
    match state.service.counts(query.uid.as_deref()).await {
        Ok(counts) => (StatusCode::OK, Json(CountsResponse::success(counts))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(CountsResponse::error(format!("Count failed: {}", e))),
        ),
    }
}

/// Read the committed record for one image.
pub async fn get_tags_handler(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> impl IntoResponse {
    match state.service.get_record(&image_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(RecordResponse::success(record))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(RecordResponse::error(format!("No record for '{}'", image_id))),
        ),
        Err(e) => (
            error_status(&e),
            Json(RecordResponse::error(format!("Lookup failed: {}", e))),
        ),
    }
}

/// List committed records, optionally for one user.
pub async fn list_tags_handler(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> impl IntoResponse {
    let result = match query.uid.as_deref() {
        Some(uid) => state.service.records_for_user(uid).await,
        None => state.service.records().await,
    };
    match result {
        Ok(records) => (StatusCode::OK, Json(RecordsResponse::success(records))),
        Err(e) => (
            error_status(&e),
            Json(RecordsResponse::error(format!("List failed: {}", e))),
        ),
    }
}

/// Export the store.
pub async fn export_handler(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> impl IntoResponse {
    let format = match request.format.parse::<ExportFormat>() {
        Ok(f) => f,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ExportResponse::error(format!("Invalid export: {}", e))),
            );
        }
    };

    match state.service.export(format).await {
        Ok(artifact) => (StatusCode::OK, Json(ExportResponse::success(artifact))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ExportResponse::error(format!("Export failed: {}", e))),
        ),
    }
}
