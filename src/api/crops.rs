//! Crop reference data endpoints.

use axum::extract::State;
use std::sync::Arc;

use crate::db::{
    actions, count_submissions_referencing, crop_options, delete_crop, find_crop, insert_crop, list_crops,
    target_tables, update_crop, CreateCropRequest, Crop, CropOption, ReferenceColumn, Role,
    UpdateCropRequest,
};
use crate::AppState;

use super::audit::audit_log;
use super::auth::CurrentUser;
use super::error::{on_unique_violation, ApiError};
use super::extract::{ApiJson, ApiPath};
use super::response::ApiResponse;
use super::validation::validate_label;

fn not_found(id: i64) -> ApiError {
    ApiError::not_found(format!("crop {} not found", id))
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
) -> Result<ApiResponse<Vec<Crop>>, ApiError> {
    let crops = list_crops(&state.db).await?;
    Ok(ApiResponse::ok("crops fetched successfully", crops))
}

/// id/name pairs for select inputs
pub async fn dropdown(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
) -> Result<ApiResponse<Vec<CropOption>>, ApiError> {
    let options = crop_options(&state.db).await?;
    Ok(ApiResponse::ok("crops fetched successfully", options))
}

pub async fn get_crop(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<Crop>, ApiError> {
    let crop = find_crop(&state.db, id).await?.ok_or_else(|| not_found(id))?;
    Ok(ApiResponse::ok("crop fetched successfully", crop))
}

pub async fn create_crop(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiJson(req): ApiJson<CreateCropRequest>,
) -> Result<ApiResponse<Crop>, ApiError> {
    current.require_role(Role::REVIEWERS)?;

    let name = req.name.as_deref().unwrap_or_default().trim();
    validate_label(name, "Crop name").map_err(|e| ApiError::validation_field("name", e))?;

    let crop = insert_crop(&state.db, name, trimmed(req.category.as_deref()))
        .await
        .map_err(|e| on_unique_violation(e, format!("crop '{}' already exists", name)))?;

    audit_log(
        &state,
        current.activity(
            actions::ADD_CROP,
            target_tables::CROPS,
            crop.id,
            serde_json::json!({ "name": crop.name, "category": crop.category }),
        ),
    )
    .await;

    Ok(ApiResponse::created("crop added successfully", crop))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateCropRequest>,
) -> Result<ApiResponse<Crop>, ApiError> {
    current.require_role(Role::REVIEWERS)?;

    if req.name.is_none() && req.category.is_none() {
        return Err(ApiError::bad_request("at least one field must be provided"));
    }
    let name = req.name.as_deref().map(str::trim);
    if let Some(name) = name {
        validate_label(name, "Crop name").map_err(|e| ApiError::validation_field("name", e))?;
    }

    let before = find_crop(&state.db, id).await?.ok_or_else(|| not_found(id))?;
    let crop = update_crop(&state.db, id, name, trimmed(req.category.as_deref()))
        .await
        .map_err(|e| on_unique_violation(e, format!("crop '{}' already exists", name.unwrap_or_default())))?
        .ok_or_else(|| not_found(id))?;

    audit_log(
        &state,
        current.activity(
            actions::UPDATE_CROP,
            target_tables::CROPS,
            id,
            serde_json::json!({
                "before": { "name": before.name, "category": before.category },
                "after": { "name": crop.name, "category": crop.category },
            }),
        ),
    )
    .await;

    Ok(ApiResponse::ok("crop updated successfully", crop))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<()>, ApiError> {
    current.require_role(Role::REVIEWERS)?;

    if find_crop(&state.db, id).await?.is_none() {
        return Err(not_found(id));
    }
    let references = count_submissions_referencing(&state.db, ReferenceColumn::Crop, id).await?;
    if references > 0 {
        return Err(ApiError::conflict(format!(
            "crop {} is still referenced by {} submission(s)",
            id, references
        )));
    }

    let crop = delete_crop(&state.db, id).await?.ok_or_else(|| not_found(id))?;

    tracing::info!(crop_id = id, user_id = %current.id(), "Crop deleted");
    audit_log(
        &state,
        current.activity(
            actions::DELETE_CROP,
            target_tables::CROPS,
            id,
            serde_json::json!({ "name": crop.name }),
        ),
    )
    .await;

    Ok(ApiResponse::message("crop deleted successfully"))
}
