//! Barangay reference data endpoints. The list is served as GeoJSON for the map.

use axum::extract::State;
use std::sync::Arc;

use crate::db::{
    actions, barangay_options, count_submissions_referencing, delete_barangay, find_barangay, insert_barangay,
    list_barangays, target_tables, update_barangay, Barangay, BarangayOption, CreateBarangayRequest,
    FeatureCollection, ReferenceColumn, Role, UpdateBarangayRequest,
};
use crate::AppState;

use super::audit::audit_log;
use super::auth::CurrentUser;
use super::error::{on_unique_violation, ApiError, ValidationErrorBuilder};
use super::extract::{ApiJson, ApiPath};
use super::response::ApiResponse;
use super::validation::validate_label;

fn not_found(id: i64) -> ApiError {
    ApiError::not_found(format!("barangay {} not found", id))
}

/// Geometry must be a GeoJSON object with a `type`
fn check_geometry(geometry: Option<&serde_json::Value>) -> Result<(), String> {
    match geometry {
        None | Some(serde_json::Value::Null) => Ok(()),
        Some(serde_json::Value::Object(map)) if map.get("type").is_some_and(|t| t.is_string()) => Ok(()),
        Some(_) => Err("Geometry must be a GeoJSON geometry object".to_string()),
    }
}

/// All barangays as a GeoJSON FeatureCollection
pub async fn list(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
) -> Result<ApiResponse<FeatureCollection>, ApiError> {
    let barangays = list_barangays(&state.db).await?;
    let collection: FeatureCollection = barangays.iter().map(Barangay::to_feature).collect();
    Ok(ApiResponse::ok("barangays fetched successfully", collection))
}

pub async fn dropdown(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
) -> Result<ApiResponse<Vec<BarangayOption>>, ApiError> {
    let options = barangay_options(&state.db).await?;
    Ok(ApiResponse::ok("barangays fetched successfully", options))
}

pub async fn get_barangay(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<Barangay>, ApiError> {
    let barangay = find_barangay(&state.db, id).await?.ok_or_else(|| not_found(id))?;
    Ok(ApiResponse::ok("barangay fetched successfully", barangay))
}

pub async fn create_barangay(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiJson(req): ApiJson<CreateBarangayRequest>,
) -> Result<ApiResponse<Barangay>, ApiError> {
    current.require_role(Role::REVIEWERS)?;

    let name = req.name.as_deref().unwrap_or_default().trim();
    let mut errors = ValidationErrorBuilder::new();
    errors
        .check("name", validate_label(name, "Barangay name"))
        .check("geometry", check_geometry(req.geometry.as_ref()));
    errors.finish()?;

    let code = req.code.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let geometry = req.geometry.as_ref().filter(|g| !g.is_null()).map(|g| g.to_string());

    let barangay = insert_barangay(
        &state.db,
        name,
        code,
        req.municipality.as_deref().map(str::trim),
        geometry.as_deref(),
    )
    .await
    .map_err(|e| on_unique_violation(e, format!("barangay code '{}' already exists", code.unwrap_or_default())))?;

    audit_log(
        &state,
        current.activity(
            actions::ADD_BARANGAY,
            target_tables::BARANGAYS,
            barangay.id,
            serde_json::json!({ "name": barangay.name, "code": barangay.code }),
        ),
    )
    .await;

    Ok(ApiResponse::created("barangay added successfully", barangay))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateBarangayRequest>,
) -> Result<ApiResponse<Barangay>, ApiError> {
    current.require_role(Role::REVIEWERS)?;

    if req.is_empty() {
        return Err(ApiError::bad_request("at least one field must be provided"));
    }
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.name {
        errors.check("name", validate_label(name, "Barangay name"));
    }
    errors.check("geometry", check_geometry(req.geometry.as_ref()));
    errors.finish()?;

    let barangay = update_barangay(&state.db, id, &req)
        .await
        .map_err(|e| on_unique_violation(e, "barangay code already exists"))?
        .ok_or_else(|| not_found(id))?;

    audit_log(
        &state,
        current.activity(
            actions::UPDATE_BARANGAY,
            target_tables::BARANGAYS,
            id,
            serde_json::json!({
                "name": barangay.name,
                "fields": {
                    "name": req.name.is_some(),
                    "code": req.code.is_some(),
                    "municipality": req.municipality.is_some(),
                    "geometry": req.geometry.is_some(),
                },
            }),
        ),
    )
    .await;

    Ok(ApiResponse::ok("barangay updated successfully", barangay))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<()>, ApiError> {
    current.require_role(Role::REVIEWERS)?;

    if find_barangay(&state.db, id).await?.is_none() {
        return Err(not_found(id));
    }
    let references = count_submissions_referencing(&state.db, ReferenceColumn::Barangay, id).await?;
    if references > 0 {
        return Err(ApiError::conflict(format!(
            "barangay {} is still referenced by {} submission(s)",
            id, references
        )));
    }

    let barangay = delete_barangay(&state.db, id).await?.ok_or_else(|| not_found(id))?;

    tracing::info!(barangay_id = id, user_id = %current.id(), "Barangay deleted");
    audit_log(
        &state,
        current.activity(
            actions::DELETE_BARANGAY,
            target_tables::BARANGAYS,
            id,
            serde_json::json!({ "name": barangay.name, "code": barangay.code }),
        ),
    )
    .await;

    Ok(ApiResponse::message("barangay deleted successfully"))
}
