//! Barangay yield submission endpoints.

use axum::extract::State;
use std::sync::Arc;

use crate::db::{
    actions, delete_pending_submission, find_yield, insert_yield, list_yields, target_tables,
    update_pending_yield, BarangayYield, RecordType, Role, YieldInput, YieldValues,
};
use crate::AppState;

use super::audit::audit_log;
use super::auth::CurrentUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::response::ApiResponse;
use super::submissions::{ensure_references, guard_mutation, resolve_period, SubmissionListQuery};
use super::validation::{validate_id, validate_positive, validate_year};

/// Validate input, layered over `base` when updating an existing record
fn yield_values(input: &YieldInput, base: Option<&YieldValues>) -> Result<YieldValues, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let barangay_id = validate_id(input.barangay_id.or(base.map(|b| b.barangay_id)), "barangay_id")
        .unwrap_or_else(|e| {
            errors.add("barangay_id", e);
            0
        });
    let crop_id = validate_id(input.crop_id.or(base.map(|b| b.crop_id)), "crop_id").unwrap_or_else(|e| {
        errors.add("crop_id", e);
        0
    });

    let year = match input.year.or(base.map(|b| b.year)) {
        Some(y) => {
            errors.check("year", validate_year(y));
            y
        }
        None => {
            errors.add("year", "year is required");
            0
        }
    };

    let (month, season) = resolve_period(
        &mut errors,
        input.month.as_ref(),
        input.season.as_deref(),
        base.map(|b| (b.month, b.season.as_str())),
    );

    let total_yield = validate_positive(input.total_yield.or(base.map(|b| b.total_yield)), "total_yield")
        .unwrap_or_else(|e| {
            errors.add("total_yield", e);
            0.0
        });
    let area = validate_positive(
        input.total_area_planted_ha.or(base.map(|b| b.total_area_planted_ha)),
        "total_area_planted_ha",
    )
    .unwrap_or_else(|e| {
        errors.add("total_area_planted_ha", e);
        0.0
    });

    // Recompute when either input of the ratio changed and no explicit value was sent
    let metrics_changed = input.total_yield.is_some() || input.total_area_planted_ha.is_some();
    let yield_per_hectare = match (input.yield_per_hectare, base) {
        (Some(v), _) => validate_positive(Some(v), "yield_per_hectare").unwrap_or_else(|e| {
            errors.add("yield_per_hectare", e);
            0.0
        }),
        (None, Some(b)) if !metrics_changed => b.yield_per_hectare,
        (None, _) if area > 0.0 => total_yield / area,
        (None, _) => 0.0,
    };

    errors.finish()?;

    Ok(YieldValues {
        barangay_id,
        crop_id,
        year,
        month,
        season,
        total_yield,
        total_area_planted_ha: area,
        yield_per_hectare,
    })
}

fn details(record: &BarangayYield) -> serde_json::Value {
    serde_json::json!({
        "summary": format!(
            "{} yield for {} {}/{}",
            record.crop_name.as_deref().unwrap_or("crop"),
            record.barangay_name.as_deref().unwrap_or("barangay"),
            record.month,
            record.year
        ),
        "barangay_id": record.barangay_id,
        "crop_id": record.crop_id,
        "year": record.year,
        "month": record.month,
        "total_yield": record.total_yield,
        "status": record.status,
    })
}

pub async fn create_yield(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiJson(input): ApiJson<YieldInput>,
) -> Result<ApiResponse<BarangayYield>, ApiError> {
    current.require_role(Role::SUBMITTERS)?;

    let values = yield_values(&input, None)?;
    ensure_references(&state.db, values.barangay_id, values.crop_id).await?;

    let record = insert_yield(&state.db, &values, current.id()).await?;

    tracing::info!(record_id = record.id, user_id = %current.id(), "Yield submitted");
    audit_log(
        &state,
        current.activity(
            actions::ADD_BARANGAY_YIELD,
            target_tables::BARANGAY_YIELDS,
            record.id,
            details(&record),
        ),
    )
    .await;

    Ok(ApiResponse::created("yield record submitted for approval", record))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiQuery(query): ApiQuery<SubmissionListQuery>,
) -> Result<ApiResponse<Vec<BarangayYield>>, ApiError> {
    let filter = query.to_filter(&current)?;
    let records = list_yields(&state.db, &filter).await?;
    Ok(ApiResponse::ok("yield records fetched successfully", records))
}

/// Approved yields for the public map and charts
pub async fn list_public(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SubmissionListQuery>,
) -> Result<ApiResponse<Vec<BarangayYield>>, ApiError> {
    let records = list_yields(&state.db, &query.to_public_filter()).await?;
    Ok(ApiResponse::ok("approved yield records fetched successfully", records))
}

pub async fn get_yield(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<BarangayYield>, ApiError> {
    let record = find_yield(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("yield record {} not found", id)))?;
    Ok(ApiResponse::ok("yield record fetched successfully", record))
}

pub async fn update_yield(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<YieldInput>,
) -> Result<ApiResponse<BarangayYield>, ApiError> {
    if input.is_empty() {
        return Err(ApiError::bad_request("at least one field must be provided"));
    }
    guard_mutation(&state.db, RecordType::BarangayYields, id, &current).await?;

    let existing = find_yield(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("yield record {} not found", id)))?;
    let values = yield_values(&input, Some(&YieldValues::from(&existing)))?;
    ensure_references(&state.db, values.barangay_id, values.crop_id).await?;

    if !update_pending_yield(&state.db, id, &values).await? {
        return Err(ApiError::conflict("Only pending records can be modified"));
    }

    let record = find_yield(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("yield record {} not found", id)))?;

    audit_log(
        &state,
        current.activity(
            actions::UPDATE_BARANGAY_YIELD,
            target_tables::BARANGAY_YIELDS,
            id,
            details(&record),
        ),
    )
    .await;

    Ok(ApiResponse::ok("yield record updated successfully", record))
}

pub async fn delete_yield(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<()>, ApiError> {
    guard_mutation(&state.db, RecordType::BarangayYields, id, &current).await?;
    let record = find_yield(&state.db, id).await?;

    if !delete_pending_submission(&state.db, RecordType::BarangayYields, id).await? {
        return Err(ApiError::conflict("Only pending records can be deleted"));
    }

    tracing::info!(record_id = id, user_id = %current.id(), "Yield deleted");
    audit_log(
        &state,
        current.activity(
            actions::DELETE_BARANGAY_YIELD,
            target_tables::BARANGAY_YIELDS,
            id,
            record.as_ref().map(details).unwrap_or_default(),
        ),
    )
    .await;

    Ok(ApiResponse::message("yield record deleted successfully"))
}
