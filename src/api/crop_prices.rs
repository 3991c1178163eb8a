//! Barangay crop price submission endpoints.

use axum::extract::State;
use chrono::Datelike;
use std::sync::Arc;

use crate::db::{
    actions, delete_pending_submission, find_crop_price, insert_crop_price, list_crop_prices,
    target_tables, update_pending_crop_price, CropPrice, CropPriceInput, CropPriceValues, RecordType, Role,
};
use crate::AppState;

use super::audit::audit_log;
use super::auth::CurrentUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::response::ApiResponse;
use super::submissions::{ensure_references, guard_mutation, resolve_period, SubmissionListQuery};
use super::validation::{validate_id, validate_positive, validate_year};

fn price_values(input: &CropPriceInput, base: Option<&CropPriceValues>) -> Result<CropPriceValues, ApiError> {
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

    let year = input
        .year
        .or(base.map(|b| b.year))
        .unwrap_or_else(|| chrono::Utc::now().year() as i64);
    errors.check("year", validate_year(year));

    let (month, season) = resolve_period(
        &mut errors,
        input.month.as_ref(),
        input.season.as_deref(),
        base.map(|b| (b.month, b.season.as_str())),
    );

    let price_per_kg = validate_positive(input.price_per_kg.or(base.map(|b| b.price_per_kg)), "price_per_kg")
        .unwrap_or_else(|e| {
            errors.add("price_per_kg", e);
            0.0
        });

    errors.finish()?;

    Ok(CropPriceValues {
        barangay_id,
        crop_id,
        year,
        month,
        season,
        price_per_kg,
    })
}

fn details(record: &CropPrice) -> serde_json::Value {
    serde_json::json!({
        "summary": format!(
            "{} price in {} {}/{}",
            record.crop_name.as_deref().unwrap_or("crop"),
            record.barangay_name.as_deref().unwrap_or("barangay"),
            record.month,
            record.year
        ),
        "barangay_id": record.barangay_id,
        "crop_id": record.crop_id,
        "year": record.year,
        "month": record.month,
        "price_per_kg": record.price_per_kg,
        "status": record.status,
    })
}

fn not_found(id: i64) -> ApiError {
    ApiError::not_found(format!("crop price record {} not found", id))
}

pub async fn create_price(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiJson(input): ApiJson<CropPriceInput>,
) -> Result<ApiResponse<CropPrice>, ApiError> {
    current.require_role(Role::SUBMITTERS)?;

    let values = price_values(&input, None)?;
    ensure_references(&state.db, values.barangay_id, values.crop_id).await?;

    let record = insert_crop_price(&state.db, &values, current.id()).await?;

    tracing::info!(record_id = record.id, user_id = %current.id(), "Crop price submitted");
    audit_log(
        &state,
        current.activity(actions::ADD_CROP_PRICE, target_tables::CROP_PRICES, record.id, details(&record)),
    )
    .await;

    Ok(ApiResponse::created("crop price submitted for approval", record))
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiQuery(query): ApiQuery<SubmissionListQuery>,
) -> Result<ApiResponse<Vec<CropPrice>>, ApiError> {
    let filter = query.to_filter(&current)?;
    let records = list_crop_prices(&state.db, &filter).await?;
    Ok(ApiResponse::ok("crop prices fetched successfully", records))
}

pub async fn list_public(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<SubmissionListQuery>,
) -> Result<ApiResponse<Vec<CropPrice>>, ApiError> {
    let records = list_crop_prices(&state.db, &query.to_public_filter()).await?;
    Ok(ApiResponse::ok("approved crop prices fetched successfully", records))
}

pub async fn get_price(
    State(state): State<Arc<AppState>>,
    _current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<CropPrice>, ApiError> {
    let record = find_crop_price(&state.db, id).await?.ok_or_else(|| not_found(id))?;
    Ok(ApiResponse::ok("crop price fetched successfully", record))
}

/// Partial update of a pending price
pub async fn update_price(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
    ApiJson(input): ApiJson<CropPriceInput>,
) -> Result<ApiResponse<CropPrice>, ApiError> {
    if input.is_empty() {
        return Err(ApiError::bad_request("at least one field must be provided"));
    }
    guard_mutation(&state.db, RecordType::CropPrices, id, &current).await?;

    let existing = find_crop_price(&state.db, id).await?.ok_or_else(|| not_found(id))?;
    let values = price_values(&input, Some(&CropPriceValues::from(&existing)))?;
    ensure_references(&state.db, values.barangay_id, values.crop_id).await?;

    if !update_pending_crop_price(&state.db, id, &values).await? {
        return Err(ApiError::conflict("Only pending records can be modified"));
    }

    let record = find_crop_price(&state.db, id).await?.ok_or_else(|| not_found(id))?;
    audit_log(
        &state,
        current.activity(actions::UPDATE_CROP_PRICE, target_tables::CROP_PRICES, id, details(&record)),
    )
    .await;

    Ok(ApiResponse::ok("crop price updated successfully", record))
}

pub async fn delete_price(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<ApiResponse<()>, ApiError> {
    guard_mutation(&state.db, RecordType::CropPrices, id, &current).await?;
    let record = find_crop_price(&state.db, id).await?;

    if !delete_pending_submission(&state.db, RecordType::CropPrices, id).await? {
        return Err(ApiError::conflict("Only pending records can be deleted"));
    }

    tracing::info!(record_id = id, user_id = %current.id(), "Crop price deleted");
    audit_log(
        &state,
        current.activity(
            actions::DELETE_CROP_PRICE,
            target_tables::CROP_PRICES,
            id,
            record.as_ref().map(details).unwrap_or_default(),
        ),
    )
    .await;

    Ok(ApiResponse::message("crop price deleted successfully"))
}
