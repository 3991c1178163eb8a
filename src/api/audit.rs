//! Activity log API endpoints and helpers.

use axum::extract::State;
use std::sync::Arc;

use crate::db::{
    insert_activity_log, list_action_codes, list_activity_logs, list_user_activity, ActivityLog,
    ActivityLogListResponse, ActivityLogQuery, NewActivityLog, Role,
};
use crate::AppState;

use super::auth::CurrentUser;
use super::error::ApiError;
use super::extract::ApiQuery;
use super::response::ApiResponse;

/// Record an activity log entry without failing the request.
/// Errors are logged and swallowed so the primary action stands.
pub async fn audit_log(state: &AppState, entry: NewActivityLog<'_>) {
    if let Err(e) = insert_activity_log(&state.db, &entry).await {
        tracing::warn!(
            action = entry.action,
            target_table = entry.target_table,
            target_id = entry.target_id.as_deref(),
            error = %e,
            "Failed to create activity log entry"
        );
    }
}

/// List activity logs with filtering and pagination
///
/// Query parameters:
/// - action: Filter by action code (e.g., "APPROVE_RECORD")
/// - target_table: Filter by table (e.g., "crop_prices")
/// - target_id, user_id: exact matches
/// - start_date / end_date: inclusive, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`
/// - page: Page number (1-indexed, defaults to 1)
/// - per_page: Items per page (defaults to 50, max 100)
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
    ApiQuery(query): ApiQuery<ActivityLogQuery>,
) -> Result<ApiResponse<ActivityLogListResponse>, ApiError> {
    current.require_role(Role::REVIEWERS)?;
    let result = list_activity_logs(&state.db, &query).await?;
    Ok(ApiResponse::ok("activity logs fetched successfully", result))
}

/// The caller's own activity, newest first
pub async fn my_logs(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<ApiResponse<Vec<ActivityLog>>, ApiError> {
    let logs = list_user_activity(&state.db, current.id()).await?;
    Ok(ApiResponse::ok("activity logs fetched successfully", logs))
}

/// Get distinct action codes for filtering UI
pub async fn list_action_types(
    State(state): State<Arc<AppState>>,
    current: CurrentUser,
) -> Result<ApiResponse<Vec<String>>, ApiError> {
    current.require_role(Role::REVIEWERS)?;
    let codes = list_action_codes(&state.db).await?;
    Ok(ApiResponse::ok("action types fetched successfully", codes))
}
